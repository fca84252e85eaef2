//! Public ceremony metadata sidecar, `spec.md` §3/§6.
//!
//! Unlike [`PersistentKeyShare`](crate::PersistentKeyShare), this file never
//! holds secret material, so it carries no envelope encryption and is
//! world-readable (0644) on disk.

use wallet_mpc_curve::Point;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Participant {
    pub node_id: String,
    pub party_index: u16,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub public_key_share: Point,
}

/// `{ ceremonyId, completedAt, participants[], threshold, totalParties,
/// pkMaster, chainCode, version }`, §3/§6.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CeremonyMetadata {
    pub ceremony_id: String,
    pub completed_at: String,
    pub participants: Vec<Participant>,
    pub threshold: u16,
    pub total_parties: u16,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub pk_master: Point,
    #[serde(with = "hex::serde")]
    pub chain_code: [u8; 32],
    pub version: u32,
}

impl CeremonyMetadata {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use wallet_mpc_curve::{Point, SecretScalar};

    #[test]
    fn roundtrips_through_json() {
        let mut rng = OsRng;
        let x = SecretScalar::random(&mut rng);
        let pk = Point::generator() * &x;
        let meta = CeremonyMetadata {
            ceremony_id: "ceremony-1".into(),
            completed_at: "2026-01-01T00:00:00Z".into(),
            participants: vec![Participant {
                node_id: "node-a".into(),
                party_index: 1,
                public_key_share: pk,
            }],
            threshold: 2,
            total_parties: 3,
            pk_master: pk,
            chain_code: [9u8; 32],
            version: CeremonyMetadata::CURRENT_VERSION,
        };
        let json = meta.to_json().unwrap();
        let back = CeremonyMetadata::from_json(&json).unwrap();
        assert_eq!(back.ceremony_id, meta.ceremony_id);
        assert_eq!(back.chain_code, meta.chain_code);
        assert_eq!(back.pk_master, meta.pk_master);
    }
}
