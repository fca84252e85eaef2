//! Persistent per-node key share: the sole durable secret in the system
//! (`spec.md` §3/§4.6). Everything else the ceremonies touch lives only in
//! memory and is zeroized on drop.

pub mod address_cache;
pub mod envelope;
pub mod metadata;
pub mod store;

use thiserror::Error;
use wallet_mpc_curve::{Point, SecretScalar};

/// `{ partyIndex, x_i, publicKeyShares, P, chainCode, ceremonyId }`, §3.
///
/// `public_key_shares[i]` is each party's intercept commitment `a_{i,0}·G`
/// from DKG Round 2 — useful for verifying peers' reported shares, but (per
/// the source's own ambiguity, flagged in §9) not `x_j·G`. We keep the
/// mislabeled-in-the-wild name out of the type and just document what's
/// actually stored here.
///
/// `x_i` is a [`SecretScalar`], not a plain [`Scalar`](wallet_mpc_curve::Scalar):
/// it zeroizes on drop, satisfying §3's "wiped from its buffer immediately
/// after use" rule without a hand-rolled `Drop` impl.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct PersistentKeyShare {
    pub party_index: u16,
    pub total_parties: u16,
    #[serde(with = "secret_scalar_serde")]
    pub x_i: SecretScalar,
    #[serde(with = "point_vec")]
    pub public_key_shares: Vec<Point>,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub master_public_key: Point,
    #[serde(with = "hex::serde")]
    pub chain_code: [u8; 32],
    pub ceremony_id: String,
}

mod secret_scalar_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use wallet_mpc_curve::{scalar_from_hex, scalar_to_hex, SecretScalar};

    pub fn serialize<S: Serializer>(x: &SecretScalar, s: S) -> Result<S::Ok, S::Error> {
        scalar_to_hex(x.as_ref()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SecretScalar, D::Error> {
        let s = String::deserialize(d)?;
        let mut scalar = scalar_from_hex(&s).map_err(serde::de::Error::custom)?;
        Ok(SecretScalar::new(&mut scalar))
    }
}

mod point_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use wallet_mpc_curve::{point_from_hex, point_to_hex, Point};

    pub fn serialize<S: Serializer>(points: &[Point], s: S) -> Result<S::Ok, S::Error> {
        let hexes: Vec<String> = points.iter().map(point_to_hex).collect();
        hexes.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Point>, D::Error> {
        let hexes: Vec<String> = Vec::deserialize(d)?;
        hexes
            .iter()
            .map(|h| point_from_hex(h).map_err(serde::de::Error::custom))
            .collect()
    }
}

impl PersistentKeyShare {
    /// Consistency checks per I1-I3: the share's own public commitment must
    /// be present among `public_key_shares`, and all of them must sum to
    /// `master_public_key` (I2: `P = d·G`).
    pub fn validate(&self) -> Result<(), InvalidKeyShare> {
        if self.public_key_shares.len() != usize::from(self.total_parties) {
            return Err(ErrorReason::WrongShareCount.into());
        }
        if self.party_index == 0 || self.party_index > self.total_parties {
            return Err(ErrorReason::PartyIndexOutOfBounds.into());
        }
        let sum: Point = self
            .public_key_shares
            .iter()
            .copied()
            .fold(Point::zero(), |acc, p| acc + p);
        if sum != self.master_public_key {
            return Err(ErrorReason::SharesDontMatchMasterKey.into());
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct InvalidKeyShare(#[from] ErrorReason);

#[derive(Debug, Error)]
enum ErrorReason {
    #[error("public_key_shares.len() != total_parties")]
    WrongShareCount,
    #[error("party_index out of [1, total_parties] range")]
    PartyIndexOutOfBounds,
    #[error("sum of public_key_shares != master_public_key (I2 violated)")]
    SharesDontMatchMasterKey,
}
