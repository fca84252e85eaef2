//! Wire envelope, message catalogue, and shared error vocabulary for the DKG
//! and signing engines, `spec.md` §6/§7.
//!
//! This crate only defines the shapes; actually sending bytes over a
//! transport (TLS, peer discovery) is out of scope and left to the host
//! application, per §1.

pub mod message;

/// `serde(with = "point_vec")` for fields holding `Vec<Point>` (Feldman
/// commitment vectors), reusing the same hex-of-compressed-point encoding
/// [`wallet_mpc_curve::serde_point`] uses for a single point.
pub mod point_vec {
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

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use uuid::Uuid;

pub use message::MessageBody;

/// Messages older than this relative to the receiver's clock are rejected.
pub const MAX_MESSAGE_AGE_MS: i64 = 30_000;

/// `{ id, type, timestamp, nonce, payload }`, §6's wire envelope.
///
/// `type` is implicit in which [`MessageBody`] variant `payload` holds —
/// serializing a `Message` externally tags the body so the two never drift
/// apart, unlike a separately-tracked enum discriminant.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub timestamp: i64,
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    #[serde(flatten)]
    pub payload: MessageBody,
}

impl Message {
    pub fn new(payload: MessageBody, now_ms: i64, nonce: [u8; 16]) -> Self {
        Message {
            id: Uuid::new_v4(),
            timestamp: now_ms,
            nonce: nonce.to_vec(),
            payload,
        }
    }

    pub fn message_type(&self) -> &'static str {
        self.payload.type_tag()
    }

    /// Reject per §6: `now_ms - timestamp` must fall in `[0, MAX_MESSAGE_AGE_MS]`.
    /// A timestamp from the future (clock skew beyond what's tolerated) is
    /// rejected the same as a stale one — neither is a message this receiver
    /// can trust.
    pub fn check_freshness(&self, now_ms: i64) -> Result<(), ValidationError> {
        let age = now_ms - self.timestamp;
        if !(0..=MAX_MESSAGE_AGE_MS).contains(&age) {
            return Err(ValidationError::StaleTimestamp {
                age_ms: age,
                max_ms: MAX_MESSAGE_AGE_MS,
            });
        }
        Ok(())
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as i64
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("message is {age_ms}ms old, outside the {max_ms}ms freshness window")]
    StaleTimestamp { age_ms: i64, max_ms: i64 },
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("transport sender {transport_sender} does not match self-declared fromNodeId {claimed}")]
    SenderMismatch {
        transport_sender: String,
        claimed: String,
    },
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("identity public key for node {0} is unknown")]
    UnknownIdentity(String),
    #[error("identity material is malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("message signature does not verify")]
    BadSignature,
}

#[derive(Debug, Error)]
pub enum DkgError {
    #[error("duplicate {round} message from party {party}")]
    DuplicateMessage { round: &'static str, party: u16 },
    #[error("Pedersen commitment opening failed for party {0}")]
    PedersenOpeningFailed(u16),
    #[error("Schnorr proof of knowledge failed for party {0}")]
    SchnorrVerificationFailed(u16),
    #[error("Feldman verification of party {sender}'s share to {receiver} failed")]
    FeldmanVerificationFailed { sender: u16, receiver: u16 },
    #[error("ceremony deadline exceeded")]
    DeadlineExceeded,
    #[error("insufficient participation: got {got}, need {need}")]
    InsufficientParticipation { got: u16, need: u16 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("party {0} equivocated: duplicate message in round {1}")]
    Equivocation(u16, &'static str),
    #[error("Paillier modulus from party {party} is invalid: {source}")]
    InvalidModulus {
        party: u16,
        #[source]
        source: wallet_mpc_paillier::PaillierError,
    },
    #[error("ciphertext from party {0} is out of range")]
    CiphertextOutOfRange(u16),
    #[error("Schnorr proof from party {party} for {which} failed")]
    SchnorrVerificationFailed { party: u16, which: &'static str },
    #[error("delta aggregate is zero (Δ=0), session must be retried with fresh nonces")]
    DegenerateDelta,
    #[error("signature r is zero, session must be retried with fresh nonces")]
    DegenerateR,
    #[error("partial signature from party {0} failed verification")]
    PartialSignatureInvalid(u16),
    #[error("assembled signature does not verify against the derived child public key")]
    AssemblyVerificationFailed,
    #[error("recomputed txHash does not match the claimed txHash")]
    TxHashMismatch,
    #[error("session deadline exceeded")]
    DeadlineExceeded,
    #[error("message not valid in the current phase: {0}")]
    UnexpectedMessage(&'static str),
    #[error("session aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    KeyShare(#[from] key_share_errors::Boxed),
}

/// `key-share`'s error types, reboxed so this crate doesn't force a hard
/// dependency on that crate just to name its errors in `StorageError`.
pub mod key_share_errors {
    use std::fmt;

    #[derive(Debug)]
    pub struct Boxed(pub Box<dyn std::error::Error + Send + Sync>);

    impl fmt::Display for Boxed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for Boxed {}
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("peer {0} unreachable")]
    PeerUnreachable(String),
    #[error("send failed: {0}")]
    SendFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DkgPropose, MessageBody};

    #[test]
    fn fresh_message_passes_and_stale_one_fails() {
        let msg = Message::new(
            MessageBody::DkgPropose(DkgPropose {
                ceremony_id: "c1".into(),
                participants: vec!["a".into(), "b".into(), "c".into()],
                threshold: 2,
                deadline: now_ms() + 30_000,
            }),
            now_ms(),
            [0u8; 16],
        );
        assert!(msg.check_freshness(now_ms()).is_ok());
        assert!(msg.check_freshness(msg.timestamp + MAX_MESSAGE_AGE_MS + 1).is_err());
        assert!(msg.check_freshness(msg.timestamp - 1).is_err());
    }

    #[test]
    fn envelope_roundtrips_through_json() {
        let msg = Message::new(
            MessageBody::DkgPropose(DkgPropose {
                ceremony_id: "c1".into(),
                participants: vec!["a".into()],
                threshold: 1,
                deadline: 0,
            }),
            1000,
            [7u8; 16],
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, msg.id);
        assert_eq!(back.message_type(), "DKG_PROPOSE");
    }
}
