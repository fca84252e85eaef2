//! Message catalogue: one variant per wire type named in §6, each carrying
//! the payload shape that §3/§4 describe for its round.

use wallet_mpc_curve::Point;

/// Adjacently tagged as `{ "type": "DKG_PROPOSE", "payload": {...} }` —
/// flattened into [`crate::Message`], this produces exactly the envelope
/// shape §6 specifies.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MessageBody {
    #[serde(rename = "DKG_PROPOSE")]
    DkgPropose(DkgPropose),
    #[serde(rename = "DKG_ACCEPT")]
    DkgAccept(DkgAccept),
    #[serde(rename = "DKG_ROUND1")]
    DkgRound1(DkgRound1),
    #[serde(rename = "DKG_ROUND2")]
    DkgRound2(DkgRound2),
    #[serde(rename = "DKG_ROUND3_P2P")]
    DkgRound3P2p(DkgRound3P2p),
    #[serde(rename = "DKG_ROUND4")]
    DkgRound4(DkgRound4),
    #[serde(rename = "DKG_COMPLETE")]
    DkgComplete(DkgComplete),
    #[serde(rename = "DKG_ABORT")]
    DkgAbort(Abort),
    #[serde(rename = "SIGN_REQUEST")]
    SignRequest(SignRequest),
    #[serde(rename = "SIGN_ACCEPT")]
    SignAccept(SignAccept),
    #[serde(rename = "SIGN_REJECT")]
    SignReject(SignReject),
    #[serde(rename = "SIGN_ROUND1")]
    SignRound1(SignRound1),
    #[serde(rename = "SIGN_ROUND2")]
    SignRound2(SignRound2),
    #[serde(rename = "SIGN_ROUND3")]
    SignRound3(SignRound3),
    #[serde(rename = "SIGN_ROUND4")]
    SignRound4(SignRound4),
    #[serde(rename = "SIGN_COMPLETE")]
    SignComplete(SignComplete),
    #[serde(rename = "SIGN_ABORT")]
    SignAbort(Abort),
}

impl MessageBody {
    pub fn type_tag(&self) -> &'static str {
        match self {
            MessageBody::DkgPropose(_) => "DKG_PROPOSE",
            MessageBody::DkgAccept(_) => "DKG_ACCEPT",
            MessageBody::DkgRound1(_) => "DKG_ROUND1",
            MessageBody::DkgRound2(_) => "DKG_ROUND2",
            MessageBody::DkgRound3P2p(_) => "DKG_ROUND3_P2P",
            MessageBody::DkgRound4(_) => "DKG_ROUND4",
            MessageBody::DkgComplete(_) => "DKG_COMPLETE",
            MessageBody::DkgAbort(_) => "DKG_ABORT",
            MessageBody::SignRequest(_) => "SIGN_REQUEST",
            MessageBody::SignAccept(_) => "SIGN_ACCEPT",
            MessageBody::SignReject(_) => "SIGN_REJECT",
            MessageBody::SignRound1(_) => "SIGN_ROUND1",
            MessageBody::SignRound2(_) => "SIGN_ROUND2",
            MessageBody::SignRound3(_) => "SIGN_ROUND3",
            MessageBody::SignRound4(_) => "SIGN_ROUND4",
            MessageBody::SignComplete(_) => "SIGN_COMPLETE",
            MessageBody::SignAbort(_) => "SIGN_ABORT",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DkgPropose {
    pub ceremony_id: String,
    pub participants: Vec<String>,
    pub threshold: u16,
    pub deadline: i64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DkgAccept {
    pub ceremony_id: String,
    pub party_index: u16,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DkgRound1 {
    pub ceremony_id: String,
    pub party_index: u16,
    #[serde(with = "hex::serde")]
    pub pedersen_commitment: [u8; 32],
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DkgRound2 {
    pub ceremony_id: String,
    pub party_index: u16,
    #[serde(with = "crate::point_vec")]
    pub feldman_commitments: Vec<Point>,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub schnorr_r: Point,
    #[serde(with = "wallet_mpc_curve::serde_scalar")]
    pub schnorr_s: wallet_mpc_curve::Scalar,
    #[serde(with = "wallet_mpc_curve::serde_scalar")]
    pub blinding: wallet_mpc_curve::Scalar,
}

/// `Enc_{pk_j}(f_i(j))`, §4.4 Round 3: hybrid-encrypted under the
/// recipient's identity public key. Opaque here — `dkg` owns the hybrid
/// encryption scheme and only hands this crate already-sealed bytes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DkgRound3P2p {
    pub ceremony_id: String,
    pub from_party_index: u16,
    pub to_party_index: u16,
    #[serde(with = "hex::serde")]
    pub sealed_share: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DkgRound4 {
    pub ceremony_id: String,
    pub party_index: u16,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub public_share: Point,
    pub share_verified: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DkgComplete {
    pub ceremony_id: String,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub master_public_key: Point,
    #[serde(with = "hex::serde")]
    pub chain_code: [u8; 32],
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Abort {
    pub ceremony_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignRequest {
    pub session_id: String,
    pub initiator: String,
    pub initiator_party_index: u16,
    #[serde(with = "hex::serde")]
    pub tx_hash: [u8; 32],
    #[serde(with = "hex::serde")]
    pub raw_tx: Vec<u8>,
    pub derivation_path: String,
    pub deadline: i64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignAccept {
    pub session_id: String,
    pub party_index: u16,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignReject {
    pub session_id: String,
    pub party_index: u16,
    pub reason: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignRound1 {
    pub session_id: String,
    pub party_index: u16,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub gamma_point: Point,
    #[serde(with = "hex::serde")]
    pub paillier_n: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub ciphertext_k: Vec<u8>,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub k_point: Point,
    pub proof_gamma: wallet_mpc_curve::schnorr::Proof,
    pub proof_k: wallet_mpc_curve::schnorr::Proof,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignRound2 {
    pub session_id: String,
    pub from_party_index: u16,
    pub to_party_index: u16,
    #[serde(with = "hex::serde")]
    pub delta_enc: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub sigma_enc: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignRound3 {
    pub session_id: String,
    pub party_index: u16,
    #[serde(with = "wallet_mpc_curve::serde_scalar")]
    pub delta: wallet_mpc_curve::Scalar,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignRound4 {
    pub session_id: String,
    pub party_index: u16,
    #[serde(with = "wallet_mpc_curve::serde_scalar")]
    pub partial_signature: wallet_mpc_curve::Scalar,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub sigma_point: Point,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignComplete {
    pub session_id: String,
    #[serde(with = "hex::serde")]
    pub r: [u8; 32],
    #[serde(with = "hex::serde")]
    pub s: [u8; 32],
    pub v: u8,
}
