//! Shared scaffolding for the signing-ceremony integration suite.

use key_share::PersistentKeyShare;
use wallet_mpc_curve::{Point, Scalar, SecretScalar};
use wallet_mpc_eth::Eip1559Transaction;
use wallet_mpc_proto::message::SignRequest;

/// A minimal single-party key share, good enough to drive `accept_request`
/// in isolation. Not a real DKG output — `public_key_shares` is a stand-in
/// and won't pass `PersistentKeyShare::validate`, but the signing coordinator
/// never calls that, only reads `x_i`/`master_public_key`/`chain_code`.
pub fn fabricate_share(party_index: u16, total_parties: u16, mut x_i: Scalar, master_public_key: Point) -> PersistentKeyShare {
    PersistentKeyShare {
        party_index,
        total_parties,
        x_i: SecretScalar::new(&mut x_i),
        public_key_shares: vec![Point::zero(); total_parties as usize],
        master_public_key,
        chain_code: [0u8; 32],
        ceremony_id: "test-ceremony".to_string(),
    }
}

pub fn sample_tx() -> Eip1559Transaction {
    Eip1559Transaction {
        chain_id: 1,
        nonce: 0,
        max_priority_fee_per_gas: 1_000_000_000,
        max_fee_per_gas: 30_000_000_000,
        gas: 21_000,
        to: Some([0x11; 20]),
        value: 1,
        data: vec![],
    }
}

pub fn sign_request(session_id: &str, initiator_party_index: u16, tx: &Eip1559Transaction, deadline: i64) -> SignRequest {
    SignRequest {
        session_id: session_id.to_string(),
        initiator: format!("party-{initiator_party_index}"),
        initiator_party_index,
        tx_hash: wallet_mpc_eth::tx_hash(tx),
        raw_tx: serde_json::to_vec(tx).expect("Eip1559Transaction serializes"),
        derivation_path: "m/44'/60'/0'/0/0".to_string(),
        deadline,
    }
}
