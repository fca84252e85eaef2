//! BIP32 non-hardened tweak derivation, EIP-55 addressing, and EIP-1559
//! transaction hashing — `spec.md` §4.5/§6.

use hmac::{Hmac, Mac};
use rlp::RlpStream;
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use thiserror::Error;
use wallet_mpc_curve::{point_from_hex, reduce_mod_n, Point, Scalar};

type HmacSha512 = Hmac<sha2::Sha512>;

/// Result of the two-step additive BIP32 tweak: the scalar `T` to add to
/// each signer's effective share, and the resulting child public key
/// `P + T·G` (`spec.md` §4.5).
#[derive(Debug, Clone, Copy)]
pub struct Tweak {
    pub t: Scalar,
    pub child_public_key: Point,
}

/// Derive the additive tweak for non-hardened child index `idx` from a
/// parent public key and chain code, per §4.5: HMAC-SHA512 is run twice,
/// first over `(parent_pubkey ‖ be32(0))` then over
/// `(intermediate_pubkey ‖ be32(idx))`, both keyed by the parent chain code,
/// summing the left 32 bytes of each output mod `n`.
pub fn derive_tweak(parent_public_key: &Point, parent_chain_code: &[u8; 32], idx: u32) -> Tweak {
    let (t1, intermediate) = hmac_step(parent_public_key, parent_chain_code, 0);
    let (t2, child) = hmac_step(&intermediate, parent_chain_code, idx);
    Tweak {
        t: t1 + t2,
        child_public_key: child,
    }
}

fn hmac_step(public_key: &Point, chain_code: &[u8; 32], index: u32) -> (Scalar, Point) {
    let mut mac = HmacSha512::new_from_slice(chain_code).expect("HMAC accepts any key length");
    mac.update(public_key.to_bytes(true).as_bytes());
    mac.update(&index.to_be_bytes());
    let out = mac.finalize().into_bytes();
    let t = reduce_mod_n(&out[..32]);
    let point = *public_key + Point::generator() * &t;
    (t, point)
}

/// Derive the BIP32 chain code for a freshly completed DKG ceremony, per
/// §4.4 Round 4: `HMAC-SHA512("CLIRift v1", P)[32..64]`.
pub fn derive_chain_code(master_public_key: &Point) -> [u8; 32] {
    let mut mac = HmacSha512::new_from_slice(b"CLIRift v1").expect("HMAC accepts any key length");
    mac.update(master_public_key.to_bytes(true).as_bytes());
    let out = mac.finalize().into_bytes();
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&out[32..64]);
    chain_code
}

/// Keccak-256, the hash function Ethereum uses throughout (not SHA3-256).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Derive the 20-byte Ethereum address from an uncompressed public key:
/// drop the `0x04` prefix, `keccak256` the remaining 64 bytes, take the
/// last 20 bytes.
pub fn address_from_public_key(public_key: &Point) -> [u8; 20] {
    let uncompressed = public_key.to_bytes(false);
    let tail = &uncompressed.as_bytes()[1..]; // drop the leading 0x04
    let hash = keccak256(tail);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    addr
}

/// EIP-55 mixed-case checksum encoding of a 20-byte address, `0x`-prefixed.
pub fn eip55_checksum(address: &[u8; 20]) -> String {
    let hex_lower = hex::encode(address);
    let hash = keccak256(hex_lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in hex_lower.chars().enumerate() {
        if c.is_ascii_digit() {
            out.push(c);
            continue;
        }
        // nibble i of the hash, high nibble first
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// BIP44 path display for an address index, fixed to Ethereum's
/// `m/44'/60'/0'/0` root (§6).
pub fn bip44_path(index: u32) -> String {
    format!("m/44'/60'/0'/0/{index}")
}

/// An EIP-1559 transaction, pre-signature. `access_list` is always empty in
/// this implementation — `spec.md` names `accessList=[]` as the only value
/// ever produced, so there is no encoder for populated access lists.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas: u64,
    pub to: Option<[u8; 20]>,
    pub value: u128,
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

fn append_uint(stream: &mut RlpStream, v: u128) {
    if v == 0 {
        stream.append_empty_data();
        return;
    }
    let bytes = v.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap();
    stream.append(&&bytes[first_nonzero..]);
}

/// RLP-encode `0x02 ‖ RLP(list)` and take `keccak256` — the bit-exact
/// derivation every signer independently recomputes from `rawTx` and
/// compares against the initiator's claimed `txHash` (§6).
pub fn tx_hash(tx: &Eip1559Transaction) -> [u8; 32] {
    let mut stream = RlpStream::new_list(9);
    append_uint(&mut stream, tx.chain_id as u128);
    append_uint(&mut stream, tx.nonce as u128);
    append_uint(&mut stream, tx.max_priority_fee_per_gas);
    append_uint(&mut stream, tx.max_fee_per_gas);
    append_uint(&mut stream, tx.gas as u128);
    match &tx.to {
        Some(addr) => {
            stream.append(&addr.as_slice());
        }
        None => {
            stream.append_empty_data();
        }
    }
    append_uint(&mut stream, tx.value);
    stream.append(&tx.data.as_slice());
    stream.begin_list(0); // accessList=[]

    let mut payload = Vec::with_capacity(stream.as_raw().len() + 1);
    payload.push(0x02);
    payload.extend_from_slice(stream.as_raw());
    keccak256(&payload)
}

#[derive(Debug, Error)]
pub enum EthError {
    #[error("recomputed tx hash does not match the claimed hash")]
    HashMismatch,
    #[error("invalid public key encoding: {0}")]
    InvalidPublicKey(#[source] wallet_mpc_curve::CurveError),
    #[error("rawTx does not decode to a well-formed transaction: {0}")]
    MalformedRawTx(serde_json::Error),
    #[error("derivation path {0:?} has no non-hardened final index")]
    InvalidDerivationPath(String),
}

/// Parse a hex-encoded compressed public key, mapping curve errors into
/// [`EthError`] for callers that only deal in Ethereum-shaped errors.
pub fn parse_public_key(hex_str: &str) -> Result<Point, EthError> {
    point_from_hex(hex_str).map_err(EthError::InvalidPublicKey)
}

/// Decode a `SIGN_REQUEST`'s `rawTx` bytes back into the transaction every
/// signer independently hashes and compares against the initiator's claimed
/// `txHash` (§6). `rawTx` carries the same JSON shape used for every other
/// on-disk/wire value in this system, not a pre-signature RLP blob — RLP is
/// only the hashing preimage, not the transport encoding.
pub fn decode_raw_tx(raw_tx: &[u8]) -> Result<Eip1559Transaction, EthError> {
    serde_json::from_slice(raw_tx).map_err(EthError::MalformedRawTx)
}

/// Extract the final non-hardened address index from a BIP44 path
/// (`m/44'/60'/0'/0/<index>`), §4.5's tweak derivation input. Hardened
/// segments (trailing `'`) are rejected — §1 scopes hardened derivation out.
pub fn extract_address_index(path: &str) -> Result<u32, EthError> {
    let last = path
        .rsplit('/')
        .next()
        .ok_or_else(|| EthError::InvalidDerivationPath(path.to_string()))?;
    last.parse::<u32>()
        .map_err(|_| EthError::InvalidDerivationPath(path.to_string()))
}

/// Verify that `claimed` matches the hash independently recomputed from
/// `tx` — the substitution defense every signer runs on `SIGN_REQUEST`
/// (§6, scenario 5).
pub fn verify_tx_hash(tx: &Eip1559Transaction, claimed: &[u8; 32]) -> Result<(), EthError> {
    if tx_hash(tx) == *claimed {
        Ok(())
    } else {
        Err(EthError::HashMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eip55_checksum_matches_known_vector() {
        // from EIP-55's reference test vectors
        let addr_hex = "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        let bytes = hex::decode(addr_hex).unwrap();
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&bytes);
        assert_eq!(
            eip55_checksum(&addr),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn eip55_is_idempotent() {
        let addr = [0x11u8; 20];
        let checksummed = eip55_checksum(&addr);
        let bytes = hex::decode(&checksummed[2..]).unwrap();
        let mut addr2 = [0u8; 20];
        addr2.copy_from_slice(&bytes);
        assert_eq!(checksummed, eip55_checksum(&addr2));
    }

    #[test]
    fn tx_hash_changes_with_value() {
        let mut tx = Eip1559Transaction {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas: 1_000_000_000,
            max_fee_per_gas: 30_000_000_000,
            gas: 21_000,
            to: Some([0x11; 20]),
            value: 1_000_000_000_000_000_000,
            data: vec![],
        };
        let h1 = tx_hash(&tx);
        tx.value += 1;
        let h2 = tx_hash(&tx);
        assert_ne!(h1, h2);
    }

    #[test]
    fn verify_tx_hash_detects_substitution() {
        let tx = Eip1559Transaction {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas: 1,
            max_fee_per_gas: 2,
            gas: 21_000,
            to: Some([0x22; 20]),
            value: 5,
            data: vec![],
        };
        let real_hash = tx_hash(&tx);
        let mut other = tx.clone();
        other.value = 6;
        assert!(verify_tx_hash(&other, &real_hash).is_err());
        assert!(verify_tx_hash(&tx, &real_hash).is_ok());
    }

    #[test]
    fn raw_tx_roundtrips_through_json_and_hash() {
        let tx = Eip1559Transaction {
            chain_id: 1,
            nonce: 4,
            max_priority_fee_per_gas: 1,
            max_fee_per_gas: 2,
            gas: 21_000,
            to: Some([0x33; 20]),
            value: 7,
            data: vec![],
        };
        let raw = serde_json::to_vec(&tx).unwrap();
        let decoded = decode_raw_tx(&raw).unwrap();
        assert_eq!(tx_hash(&decoded), tx_hash(&tx));
    }

    #[test]
    fn extracts_non_hardened_index() {
        assert_eq!(extract_address_index("m/44'/60'/0'/0/7").unwrap(), 7);
        assert!(extract_address_index("m/44'/60'/0'/0'").is_err());
    }

    #[test]
    fn tweak_child_pubkey_matches_t_times_g() {
        use rand::rngs::OsRng;
        use wallet_mpc_curve::SecretScalar;
        let mut rng = OsRng;
        let x = SecretScalar::random(&mut rng);
        let parent_pub = Point::generator() * &x;
        let chain_code = [7u8; 32];
        let tweak = derive_tweak(&parent_pub, &chain_code, 3);
        assert_eq!(
            tweak.child_public_key,
            parent_pub + Point::generator() * &tweak.t
        );
    }
}
