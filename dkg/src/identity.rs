//! Hybrid encryption under a peer's identity public key, `spec.md` §4.4
//! Round 3: `Enc_{pk_j}(f_i(j))`.
//!
//! Ephemeral X25519 ECDH (identity keys follow the same construction
//! chainflip's p2p layer uses to turn a node's long-term keypair into an
//! encryption key) into HKDF-SHA256, sealing the plaintext with
//! XChaCha20-Poly1305 under a random 24-byte nonce.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand_core::{CryptoRng, RngCore};
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

const HKDF_INFO: &[u8] = b"dkg-round3-share-seal-v1";
const NONCE_LEN: usize = 24;

/// `ephemeral_pubkey ‖ nonce ‖ ciphertext`, the wire form a `DKG_ROUND3_P2P`
/// payload's `sealed_share` field carries.
pub struct Sealed {
    pub ephemeral_public_key: PublicKey,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(self.ephemeral_public_key.as_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.len() < 32 + NONCE_LEN {
            return Err(IdentityError::Truncated);
        }
        let mut pk_bytes = [0u8; 32];
        pk_bytes.copy_from_slice(&bytes[..32]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[32..32 + NONCE_LEN]);
        Ok(Sealed {
            ephemeral_public_key: PublicKey::from(pk_bytes),
            nonce,
            ciphertext: bytes[32 + NONCE_LEN..].to_vec(),
        })
    }
}

fn derive_key(shared_secret: &x25519_dalek::SharedSecret) -> Key {
    let hk = Hkdf::<Sha256>::new(None, shared_secret.as_bytes());
    let mut key_bytes = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key_bytes)
        .expect("32 is a valid HKDF-SHA256 output length");
    Key::from(key_bytes)
}

/// Seal `plaintext` (a 32-byte scalar share) under `recipient_public_key`.
pub fn seal<R: RngCore + CryptoRng>(
    rng: &mut R,
    recipient_public_key: &PublicKey,
    plaintext: &[u8],
) -> Sealed {
    let ephemeral_secret = EphemeralSecret::random_from_rng(&mut *rng);
    let ephemeral_public_key = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(recipient_public_key);
    let key = derive_key(&shared);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let cipher = XChaCha20Poly1305::new(&key);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("XChaCha20Poly1305 encryption cannot fail for in-memory buffers");

    Sealed {
        ephemeral_public_key,
        nonce: nonce_bytes,
        ciphertext,
    }
}

/// Open a message sealed by [`seal`] under the recipient's long-term secret.
pub fn open(identity_secret_key: &StaticSecret, sealed: &Sealed) -> Result<Vec<u8>, IdentityError> {
    let shared = identity_secret_key.diffie_hellman(&sealed.ephemeral_public_key);
    let key = derive_key(&shared);
    let cipher = XChaCha20Poly1305::new(&key);
    let nonce = XNonce::from_slice(&sealed.nonce);
    cipher
        .decrypt(nonce, sealed.ciphertext.as_slice())
        .map_err(|_| IdentityError::DecryptionFailed)
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("sealed message is truncated")]
    Truncated,
    #[error("AEAD decryption failed: wrong recipient key, or message was tampered with")]
    DecryptionFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let mut rng = rand::rngs::OsRng;
        let recipient_secret = StaticSecret::random_from_rng(&mut rng);
        let recipient_public = PublicKey::from(&recipient_secret);

        let plaintext = b"a 32 byte scalar share goes here";
        let sealed = seal(&mut rng, &recipient_public, plaintext);
        let bytes = sealed.to_bytes();
        let parsed = Sealed::from_bytes(&bytes).unwrap();

        let opened = open(&recipient_secret, &parsed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn wrong_recipient_fails() {
        let mut rng = rand::rngs::OsRng;
        let recipient_secret = StaticSecret::random_from_rng(&mut rng);
        let recipient_public = PublicKey::from(&recipient_secret);
        let wrong_secret = StaticSecret::random_from_rng(&mut rng);

        let sealed = seal(&mut rng, &recipient_public, b"secret");
        assert!(open(&wrong_secret, &sealed).is_err());
    }
}
