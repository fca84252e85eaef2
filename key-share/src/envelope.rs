//! Envelope encryption for [`PersistentKeyShare`](crate::PersistentKeyShare)
//! at rest, `spec.md` §4.6/§6.
//!
//! Two data-key sources are supported: an external KMS (abstracted behind
//! [`Kms`], since the KMS itself lives outside this system) and a local
//! Argon2id-derived key. Both land on the same wire shape so the store
//! doesn't need to know which path produced a given file.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SALT_LEN: usize = 16;

/// Binds a data key to the share it protects, per §6's `{NodeId, CeremonyId,
/// Purpose}` encryption context. Included unencrypted in the envelope so a
/// decrypting party can confirm it's opening the file it thinks it is.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EncryptionContext {
    pub node_id: String,
    pub ceremony_id: String,
    pub purpose: String,
}

/// Source of the 256-bit AES data key: either unwrapped by an external KMS,
/// or derived locally from a passphrase via Argon2id. The envelope records
/// which was used (and the material needed to redo it) under `kdf`.
pub trait Kms: Send + Sync {
    /// Generate a fresh 256-bit data key, returning it alongside an
    /// opaque, KMS-specific "wrapped" representation to persist.
    fn generate_data_key(&self, ctx: &EncryptionContext) -> Result<([u8; 32], Vec<u8>), EnvelopeError>;
    /// Recover a data key from its wrapped representation.
    fn unwrap_data_key(&self, wrapped: &[u8], ctx: &EncryptionContext) -> Result<[u8; 32], EnvelopeError>;
    /// Identifier stored in the envelope's `kdf` field (e.g. the KMS key ARN/id).
    fn key_id(&self) -> &str;
}

/// `{ version, algorithm, kdf, saltOrWrappedKey, iv, authTag, ciphertext,
/// encryptionContext? }`, §6's on-disk encrypted-share format.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub algorithm: String,
    pub kdf: String,
    #[serde(with = "hex::serde")]
    pub salt_or_wrapped_key: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub iv: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub auth_tag: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
    pub encryption_context: Option<EncryptionContext>,
}

impl Envelope {
    pub const CURRENT_VERSION: u32 = 1;
    pub const ALGORITHM: &'static str = "AES-256-GCM";
    const LOCAL_KDF: &'static str = "argon2id";

    /// Seal `plaintext` under a data key derived from `passphrase` via
    /// Argon2id with a fresh random salt. The passphrase and derived key are
    /// zeroized before returning.
    pub fn seal_local(passphrase: &[u8], plaintext: &[u8]) -> Result<Self, EnvelopeError> {
        let mut rng = rand::rngs::OsRng;
        let mut salt = vec![0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);

        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(passphrase, &salt, &mut key)
            .map_err(|_| EnvelopeError::KeyDerivationFailed)?;

        let sealed = Self::seal_with_key(&key, plaintext, Self::LOCAL_KDF.to_string(), salt, None);
        key.zeroize();
        sealed
    }

    /// Open an envelope sealed by [`seal_local`](Self::seal_local).
    pub fn open_local(&self, passphrase: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        if self.kdf != Self::LOCAL_KDF {
            return Err(EnvelopeError::KdfMismatch);
        }
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(passphrase, &self.salt_or_wrapped_key, &mut key)
            .map_err(|_| EnvelopeError::KeyDerivationFailed)?;
        let plaintext = self.open_with_key(&key);
        key.zeroize();
        plaintext
    }

    /// Seal `plaintext` under a data key freshly generated by `kms`.
    pub fn seal_kms(
        kms: &dyn Kms,
        ctx: EncryptionContext,
        plaintext: &[u8],
    ) -> Result<Self, EnvelopeError> {
        let (mut key, wrapped) = kms.generate_data_key(&ctx)?;
        let sealed = Self::seal_with_key(&key, plaintext, kms.key_id().to_string(), wrapped, Some(ctx));
        key.zeroize();
        sealed
    }

    /// Open an envelope sealed by [`seal_kms`](Self::seal_kms).
    pub fn open_kms(&self, kms: &dyn Kms) -> Result<Vec<u8>, EnvelopeError> {
        let ctx = self
            .encryption_context
            .as_ref()
            .ok_or(EnvelopeError::MissingEncryptionContext)?;
        let mut key = kms.unwrap_data_key(&self.salt_or_wrapped_key, ctx)?;
        let plaintext = self.open_with_key(&key);
        key.zeroize();
        plaintext
    }

    fn seal_with_key(
        key: &[u8; 32],
        plaintext: &[u8],
        kdf: String,
        salt_or_wrapped_key: Vec<u8>,
        encryption_context: Option<EncryptionContext>,
    ) -> Result<Self, EnvelopeError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EnvelopeError::InvalidKeyLength)?;
        let mut iv = vec![0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);
        let mut sealed = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EnvelopeError::EncryptionFailed)?;
        let tag_at = sealed.len() - TAG_LEN;
        let auth_tag = sealed.split_off(tag_at);
        Ok(Envelope {
            version: Self::CURRENT_VERSION,
            algorithm: Self::ALGORITHM.to_string(),
            kdf,
            salt_or_wrapped_key,
            iv,
            auth_tag,
            ciphertext: sealed,
            encryption_context,
        })
    }

    fn open_with_key(&self, key: &[u8; 32]) -> Result<Vec<u8>, EnvelopeError> {
        if self.version != Self::CURRENT_VERSION || self.algorithm != Self::ALGORITHM {
            return Err(EnvelopeError::UnsupportedFormat);
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EnvelopeError::InvalidKeyLength)?;
        let nonce = Nonce::from_slice(&self.iv);
        let mut combined = self.ciphertext.clone();
        combined.extend_from_slice(&self.auth_tag);
        cipher
            .decrypt(nonce, combined.as_slice())
            .map_err(|_| EnvelopeError::DecryptionFailed)
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("key derivation failed")]
    KeyDerivationFailed,
    #[error("envelope was not sealed with the expected KDF")]
    KdfMismatch,
    #[error("envelope has no encryption context but KMS unwrap requires one")]
    MissingEncryptionContext,
    #[error("unsupported envelope version or algorithm")]
    UnsupportedFormat,
    #[error("invalid AES-256 key length")]
    InvalidKeyLength,
    #[error("AEAD encryption failed")]
    EncryptionFailed,
    #[error("AEAD decryption failed: wrong key, or ciphertext was tampered with")]
    DecryptionFailed,
    #[error("KMS request failed: {0}")]
    Kms(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip() {
        let plaintext = b"share bytes go here";
        let env = Envelope::seal_local(b"correct horse battery staple", plaintext).unwrap();
        let recovered = env.open_local(b"correct horse battery staple").unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn local_wrong_passphrase_fails() {
        let env = Envelope::seal_local(b"right", b"secret").unwrap();
        assert!(env.open_local(b"wrong").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let mut env = Envelope::seal_local(b"pw", b"secret").unwrap();
        env.ciphertext[0] ^= 0xff;
        assert!(env.open_local(b"pw").is_err());
    }

    struct FakeKms {
        id: String,
    }

    impl Kms for FakeKms {
        fn generate_data_key(
            &self,
            _ctx: &EncryptionContext,
        ) -> Result<([u8; 32], Vec<u8>), EnvelopeError> {
            let key = [0x42u8; 32];
            Ok((key, key.to_vec()))
        }

        fn unwrap_data_key(
            &self,
            wrapped: &[u8],
            _ctx: &EncryptionContext,
        ) -> Result<[u8; 32], EnvelopeError> {
            wrapped
                .try_into()
                .map_err(|_| EnvelopeError::Kms("malformed wrapped key".into()))
        }

        fn key_id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn kms_roundtrip() {
        let kms = FakeKms { id: "kms-key-1".into() };
        let ctx = EncryptionContext {
            node_id: "node-a".into(),
            ceremony_id: "ceremony-1".into(),
            purpose: "key-share".into(),
        };
        let env = Envelope::seal_kms(&kms, ctx, b"top secret share").unwrap();
        assert_eq!(env.kdf, "kms-key-1");
        let recovered = env.open_kms(&kms).unwrap();
        assert_eq!(recovered, b"top secret share");
    }
}
