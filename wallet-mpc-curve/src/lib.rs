//! secp256k1 scalar/point field and domain-separated Schnorr proof of knowledge.
//!
//! Curve arithmetic rides on [`generic_ec`], the same crate the ambient
//! threshold-ECDSA ecosystem uses; this crate only adds the modular-reduction
//! and domain-separated Schnorr layer that `spec.md` §4.1 calls for.

pub mod schnorr;

use generic_ec::errors::InvalidScalar;
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;

/// The curve this crate is specialized for.
pub type Curve = generic_ec::curves::Secp256k1;
/// A curve point (secp256k1), 33-byte compressed serialization.
pub type Point = generic_ec::Point<Curve>;
/// A public scalar in `[0, n)`.
pub type Scalar = generic_ec::Scalar<Curve>;
/// A secret scalar; zeroized on drop.
pub type SecretScalar = generic_ec::SecretScalar<Curve>;

/// Curve order `n` for secp256k1, big-endian.
pub const ORDER_BE: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

fn order() -> BigUint {
    BigUint::from_bytes_be(&ORDER_BE)
}

/// Reduce an arbitrary-length big-endian byte string modulo the curve order
/// and lift the result into a [`Scalar`]. Used to turn hash digests (which
/// may exceed `n`) into scalars, per I1/§4.1's Fiat-Shamir challenge.
pub fn reduce_mod_n(bytes: &[u8]) -> Scalar {
    let x = BigUint::from_bytes_be(bytes) % order();
    let mut buf = [0u8; 32];
    let x_be = x.to_bytes_be();
    buf[32 - x_be.len()..].copy_from_slice(&x_be);
    // A value reduced mod n is always canonical, so this cannot fail except
    // for the vanishing-probability case where reduction yields exactly 0,
    // which `Scalar::from_be_bytes` accepts (only `SecretScalar` forbids 0).
    Scalar::from_be_bytes(buf).expect("reduced value is canonical")
}

/// Sample a scalar in `[1, n)` by rejection sampling, per §3's invariant that
/// a [`Scalar`]/[`SecretScalar`] is never zero.
pub fn random_nonzero_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> SecretScalar {
    SecretScalar::random(rng)
}

/// EIP-2 low-s normalization: `true` if `s > n/2` and the caller must negate
/// `s` (and flip the recovery bit) before broadcasting (`spec.md` §4.5
/// Assembly).
pub fn is_high_s(s: &Scalar) -> bool {
    let s = BigUint::from_bytes_be(s.to_be_bytes().as_bytes());
    s > order() / BigUint::from(2u32)
}

/// Negate `s` mod `n` — the other half of EIP-2 normalization.
pub fn negate_scalar(s: &Scalar) -> Scalar {
    reduce_mod_n(&(order() - BigUint::from_bytes_be(s.to_be_bytes().as_bytes())).to_bytes_be())
}

/// Standard ECDSA verification: does `(r, s)` verify against `public` for
/// message scalar `m`? `w = s^{-1}`, `u1 = m·w`, `u2 = r·w`,
/// accept iff `(u1·G + u2·public).x mod n == r`.
pub fn ecdsa_verify(public: &Point, m: &Scalar, r: &Scalar, s: &Scalar) -> bool {
    let Some(w) = s.invert() else { return false };
    let u1 = *m * &w;
    let u2 = *r * &w;
    let candidate = Point::generator() * &u1 + public * &u2;
    point_x_scalar(&candidate) == *r
}

/// Serialize a point to its 33-byte compressed form, hex-encoded — the wire
/// and on-disk representation mandated by §3/§6.
pub fn point_to_hex(p: &Point) -> String {
    hex::encode(p.to_bytes(true).as_bytes())
}

/// Parse a compressed-point hex string back into a [`Point`].
pub fn point_from_hex(s: &str) -> Result<Point, CurveError> {
    let bytes = hex::decode(s).map_err(|_| CurveError::MalformedHex)?;
    Point::from_bytes(&bytes).map_err(|_| CurveError::InvalidPoint)
}

/// The x-coordinate of `p`, reduced mod the curve order `n` — `r = R_x mod n`
/// in ECDSA's signing equation (`spec.md` §4.5 Round 4). Read out of the
/// compressed encoding rather than a coordinate accessor so this doesn't
/// depend on a richer `generic_ec` API than the rest of this crate already
/// uses.
pub fn point_x_scalar(p: &Point) -> Scalar {
    let bytes = p.to_bytes(true);
    reduce_mod_n(&bytes.as_bytes()[1..33])
}

/// The y-coordinate's parity bit (`0` even, `1` odd) from `p`'s compressed
/// encoding prefix (`0x02`/`0x03`) — the bit EIP-2/recovery-id math tracks
/// through a low-s flip.
pub fn point_y_parity(p: &Point) -> u8 {
    p.to_bytes(true).as_bytes()[0] & 1
}

/// Serialize a scalar to 32 big-endian bytes, hex-encoded.
pub fn scalar_to_hex(s: &Scalar) -> String {
    hex::encode(s.to_be_bytes().as_bytes())
}

/// Parse a hex-encoded scalar.
pub fn scalar_from_hex(s: &str) -> Result<Scalar, CurveError> {
    let bytes = hex::decode(s).map_err(|_| CurveError::MalformedHex)?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| CurveError::MalformedHex)?;
    Scalar::from_be_bytes(arr).map_err(CurveError::InvalidScalar)
}

/// `serde(with = "serde_point")` for fields holding a [`Point`]: hex of the
/// 33-byte compressed encoding, matching §3/§6's wire format.
pub mod serde_point {
    use super::{point_from_hex, point_to_hex, Point};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(p: &Point, s: S) -> Result<S::Ok, S::Error> {
        point_to_hex(p).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Point, D::Error> {
        let s = String::deserialize(d)?;
        point_from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// `serde(with = "serde_scalar")` for fields holding a [`Scalar`].
pub mod serde_scalar {
    use super::{scalar_from_hex, scalar_to_hex, Scalar};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(x: &Scalar, s: S) -> Result<S::Ok, S::Error> {
        scalar_to_hex(x).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Scalar, D::Error> {
        let s = String::deserialize(d)?;
        scalar_from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum CurveError {
    #[error("malformed hex encoding")]
    MalformedHex,
    #[error("bytes do not decode to a valid curve point")]
    InvalidPoint,
    #[error("bytes do not decode to a valid scalar: {0}")]
    InvalidScalar(#[source] InvalidScalar),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_hex_roundtrip() {
        let mut rng = rand::rngs::OsRng;
        let x = random_nonzero_scalar(&mut rng);
        let p = Point::generator() * &x;
        let hex = point_to_hex(&p);
        assert_eq!(hex.len(), 66);
        assert_eq!(point_from_hex(&hex).unwrap(), p);
    }

    #[test]
    fn reduce_mod_n_is_canonical() {
        let big = [0xffu8; 64];
        let s = reduce_mod_n(&big);
        // must round-trip through to_be_bytes/from_be_bytes without erroring
        assert!(Scalar::from_be_bytes(s.to_be_bytes().as_bytes().try_into().unwrap()).is_ok());
    }
}
