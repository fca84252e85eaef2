//! Non-interactive Schnorr proof of knowledge of a discrete log, Fiat-Shamir
//! transformed with a mandatory domain-separation context string.
//!
//! `ctx` must uniquely identify the call site (`spec.md` §4.1): reusing a
//! transcript prefix across two different proof purposes is a security bug,
//! not a style nit, so [`Proof::prove`] takes it as a required argument
//! rather than a default.

use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use crate::{random_nonzero_scalar, reduce_mod_n, Point, Scalar, SecretScalar};

/// A Schnorr proof `(R, s)` of knowledge of `x` such that `x·G = P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Proof {
    #[serde(with = "crate::serde_point")]
    pub r: Point,
    #[serde(with = "crate::serde_scalar")]
    pub s: Scalar,
}

fn challenge(public: &Point, r: &Point, ctx: &str) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(public.to_bytes(true).as_bytes());
    hasher.update(r.to_bytes(true).as_bytes());
    hasher.update(ctx.as_bytes());
    reduce_mod_n(&hasher.finalize())
}

/// Prove knowledge of `x` such that `x·G = public`, under domain `ctx`.
pub fn prove<R: RngCore + CryptoRng>(rng: &mut R, x: &SecretScalar, public: &Point, ctx: &str) -> Proof {
    let k = random_nonzero_scalar(rng);
    let r = Point::generator() * &k;
    let e = challenge(public, &r, ctx);
    let s = k.as_ref() + &e * x.as_ref();
    Proof { r, s }
}

/// Verify a Schnorr proof of knowledge of the discrete log of `public` under
/// domain `ctx`. Rejects `s == 0` per §4.1 ("reject if s ∉ [1,n)").
pub fn verify(public: &Point, proof: &Proof, ctx: &str) -> bool {
    if proof.s == Scalar::zero() {
        return false;
    }
    let e = challenge(public, &proof.r, ctx);
    let lhs = Point::generator() * &proof.s;
    let rhs = proof.r + public * &e;
    lhs == rhs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prove_and_verify_roundtrip() {
        let mut rng = rand::rngs::OsRng;
        let x = SecretScalar::random(&mut rng);
        let public = Point::generator() * &x;
        let proof = prove(&mut rng, &x, &public, "TEST-CTX-1");
        assert!(verify(&public, &proof, "TEST-CTX-1"));
    }

    #[test]
    fn domain_separation_is_enforced() {
        let mut rng = rand::rngs::OsRng;
        let x = SecretScalar::random(&mut rng);
        let public = Point::generator() * &x;
        let proof = prove(&mut rng, &x, &public, "CTX-A");
        assert!(!verify(&public, &proof, "CTX-B"));
    }

    #[test]
    fn tampered_proof_is_rejected() {
        let mut rng = rand::rngs::OsRng;
        let x = SecretScalar::random(&mut rng);
        let public = Point::generator() * &x;
        let mut proof = prove(&mut rng, &x, &public, "CTX");
        proof.s = proof.s + proof.s;
        assert!(!verify(&public, &proof, "CTX"));
    }
}
