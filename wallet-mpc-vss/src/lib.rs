//! Shamir secret sharing, Feldman verifiable secret sharing, Pedersen hash
//! commitments, and Lagrange interpolation — `spec.md` §4.3.

use sha2::{Digest, Sha256};
use thiserror::Error;
use wallet_mpc_curve::{Point, Scalar, SecretScalar};

/// A degree `t-1` polynomial `f(x) = a_0 + a_1 x + ... + a_{t-1} x^{t-1} mod n`
/// with secret intercept `a_0`. Lives only for the duration of a DKG round;
/// each coefficient is a [`SecretScalar`] so the whole polynomial zeroizes
/// itself on drop (`spec.md` §3: "Created in DKG Round 1, erased after Round 4").
pub struct Polynomial {
    coeffs: Vec<SecretScalar>,
}

impl Polynomial {
    /// Sample coefficients `[secret, a_1, ..., a_{t-1}]`, each `a_k` uniform
    /// in `[0, n)` except the intercept which is the caller-supplied secret.
    pub fn generate<R: rand_core::RngCore + rand_core::CryptoRng>(
        rng: &mut R,
        secret: SecretScalar,
        threshold: u16,
    ) -> Self {
        let mut coeffs = Vec::with_capacity(threshold as usize);
        coeffs.push(secret);
        for _ in 1..threshold {
            coeffs.push(SecretScalar::random(rng));
        }
        Self { coeffs }
    }

    pub fn threshold(&self) -> u16 {
        self.coeffs.len() as u16
    }

    pub fn intercept(&self) -> &Scalar {
        self.coeffs[0].as_ref()
    }

    /// Horner evaluation of `f(x) mod n`.
    pub fn eval(&self, x: u16) -> Scalar {
        let x = Scalar::from(u64::from(x));
        let mut acc = Scalar::zero();
        for c in self.coeffs.iter().rev() {
            acc = acc * &x + c.as_ref();
        }
        acc
    }

    /// Feldman commitments `[a_k · G]_k`, one compressed point per
    /// coefficient, published in Round 2.
    pub fn feldman_commit(&self) -> Vec<Point> {
        self.coeffs
            .iter()
            .map(|c| Point::generator() * c.as_ref())
            .collect()
    }
}

/// Verify a Shamir share `share = f_i(party)` against the sender's Feldman
/// commitments: `share·G =? Σ_k party^k · C_k`.
pub fn feldman_verify(share: &Scalar, party: u16, commitments: &[Point]) -> bool {
    let x = Scalar::from(u64::from(party));
    let mut x_pow = Scalar::from(1u64);
    let mut expected = Point::zero();
    for c in commitments {
        expected = expected + c * &x_pow;
        x_pow = x_pow * &x;
    }
    Point::generator() * share == expected
}

/// Lagrange coefficient `L_i(0)` of party `i` within subset `subset`:
/// `Π_{j ∈ subset, j≠i} ( (−j) · (i−j)^{−1} ) mod n`.
///
/// The same primitive also assembles a threshold secret from shares: see
/// [`interpolate_at_zero`].
pub fn lagrange_coefficient(i: u16, subset: &[u16]) -> Scalar {
    let xi = Scalar::from(u64::from(i));
    let mut acc = Scalar::from(1u64);
    for &j in subset {
        if j == i {
            continue;
        }
        let xj = Scalar::from(u64::from(j));
        let num = -xj;
        let den = (xi - xj)
            .invert()
            .expect("subset members are pairwise distinct, so i - j != 0");
        acc = acc * &(num * &den);
    }
    acc
}

/// Reconstruct `f(0)` from `t`-many `(index, share)` pairs via Lagrange
/// interpolation: `Σ_i L_i(0) · f(i)`.
pub fn interpolate_at_zero(shares: &[(u16, Scalar)]) -> Scalar {
    let subset: Vec<u16> = shares.iter().map(|(i, _)| *i).collect();
    shares
        .iter()
        .fold(Scalar::zero(), |acc, (i, share)| {
            acc + lagrange_coefficient(*i, &subset) * share
        })
}

/// A SHA-256 hash commitment to a list of Feldman points, opened with a
/// blinding scalar. Hiding follows from `r`'s uniformity, binding from
/// SHA-256 collision resistance (`spec.md` I4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PedersenCommitment(pub [u8; 32]);

impl serde::Serialize for PedersenCommitment {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&hex::encode(self.0), s)
    }
}

impl<'de> serde::Deserialize<'de> for PedersenCommitment {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))?;
        Ok(PedersenCommitment(arr))
    }
}

fn digest_points(points: &[Point], r: &Scalar) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for p in points {
        hasher.update(p.to_bytes(true).as_bytes());
    }
    hasher.update(r.to_be_bytes().as_bytes());
    hasher.finalize().into()
}

/// Commit to `points` with blinding `r`.
pub fn pedersen_commit(points: &[Point], r: &Scalar) -> PedersenCommitment {
    PedersenCommitment(digest_points(points, r))
}

/// Open a commitment: recompute the hash and compare in constant time is not
/// required here since the commitment itself carries no secret — only
/// equality matters.
pub fn pedersen_verify(commitment: &PedersenCommitment, points: &[Point], r: &Scalar) -> bool {
    commitment.0 == digest_points(points, r)
}

#[derive(Debug, Error)]
pub enum VssError {
    #[error("share does not match the sender's Feldman commitments")]
    FeldmanMismatch,
    #[error("Pedersen opening does not match the commitment")]
    PedersenMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn poly(t: u16) -> Polynomial {
        let mut rng = OsRng;
        Polynomial::generate(&mut rng, SecretScalar::random(&mut rng), t)
    }

    #[test]
    fn lagrange_recovers_intercept_p1() {
        let f = poly(3);
        let subset = [1u16, 2, 4];
        let shares: Vec<(u16, Scalar)> = subset.iter().map(|&i| (i, f.eval(i))).collect();
        assert_eq!(interpolate_at_zero(&shares), *f.intercept());
    }

    #[test]
    fn feldman_rejects_tampered_share_p5() {
        let f = poly(2);
        let commitments = f.feldman_commit();
        let share = f.eval(7);
        assert!(feldman_verify(&share, 7, &commitments));
        let tampered = share + Scalar::from(1u64);
        assert!(!feldman_verify(&tampered, 7, &commitments));
    }

    #[test]
    fn pedersen_binding_p4() {
        let mut rng = OsRng;
        let f = poly(3);
        let points = f.feldman_commit();
        let r = *SecretScalar::random(&mut rng).as_ref();
        let c = pedersen_commit(&points, &r);
        assert!(pedersen_verify(&c, &points, &r));

        let mut tampered_points = points.clone();
        tampered_points[0] = tampered_points[0] + Point::generator();
        assert!(!pedersen_verify(&c, &tampered_points, &r));

        let tampered_r = r + Scalar::from(1u64);
        assert!(!pedersen_verify(&c, &points, &tampered_r));
    }

    #[test]
    fn lagrange_weights_sum_to_one() {
        let subset = [1u16, 3, 5];
        let sum = subset
            .iter()
            .fold(Scalar::zero(), |acc, &i| acc + lagrange_coefficient(i, &subset));
        assert_eq!(sum, Scalar::from(1u64));
    }
}
