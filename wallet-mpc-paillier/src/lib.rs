//! Paillier keygen/encrypt/decrypt and the homomorphic MtA step, `spec.md`
//! §4.2. The longest blocking computation in the system (1024-bit prime
//! generation) is handed to a cooperative scheduler rather than run inline,
//! per §5's suspension-point discipline.

use libpaillier::unknown_order::BigNumber;
use rand_core::RngCore;
use thiserror::Error;

/// Minimum modulus size enforced by [`validate_modulus`] (§4.2/I5): `2^1022`.
const MIN_MODULUS_BITS: usize = 1022;

/// Paillier public key: just the modulus, since `g = N + 1` throughout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PublicKey {
    pub n: BigNumber,
}

impl PublicKey {
    fn n_squared(&self) -> BigNumber {
        &self.n * &self.n
    }
}

/// Paillier keypair `(N, λ, μ)`. Generated fresh per signing session and
/// dropped (never persisted) when the session ends.
pub struct Keypair {
    pub public: PublicKey,
    lambda: BigNumber,
    mu: BigNumber,
}

impl Keypair {
    /// Derive the keypair from two known primes (used by tests and by a
    /// pregenerated-primes fast path analogous to the teacher's
    /// `PregeneratedPrimes`).
    pub fn from_primes(p: BigNumber, q: BigNumber) -> Self {
        let n = &p * &q;
        let phi = (&p - 1) * (&q - 1);
        let lambda = lcm(&(&p - 1), &(&q - 1));
        let mu = lambda
            .invert(&n)
            .expect("lambda is invertible mod N for distinct odd primes");
        let _ = &phi; // phi kept only to document the lcm/invert relationship
        Self {
            public: PublicKey { n },
            lambda,
            mu,
        }
    }

    /// Generate a fresh keypair with `bits`-bit modulus (1024 per §4.2).
    /// Blocking prime generation runs on a blocking-pool thread and yields
    /// between the two candidate searches so the cooperative event loop
    /// (§5) is never starved.
    pub async fn generate(bits: usize) -> Self {
        let half = bits / 2;
        let p = tokio::task::spawn_blocking(move || generate_prime(half))
            .await
            .expect("prime generation task panicked");
        tokio::task::yield_now().await;
        let q = tokio::task::spawn_blocking(move || generate_prime(half))
            .await
            .expect("prime generation task panicked");
        Self::from_primes(p, q)
    }

    pub fn decrypt(&self, c: &BigNumber) -> Result<BigNumber, PaillierError> {
        let n2 = self.public.n_squared();
        if !(*c >= BigNumber::one() && *c < n2) {
            return Err(PaillierError::CiphertextOutOfRange);
        }
        let x = c
            .powmod(&self.lambda, &n2)
            .map_err(|_| PaillierError::ModExpFailed)?;
        let l = (&x - 1) / &self.public.n;
        let m = (l * &self.mu) % &self.public.n;
        Ok(m)
    }
}

/// Generate a `bits`-bit prime by rejection sampling odd candidates with the
/// top and bottom bits set, accepting on Miller-Rabin primality (the
/// underlying `unknown_order` backend runs far more than the 20 witnesses
/// §4.2 requires as a floor).
fn generate_prime(bits: usize) -> BigNumber {
    let nbytes = bits / 8;
    let mut rng = rand::rngs::OsRng;
    loop {
        let mut buf = vec![0u8; nbytes];
        rng.fill_bytes(&mut buf);
        buf[0] |= 0x80;
        if let Some(last) = buf.last_mut() {
            *last |= 1;
        }
        let candidate = BigNumber::from_slice(&buf);
        if candidate.is_prime() {
            return candidate;
        }
    }
}

fn lcm(a: &BigNumber, b: &BigNumber) -> BigNumber {
    let g = a.gcd(b);
    (a / &g) * b
}

/// Validate a peer-reported modulus per I5: odd, `>= 2^1022`,
/// `gcd(N, curve_order) = 1`, not a perfect square. Every peer-received
/// modulus must pass this before any MtA use (§4.2/§4.5 Round 1).
pub fn validate_modulus(n: &BigNumber) -> Result<(), PaillierError> {
    if n.bit_length() < MIN_MODULUS_BITS {
        return Err(PaillierError::ModulusTooSmall);
    }
    if n % BigNumber::from(2u32) == BigNumber::zero() {
        return Err(PaillierError::ModulusEven);
    }
    let order = BigNumber::from_slice(&wallet_mpc_curve::ORDER_BE);
    if n.gcd(&order) != BigNumber::one() {
        return Err(PaillierError::SharesFactorWithCurveOrder);
    }
    let root = n.sqrt();
    if &root * &root == *n {
        return Err(PaillierError::PerfectSquare);
    }
    Ok(())
}

/// Encrypt `m mod N` under `pk`: `c = (1 + N·(m mod N)) · r^N mod N^2`.
pub fn encrypt(pk: &PublicKey, m: &BigNumber) -> BigNumber {
    let n2 = pk.n_squared();
    let mut rng = rand::rngs::OsRng;
    let r = loop {
        let candidate = BigNumber::from_rng(&pk.n, &mut rng);
        if candidate.gcd(&pk.n) == BigNumber::one() && candidate != BigNumber::zero() {
            break candidate;
        }
    };
    let m = m % &pk.n;
    let base = (BigNumber::one() + &pk.n * &m) % &n2;
    let r_pow_n = r
        .powmod(&pk.n, &n2)
        .expect("r is invertible mod N, so r^N mod N^2 is always defined");
    (base * r_pow_n) % &n2
}

/// Homomorphic "plaintext × mult + β": `(c^mult mod N²) · Encrypt(N, β) mod N²`.
/// The multiplicative-to-additive step the signing engine uses to turn
/// `k_j · γ_i` and `k_j · L_i·x_i'` into additive shares without either party
/// learning the other's factor (§4.2/§4.5 Round 2).
pub fn mta(
    pk: &PublicKey,
    c: &BigNumber,
    mult: &BigNumber,
    beta: &BigNumber,
) -> Result<BigNumber, PaillierError> {
    let n2 = pk.n_squared();
    if !(*c >= BigNumber::one() && *c < n2) {
        return Err(PaillierError::CiphertextOutOfRange);
    }
    let scaled = c
        .powmod(mult, &n2)
        .map_err(|_| PaillierError::ModExpFailed)?;
    let masked = encrypt(pk, beta);
    Ok((scaled * masked) % &n2)
}

#[derive(Debug, Error)]
pub enum PaillierError {
    #[error("modulus is smaller than 2^1022")]
    ModulusTooSmall,
    #[error("modulus is even")]
    ModulusEven,
    #[error("modulus shares a factor with the curve order")]
    SharesFactorWithCurveOrder,
    #[error("modulus is a perfect square")]
    PerfectSquare,
    #[error("ciphertext is not in [1, N^2)")]
    CiphertextOutOfRange,
    #[error("modular exponentiation failed")]
    ModExpFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_keypair() -> Keypair {
        // small-but-distinct primes for fast unit tests; I5's size floor is
        // exercised separately against `validate_modulus`.
        Keypair::from_primes(BigNumber::from(101u32), BigNumber::from(113u32))
    }

    #[test]
    fn encrypt_decrypt_roundtrip_p7() {
        let kp = small_keypair();
        let m = BigNumber::from(42u32);
        let c = encrypt(&kp.public, &m);
        assert_eq!(kp.decrypt(&c).unwrap(), m % &kp.public.n);
    }

    #[test]
    fn mta_computes_additive_share_p7() {
        let kp = small_keypair();
        let a = BigNumber::from(7u32);
        let b = BigNumber::from(6u32);
        let beta = BigNumber::from(5u32);
        let c_a = encrypt(&kp.public, &a);
        let result = mta(&kp.public, &c_a, &b, &beta).unwrap();
        let plain = kp.decrypt(&result).unwrap();
        assert_eq!(plain, (&a * &b + &beta) % &kp.public.n);
    }

    #[test]
    fn rejects_small_modulus_p8() {
        let n = BigNumber::from(15u32);
        assert!(matches!(
            validate_modulus(&n),
            Err(PaillierError::ModulusTooSmall)
        ));
    }

    #[test]
    fn rejects_out_of_range_ciphertext() {
        let kp = small_keypair();
        let too_big = kp.public.n_squared() + BigNumber::one();
        assert!(matches!(
            kp.decrypt(&too_big),
            Err(PaillierError::CiphertextOutOfRange)
        ));
    }
}
