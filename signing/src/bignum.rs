//! Conversions between curve scalars and the arbitrary-precision integers
//! Paillier arithmetic runs on.

use libpaillier::unknown_order::BigNumber;
use wallet_mpc_curve::{reduce_mod_n, Scalar};

pub fn scalar_to_bignum(s: &Scalar) -> BigNumber {
    BigNumber::from_slice(s.to_be_bytes().as_bytes())
}

/// Reduce an arbitrary-size big-endian integer modulo the curve order and
/// lift it into a [`Scalar`] — used on every MtA plaintext coming back out
/// of Paillier decryption (`spec.md` §4.5 Round 3).
pub fn bignum_to_scalar_mod_n(b: &BigNumber) -> Scalar {
    reduce_mod_n(&b.to_bytes())
}
