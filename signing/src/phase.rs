//! The per-node signing session state machine, `spec.md` §4.5:
//! `AwaitingAcceptances → round1 → round2 → round3 → round4 → complete | aborted`.
//!
//! Mirrors `dkg::phase`'s shape: static per-session parameters carried
//! forward round to round, round-local data holding exactly what that round
//! needs, coordinator-owned via `Option<SignPhase>`.

use std::collections::{BTreeMap, BTreeSet};

use libpaillier::unknown_order::BigNumber;
use wallet_mpc_curve::{point_x_scalar, reduce_mod_n, schnorr, Point, Scalar, SecretScalar};
use wallet_mpc_paillier::{Keypair, PublicKey};
use wallet_mpc_proto::SigningError;

use crate::bignum::{bignum_to_scalar_mod_n, scalar_to_bignum};

fn schnorr_ctx_gamma(session_id: &str) -> String {
    format!("GG20-GAMMA-{session_id}")
}

fn schnorr_ctx_ki(session_id: &str) -> String {
    format!("GG20-KI-{session_id}")
}

/// Fixed once a `SIGN_REQUEST` is accepted: everything that doesn't depend
/// on which `t`-subset eventually forms. `effective_share` is `x_i + T`
/// (`spec.md` §4.5's BIP32 tweak).
pub struct SessionSetup {
    pub session_id: String,
    pub my_party_index: u16,
    pub initiator_party_index: u16,
    pub threshold: u16,
    pub tx_hash: [u8; 32],
    pub deadline: i64,
    pub child_public_key: Point,
    pub effective_share: SecretScalar,
}

pub struct AwaitingData {
    pub accepted: BTreeSet<u16>,
    pub deadline: i64,
}

/// Fixed once the `t`-subset `S` is known: `lagrange_i = Lagrange(my_party_index, S)(0)`.
pub struct SignContext {
    pub setup: SessionSetup,
    pub signer_set: BTreeSet<u16>,
    pub lagrange_i: Scalar,
}

/// Whether this node's own Paillier keypair generation (an async suspension
/// point, §5) has finished. Round 1 is complete only once this is `Ready`
/// *and* every peer's Round 1 message has been recorded — whichever
/// happens last drives the transition to Round 2 exactly once (§8 scenario 6).
pub enum KeygenState {
    Pending,
    Ready(Box<Keypair>),
}

/// What an inbound `SIGN_ROUND1` broadcast carries, post-verification.
pub struct PeerRound1 {
    pub gamma_point: Point,
    pub paillier_pk: PublicKey,
    pub ciphertext_k: BigNumber,
    pub k_point: Point,
}

pub struct Round1Data {
    pub k_i: SecretScalar,
    pub gamma_i: SecretScalar,
    pub gamma_point: Point,
    pub k_point: Point,
    pub keygen: KeygenState,
    pub received: BTreeMap<u16, PeerRound1>,
}

pub struct Round1Broadcast {
    pub gamma_point: Point,
    pub paillier_n: BigNumber,
    pub ciphertext_k: BigNumber,
    pub k_point: Point,
    pub proof_gamma: schnorr::Proof,
    pub proof_k: schnorr::Proof,
}

/// Sample `k_i, γ_i` and their public points. The Paillier keypair isn't
/// generated here: that's the long-running suspension point the caller
/// drives separately (`Keypair::generate`), merged back in via
/// [`complete_local_keygen`].
pub fn begin_round1<R: rand_core::RngCore + rand_core::CryptoRng>(rng: &mut R) -> Round1Data {
    let k_i = SecretScalar::random(rng);
    let gamma_i = SecretScalar::random(rng);
    let gamma_point = Point::generator() * gamma_i.as_ref();
    let k_point = Point::generator() * k_i.as_ref();
    Round1Data {
        k_i,
        gamma_i,
        gamma_point,
        k_point,
        keygen: KeygenState::Pending,
        received: BTreeMap::new(),
    }
}

/// Merge a freshly finished local Paillier keygen into the round, producing
/// this node's own `SIGN_ROUND1` broadcast: `Enc_{N_i}(k_i)` and both
/// domain-separated Schnorr proofs.
pub fn complete_local_keygen<R: rand_core::RngCore + rand_core::CryptoRng>(
    rng: &mut R,
    session_id: &str,
    data: &mut Round1Data,
    keypair: Keypair,
) -> Round1Broadcast {
    let proof_gamma = schnorr::prove(rng, &data.gamma_i, &data.gamma_point, &schnorr_ctx_gamma(session_id));
    let proof_k = schnorr::prove(rng, &data.k_i, &data.k_point, &schnorr_ctx_ki(session_id));
    let ciphertext_k = wallet_mpc_paillier::encrypt(&keypair.public, &scalar_to_bignum(data.k_i.as_ref()));
    let paillier_n = keypair.public.n.clone();
    data.keygen = KeygenState::Ready(Box::new(keypair));
    Round1Broadcast {
        gamma_point: data.gamma_point,
        paillier_n,
        ciphertext_k,
        k_point: data.k_point,
        proof_gamma,
        proof_k,
    }
}

/// Validate and record an inbound `SIGN_ROUND1` from `from_party`: peer
/// modulus validation (I5), ciphertext range, and both Schnorr proofs —
/// every check §4.5 Round 1 requires before a peer's values are trusted.
#[allow(clippy::too_many_arguments)]
pub fn verify_and_record_round1(
    session_id: &str,
    data: &mut Round1Data,
    from_party: u16,
    gamma_point: Point,
    n: BigNumber,
    ciphertext_k: BigNumber,
    k_point: Point,
    proof_gamma: &schnorr::Proof,
    proof_k: &schnorr::Proof,
) -> Result<(), SigningError> {
    if data.received.contains_key(&from_party) {
        return Err(SigningError::Equivocation(from_party, "round1"));
    }
    wallet_mpc_paillier::validate_modulus(&n).map_err(|source| SigningError::InvalidModulus {
        party: from_party,
        source,
    })?;
    let n2 = &n * &n;
    if !(ciphertext_k >= BigNumber::one() && ciphertext_k < n2) {
        return Err(SigningError::CiphertextOutOfRange(from_party));
    }
    if !schnorr::verify(&gamma_point, proof_gamma, &schnorr_ctx_gamma(session_id)) {
        return Err(SigningError::SchnorrVerificationFailed {
            party: from_party,
            which: "gamma",
        });
    }
    if !schnorr::verify(&k_point, proof_k, &schnorr_ctx_ki(session_id)) {
        return Err(SigningError::SchnorrVerificationFailed {
            party: from_party,
            which: "k",
        });
    }
    data.received.insert(
        from_party,
        PeerRound1 {
            gamma_point,
            paillier_pk: PublicKey { n },
            ciphertext_k,
            k_point,
        },
    );
    Ok(())
}

/// Round 1 is complete iff local keygen has finished *and* all `t-1` peer
/// messages are in — independent of arrival order (§5/§8 scenario 6).
pub fn round1_complete(threshold: u16, data: &Round1Data) -> bool {
    matches!(data.keygen, KeygenState::Ready(_)) && data.received.len() == usize::from(threshold) - 1
}

/// A per-peer `SIGN_ROUND2` payload: the two MtA ciphertexts addressed to
/// that peer.
pub struct Round2Payload {
    pub delta_enc: BigNumber,
    pub sigma_enc: BigNumber,
}

pub struct Round2Data {
    pub round1: Round1Data,
    pub neg_beta_delta: BTreeMap<u16, Scalar>,
    pub neg_beta_sigma: BTreeMap<u16, Scalar>,
    pub received_mta: BTreeMap<u16, (BigNumber, BigNumber)>,
}

/// Compute the per-peer MtA messages for Round 2: `Enc_{N_j}(k_j·γ_i + β_δ[j])`
/// and `Enc_{N_j}(k_j·L_i·x_i' + β_σ[j])` for every peer `j`, retaining the
/// negated blinding scalars as this node's own additive shares from the
/// `j`-direction MtA (§4.5 Round 2).
pub fn start_round2<R: rand_core::RngCore + rand_core::CryptoRng>(
    rng: &mut R,
    ctx: &SignContext,
    round1: Round1Data,
) -> Result<(Round2Data, Vec<(u16, Round2Payload)>), SigningError> {
    let mut neg_beta_delta = BTreeMap::new();
    let mut neg_beta_sigma = BTreeMap::new();
    let mut outgoing = Vec::with_capacity(round1.received.len());

    let gamma_i = *round1.gamma_i.as_ref();
    let sigma_mult_scalar = (*ctx.setup.effective_share.as_ref()) * &ctx.lagrange_i;
    let gamma_mult = scalar_to_bignum(&gamma_i);
    let sigma_mult = scalar_to_bignum(&sigma_mult_scalar);

    for (&j, peer) in &round1.received {
        let beta_delta = SecretScalar::random(rng);
        let beta_sigma = SecretScalar::random(rng);

        let delta_enc = wallet_mpc_paillier::mta(
            &peer.paillier_pk,
            &peer.ciphertext_k,
            &gamma_mult,
            &scalar_to_bignum(beta_delta.as_ref()),
        )
        .map_err(|_| SigningError::CiphertextOutOfRange(j))?;
        let sigma_enc = wallet_mpc_paillier::mta(
            &peer.paillier_pk,
            &peer.ciphertext_k,
            &sigma_mult,
            &scalar_to_bignum(beta_sigma.as_ref()),
        )
        .map_err(|_| SigningError::CiphertextOutOfRange(j))?;

        neg_beta_delta.insert(j, -*beta_delta.as_ref());
        neg_beta_sigma.insert(j, -*beta_sigma.as_ref());
        outgoing.push((j, Round2Payload { delta_enc, sigma_enc }));
    }

    Ok((
        Round2Data {
            round1,
            neg_beta_delta,
            neg_beta_sigma,
            received_mta: BTreeMap::new(),
        },
        outgoing,
    ))
}

/// Record an inbound `SIGN_ROUND2` P2P message from `from_party`, addressed
/// to this node: its two MtA ciphertexts must lie in `[1, N_i^2)` under this
/// node's *own* modulus, since they were encrypted under it.
pub fn verify_and_record_round2(
    data: &mut Round2Data,
    from_party: u16,
    delta_enc: BigNumber,
    sigma_enc: BigNumber,
) -> Result<(), SigningError> {
    if data.received_mta.contains_key(&from_party) {
        return Err(SigningError::Equivocation(from_party, "round2"));
    }
    let my_n2 = match &data.round1.keygen {
        KeygenState::Ready(kp) => &kp.public.n * &kp.public.n,
        KeygenState::Pending => unreachable!("round2 only reachable once keygen is ready"),
    };
    if !(delta_enc >= BigNumber::one() && delta_enc < my_n2) || !(sigma_enc >= BigNumber::one() && sigma_enc < my_n2)
    {
        return Err(SigningError::CiphertextOutOfRange(from_party));
    }
    data.received_mta.insert(from_party, (delta_enc, sigma_enc));
    Ok(())
}

pub fn round2_complete(threshold: u16, data: &Round2Data) -> bool {
    data.received_mta.len() == usize::from(threshold) - 1
}

pub struct Round3Data {
    pub round1: Round1Data,
    pub sigma_i: Scalar,
    pub own_delta: Scalar,
    pub received_delta: BTreeMap<u16, Scalar>,
}

/// Decrypt every inbound MtA ciphertext under this node's own Paillier
/// secret key and form `δ_i`/`σ_i` (§4.5 Round 3). Only `δ_i` is ever
/// broadcast; `σ_i` stays in the session until Round 4.
pub fn start_round3(ctx: &SignContext, data: Round2Data) -> (Round3Data, Scalar) {
    let keypair = match &data.round1.keygen {
        KeygenState::Ready(kp) => kp,
        KeygenState::Pending => unreachable!("round3 only reachable once keygen is ready"),
    };

    let k_i = *data.round1.k_i.as_ref();
    let gamma_i = *data.round1.gamma_i.as_ref();
    let x_i_prime = *ctx.setup.effective_share.as_ref();

    let mut delta_i = k_i * &gamma_i;
    let mut sigma_i = (k_i * &ctx.lagrange_i) * &x_i_prime;

    for (j, (delta_enc, sigma_enc)) in &data.received_mta {
        let delta_plain = bignum_to_scalar_mod_n(&keypair.decrypt(delta_enc).expect("range-checked in round 2"));
        let sigma_plain = bignum_to_scalar_mod_n(&keypair.decrypt(sigma_enc).expect("range-checked in round 2"));
        delta_i = delta_i + delta_plain + data.neg_beta_delta[j];
        sigma_i = sigma_i + sigma_plain + data.neg_beta_sigma[j];
    }

    (
        Round3Data {
            round1: data.round1,
            sigma_i,
            own_delta: delta_i,
            received_delta: BTreeMap::new(),
        },
        delta_i,
    )
}

/// Record an inbound `SIGN_ROUND3` broadcast `δ_j` from `from_party`.
pub fn record_round3_delta(data: &mut Round3Data, from_party: u16, delta: Scalar) -> Result<(), SigningError> {
    if data.received_delta.insert(from_party, delta).is_some() {
        return Err(SigningError::Equivocation(from_party, "round3"));
    }
    Ok(())
}

pub fn round3_complete(threshold: u16, data: &Round3Data) -> bool {
    data.received_delta.len() == usize::from(threshold) - 1
}

pub struct Round4Data {
    pub round1: Round1Data,
    pub r: Scalar,
    pub big_r: Point,
    pub s_i: Scalar,
    pub received_partial: BTreeMap<u16, (Scalar, Point)>,
}

/// Aggregate `Δ = Σ δ_i`, recover `R = Δ^{-1}·Σ γ_j·G` and `r = R_x mod n`,
/// then compute this node's partial signature `s_i = k_i·m + r·σ_i`
/// (§4.5 Round 4). Refuses to proceed on either algebraic degeneracy.
pub fn start_round4(
    ctx: &SignContext,
    my_party_index: u16,
    data: Round3Data,
) -> Result<(Round4Data, Scalar, Point), SigningError> {
    let mut big_delta = data.own_delta;
    for d in data.received_delta.values() {
        big_delta = big_delta + *d;
    }
    if big_delta == Scalar::zero() {
        return Err(SigningError::DegenerateDelta);
    }
    let delta_inv = big_delta.invert().ok_or(SigningError::DegenerateDelta)?;

    let mut gamma_sum_point = data.round1.gamma_point;
    for peer in data.round1.received.values() {
        gamma_sum_point = gamma_sum_point + peer.gamma_point;
    }
    let big_r = gamma_sum_point * &delta_inv;
    let r = point_x_scalar(&big_r);
    if r == Scalar::zero() {
        return Err(SigningError::DegenerateR);
    }

    let m = reduce_mod_n(&ctx.setup.tx_hash);
    let k_i = *data.round1.k_i.as_ref();
    let s_i = (k_i * &m) + (r * &data.sigma_i);
    let sigma_point_i = Point::generator() * &data.sigma_i;

    let mut received_partial = BTreeMap::new();
    received_partial.insert(my_party_index, (s_i, sigma_point_i));

    Ok((
        Round4Data {
            round1: data.round1,
            r,
            big_r,
            s_i,
            received_partial,
        },
        s_i,
        sigma_point_i,
    ))
}

/// Verify an inbound partial signature `s_j·G =? m·(k_j·G) + r·(σ_j·G)`
/// using this peer's Round 1 committed `k_j·G`, and record it.
pub fn verify_and_record_round4(
    ctx: &SignContext,
    data: &mut Round4Data,
    from_party: u16,
    partial_signature: Scalar,
    sigma_point: Point,
) -> Result<(), SigningError> {
    if data.received_partial.contains_key(&from_party) {
        return Err(SigningError::Equivocation(from_party, "round4"));
    }
    let k_point = data
        .round1
        .received
        .get(&from_party)
        .ok_or(SigningError::PartialSignatureInvalid(from_party))?
        .k_point;
    let m = reduce_mod_n(&ctx.setup.tx_hash);
    let lhs = Point::generator() * &partial_signature;
    let rhs = (k_point * &m) + (sigma_point * &data.r);
    if lhs != rhs {
        return Err(SigningError::PartialSignatureInvalid(from_party));
    }
    data.received_partial.insert(from_party, (partial_signature, sigma_point));
    Ok(())
}

pub fn round4_complete(threshold: u16, data: &Round4Data) -> bool {
    data.received_partial.len() == usize::from(threshold)
}

#[derive(Debug, Clone, Copy)]
pub struct CompleteData {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

/// Assemble `s = Σ s_i`, apply EIP-2 low-s normalization, compute the
/// recovery byte, and independently verify the signature against the
/// derived child public key before it is ever allowed out (§4.5 Assembly,
/// §7's last-line defense).
pub fn finish(ctx: &SignContext, data: Round4Data) -> Result<CompleteData, SigningError> {
    let mut s = data
        .received_partial
        .values()
        .fold(Scalar::zero(), |acc, (s_i, _)| acc + *s_i);
    let mut y_parity = wallet_mpc_curve::point_y_parity(&data.big_r);
    if wallet_mpc_curve::is_high_s(&s) {
        s = wallet_mpc_curve::negate_scalar(&s);
        y_parity ^= 1;
    }

    let m = reduce_mod_n(&ctx.setup.tx_hash);
    if !wallet_mpc_curve::ecdsa_verify(&ctx.setup.child_public_key, &m, &data.r, &s) {
        return Err(SigningError::AssemblyVerificationFailed);
    }

    let r_bytes: [u8; 32] = data.r.to_be_bytes().as_bytes().try_into().expect("scalar is 32 bytes");
    let s_bytes: [u8; 32] = s.to_be_bytes().as_bytes().try_into().expect("scalar is 32 bytes");
    Ok(CompleteData {
        r: r_bytes,
        s: s_bytes,
        v: 27 + y_parity,
    })
}

pub enum SignPhase {
    Idle,
    AwaitingAcceptances(SessionSetup, AwaitingData),
    Round1(SignContext, Round1Data),
    Round2(SignContext, Round2Data),
    Round3(SignContext, Round3Data),
    Round4(SignContext, Round4Data),
    Complete(SignContext, CompleteData),
    Aborted { session_id: String, reason: String },
}

impl SignPhase {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SignPhase::Idle => None,
            SignPhase::AwaitingAcceptances(s, _) => Some(&s.session_id),
            SignPhase::Round1(c, _) => Some(&c.setup.session_id),
            SignPhase::Round2(c, _) => Some(&c.setup.session_id),
            SignPhase::Round3(c, _) => Some(&c.setup.session_id),
            SignPhase::Round4(c, _) => Some(&c.setup.session_id),
            SignPhase::Complete(c, _) => Some(&c.setup.session_id),
            SignPhase::Aborted { session_id, .. } => Some(session_id),
        }
    }

    /// The session-wide deadline, where one applies (§3/§4.5) — `None` once
    /// the session has already finished or aborted.
    pub fn deadline(&self) -> Option<i64> {
        match self {
            SignPhase::Idle | SignPhase::Complete(..) | SignPhase::Aborted { .. } => None,
            SignPhase::AwaitingAcceptances(_, d) => Some(d.deadline),
            SignPhase::Round1(c, _) => Some(c.setup.deadline),
            SignPhase::Round2(c, _) => Some(c.setup.deadline),
            SignPhase::Round3(c, _) => Some(c.setup.deadline),
            SignPhase::Round4(c, _) => Some(c.setup.deadline),
        }
    }
}
