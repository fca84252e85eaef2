//! Four-round GG20-style threshold signing engine, `spec.md` §4.5.
//!
//! Mirrors `dkg`'s ownership model (§5): the coordinator owns exactly one
//! `Option<SignPhase>` at a time. Every `handle_*`/`start_*` method is
//! synchronous and runs to completion without an internal `.await`, so the
//! critical-section discipline (mutate state, then suspend) holds trivially;
//! the one genuine suspension point — this node's Paillier keygen — is driven
//! by the caller and merged back in via [`SigningCoordinator::complete_local_keygen`],
//! which is exactly what makes the Round 1 completion race (§8 scenario 6)
//! safe regardless of arrival order.

pub mod bignum;
pub mod phase;

use std::collections::BTreeSet;

use libpaillier::unknown_order::BigNumber;
use tracing::{instrument, warn};
use wallet_mpc_curve::{Point, Scalar, SecretScalar};
use wallet_mpc_paillier::Keypair;
use wallet_mpc_proto::message::SignRequest;
use wallet_mpc_proto::SigningError;

pub use phase::{CompleteData, Round1Broadcast, Round2Payload, SignPhase};

/// Owns the single in-flight signing session for this node. `None` means
/// idle. Dropping or replacing the held phase frees every ephemeral secret —
/// `k_i`, `γ_i`, the effective share, and the Paillier keypair all zeroize or
/// are simply dropped, satisfying §4.5's "an aborted session discards all
/// session-local secret material" rule without a hand-rolled `Drop` impl.
pub struct SigningCoordinator {
    session: Option<SignPhase>,
}

impl Default for SigningCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningCoordinator {
    pub fn new() -> Self {
        SigningCoordinator { session: None }
    }

    pub fn phase(&self) -> Option<&SignPhase> {
        self.session.as_ref()
    }

    fn abort(&mut self, session_id: String, reason: String) -> SigningError {
        warn!(session_id = %session_id, %reason, "aborting signing session");
        let err = SigningError::Aborted(reason.clone());
        self.session = Some(SignPhase::Aborted { session_id, reason });
        err
    }

    /// Abort the session if `now_ms` has passed its current phase's deadline.
    /// Idle, Complete, and already-Aborted sessions have no deadline to miss.
    pub fn check_deadline(&mut self, now_ms: i64) -> Result<(), SigningError> {
        let Some(deadline) = self.session.as_ref().and_then(SignPhase::deadline) else {
            return Ok(());
        };
        if now_ms > deadline {
            let session_id = self
                .session
                .as_ref()
                .and_then(SignPhase::session_id)
                .map(str::to_owned)
                .unwrap_or_default();
            return Err(self.abort(session_id, SigningError::DeadlineExceeded.to_string()));
        }
        Ok(())
    }

    /// Accept a `SIGN_REQUEST`: independently recompute and check `txHash`
    /// (§6/§8 scenario 5's substitution defense) before anything else, derive
    /// this node's effective share `x_i + T` via the non-hardened BIP32 tweak
    /// for the request's derivation path (§4.5), and open the acceptance
    /// window.
    #[instrument(skip(self, share, req))]
    pub fn accept_request(
        &mut self,
        share: &key_share::PersistentKeyShare,
        req: &SignRequest,
        threshold: u16,
        my_party_index: u16,
    ) -> Result<(), SigningError> {
        let tx = wallet_mpc_eth::decode_raw_tx(&req.raw_tx).map_err(|_| SigningError::TxHashMismatch)?;
        wallet_mpc_eth::verify_tx_hash(&tx, &req.tx_hash).map_err(|_| SigningError::TxHashMismatch)?;
        let idx = wallet_mpc_eth::extract_address_index(&req.derivation_path).map_err(|_| SigningError::TxHashMismatch)?;
        let tweak = wallet_mpc_eth::derive_tweak(&share.master_public_key, &share.chain_code, idx);

        let mut sum = *share.x_i.as_ref() + tweak.t;
        let effective_share = SecretScalar::new(&mut sum);

        let setup = phase::SessionSetup {
            session_id: req.session_id.clone(),
            my_party_index,
            initiator_party_index: req.initiator_party_index,
            threshold,
            tx_hash: req.tx_hash,
            deadline: req.deadline,
            child_public_key: tweak.child_public_key,
            effective_share,
        };
        self.session = Some(SignPhase::AwaitingAcceptances(
            setup,
            phase::AwaitingData {
                accepted: BTreeSet::new(),
                deadline: req.deadline,
            },
        ));
        Ok(())
    }

    /// Record a peer's `SIGN_ACCEPT`. Returns `true` once `t` signers
    /// (accepted peers plus the initiator) are in.
    #[instrument(skip(self))]
    pub fn handle_accept(&mut self, from_party: u16) -> Result<bool, SigningError> {
        let Some(SignPhase::AwaitingAcceptances(setup, data)) = &mut self.session else {
            return Err(SigningError::UnexpectedMessage("accept"));
        };
        if !data.accepted.insert(from_party) {
            let session_id = setup.session_id.clone();
            return Err(self.abort(session_id, SigningError::Equivocation(from_party, "accept").to_string()));
        }
        let signers: BTreeSet<u16> = data
            .accepted
            .iter()
            .copied()
            .chain([setup.initiator_party_index, setup.my_party_index])
            .collect();
        Ok(signers.len() >= usize::from(setup.threshold))
    }

    /// Leave `AwaitingAcceptances` for Round 1 once `t` signers have
    /// accepted: fixes the signer set `S` and this node's Lagrange
    /// coefficient, then samples `k_i`/`γ_i`.
    #[instrument(skip(self, rng))]
    pub fn start_round1<R: rand_core::RngCore + rand_core::CryptoRng>(&mut self, rng: &mut R) -> Result<(), SigningError> {
        let Some(SignPhase::AwaitingAcceptances(..)) = &self.session else {
            return Err(SigningError::UnexpectedMessage("round1"));
        };
        let (setup, data) = match self.session.take() {
            Some(SignPhase::AwaitingAcceptances(s, d)) => (s, d),
            _ => unreachable!(),
        };
        let mut signer_set = data.accepted;
        signer_set.insert(setup.initiator_party_index);
        signer_set.insert(setup.my_party_index);
        let subset: Vec<u16> = signer_set.iter().copied().collect();
        let lagrange_i = wallet_mpc_vss::lagrange_coefficient(setup.my_party_index, &subset);
        let ctx = phase::SignContext {
            setup,
            signer_set,
            lagrange_i,
        };
        let round1 = phase::begin_round1(rng);
        self.session = Some(SignPhase::Round1(ctx, round1));
        Ok(())
    }

    /// Merge a finished local Paillier keygen into Round 1, producing this
    /// node's own broadcast. Whichever of this call or [`Self::handle_round1`]
    /// observes the completion predicate flip last drives the transition to
    /// Round 2 (§8 scenario 6).
    #[instrument(skip(self, rng, keypair))]
    pub fn complete_local_keygen<R: rand_core::RngCore + rand_core::CryptoRng>(
        &mut self,
        rng: &mut R,
        keypair: Keypair,
    ) -> Result<(phase::Round1Broadcast, bool), SigningError> {
        let Some(SignPhase::Round1(ctx, data)) = &mut self.session else {
            return Err(SigningError::UnexpectedMessage("round1"));
        };
        let broadcast = phase::complete_local_keygen(rng, &ctx.setup.session_id, data, keypair);
        let complete = phase::round1_complete(ctx.setup.threshold, data);
        Ok((broadcast, complete))
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, gamma_point, n, ciphertext_k, k_point, proof_gamma, proof_k))]
    pub fn handle_round1(
        &mut self,
        from_party: u16,
        gamma_point: Point,
        n: BigNumber,
        ciphertext_k: BigNumber,
        k_point: Point,
        proof_gamma: &wallet_mpc_curve::schnorr::Proof,
        proof_k: &wallet_mpc_curve::schnorr::Proof,
    ) -> Result<bool, SigningError> {
        let Some(SignPhase::Round1(ctx, data)) = &mut self.session else {
            return Err(SigningError::UnexpectedMessage("round1"));
        };
        if let Err(e) = phase::verify_and_record_round1(
            &ctx.setup.session_id,
            data,
            from_party,
            gamma_point,
            n,
            ciphertext_k,
            k_point,
            proof_gamma,
            proof_k,
        ) {
            let session_id = ctx.setup.session_id.clone();
            return Err(self.abort(session_id, e.to_string()));
        }
        let complete = match &self.session {
            Some(SignPhase::Round1(c, d)) => phase::round1_complete(c.setup.threshold, d),
            _ => unreachable!(),
        };
        Ok(complete)
    }

    #[instrument(skip(self, rng))]
    pub fn start_round2<R: rand_core::RngCore + rand_core::CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<(u16, phase::Round2Payload)>, SigningError> {
        let Some(SignPhase::Round1(..)) = &self.session else {
            return Err(SigningError::UnexpectedMessage("round2"));
        };
        let (ctx, round1) = match self.session.take() {
            Some(SignPhase::Round1(c, r)) => (c, r),
            _ => unreachable!(),
        };
        match phase::start_round2(rng, &ctx, round1) {
            Ok((round2, outgoing)) => {
                self.session = Some(SignPhase::Round2(ctx, round2));
                Ok(outgoing)
            }
            Err(e) => {
                let session_id = ctx.setup.session_id.clone();
                Err(self.abort(session_id, e.to_string()))
            }
        }
    }

    #[instrument(skip(self, delta_enc, sigma_enc))]
    pub fn handle_round2(
        &mut self,
        from_party: u16,
        delta_enc: BigNumber,
        sigma_enc: BigNumber,
    ) -> Result<bool, SigningError> {
        let Some(SignPhase::Round2(ctx, data)) = &mut self.session else {
            return Err(SigningError::UnexpectedMessage("round2"));
        };
        if let Err(e) = phase::verify_and_record_round2(data, from_party, delta_enc, sigma_enc) {
            let session_id = ctx.setup.session_id.clone();
            return Err(self.abort(session_id, e.to_string()));
        }
        let complete = match &self.session {
            Some(SignPhase::Round2(c, d)) => phase::round2_complete(c.setup.threshold, d),
            _ => unreachable!(),
        };
        Ok(complete)
    }

    /// Leave Round 2 for Round 3: decrypt every inbound MtA ciphertext and
    /// form `δ_i`/`σ_i`, returning `δ_i` to broadcast.
    #[instrument(skip(self))]
    pub fn start_round3(&mut self) -> Result<Scalar, SigningError> {
        let Some(SignPhase::Round2(..)) = &self.session else {
            return Err(SigningError::UnexpectedMessage("round3"));
        };
        let (ctx, round2) = match self.session.take() {
            Some(SignPhase::Round2(c, r)) => (c, r),
            _ => unreachable!(),
        };
        let (round3, delta_i) = phase::start_round3(&ctx, round2);
        self.session = Some(SignPhase::Round3(ctx, round3));
        Ok(delta_i)
    }

    #[instrument(skip(self))]
    pub fn handle_round3(&mut self, from_party: u16, delta: Scalar) -> Result<bool, SigningError> {
        let Some(SignPhase::Round3(ctx, data)) = &mut self.session else {
            return Err(SigningError::UnexpectedMessage("round3"));
        };
        if let Err(e) = phase::record_round3_delta(data, from_party, delta) {
            let session_id = ctx.setup.session_id.clone();
            return Err(self.abort(session_id, e.to_string()));
        }
        let complete = match &self.session {
            Some(SignPhase::Round3(c, d)) => phase::round3_complete(c.setup.threshold, d),
            _ => unreachable!(),
        };
        Ok(complete)
    }

    /// Leave Round 3 for Round 4: aggregate `Δ`, recover `r`, and compute
    /// this node's partial signature. Aborts on either algebraic degeneracy
    /// (§4.5 Round 4) — the session must be retried with fresh nonces.
    #[instrument(skip(self))]
    pub fn start_round4(&mut self) -> Result<(Scalar, Point), SigningError> {
        let Some(SignPhase::Round3(..)) = &self.session else {
            return Err(SigningError::UnexpectedMessage("round4"));
        };
        let (ctx, round3) = match self.session.take() {
            Some(SignPhase::Round3(c, r)) => (c, r),
            _ => unreachable!(),
        };
        let my_party_index = ctx.setup.my_party_index;
        match phase::start_round4(&ctx, my_party_index, round3) {
            Ok((round4, s_i, sigma_point_i)) => {
                self.session = Some(SignPhase::Round4(ctx, round4));
                Ok((s_i, sigma_point_i))
            }
            Err(e) => {
                let session_id = ctx.setup.session_id.clone();
                Err(self.abort(session_id, e.to_string()))
            }
        }
    }

    #[instrument(skip(self, partial_signature, sigma_point))]
    pub fn handle_round4(
        &mut self,
        from_party: u16,
        partial_signature: Scalar,
        sigma_point: Point,
    ) -> Result<bool, SigningError> {
        let Some(SignPhase::Round4(ctx, data)) = &mut self.session else {
            return Err(SigningError::UnexpectedMessage("round4"));
        };
        if let Err(e) = phase::verify_and_record_round4(ctx, data, from_party, partial_signature, sigma_point) {
            let session_id = ctx.setup.session_id.clone();
            return Err(self.abort(session_id, e.to_string()));
        }
        let complete = match &self.session {
            Some(SignPhase::Round4(c, d)) => phase::round4_complete(c.setup.threshold, d),
            _ => unreachable!(),
        };
        Ok(complete)
    }

    /// Finish the session once every Round 4 partial signature has arrived:
    /// assemble `s`, normalize per EIP-2, and verify the result before it is
    /// ever allowed out.
    #[instrument(skip(self))]
    pub fn finish(&mut self) -> Result<phase::CompleteData, SigningError> {
        let Some(SignPhase::Round4(..)) = &self.session else {
            return Err(SigningError::UnexpectedMessage("complete"));
        };
        let (ctx, round4) = match self.session.take() {
            Some(SignPhase::Round4(c, d)) => (c, d),
            _ => unreachable!(),
        };
        match phase::finish(&ctx, round4) {
            Ok(complete) => {
                self.session = Some(SignPhase::Complete(ctx, complete));
                Ok(complete)
            }
            Err(e) => {
                let session_id = ctx.setup.session_id.clone();
                Err(self.abort(session_id, e.to_string()))
            }
        }
    }
}
