//! Four-round DKG ceremony state machine, `spec.md` §4.4.
//!
//! Mirrors the signing engine's ownership model (§5): the coordinator owns
//! exactly one `Option<DkgPhase>` at a time. Every `handle_*`/`start_*`
//! method is synchronous and infallible-to-interrupt — there is no `.await`
//! inside a phase transition, so the critical-section discipline (mutate
//! state, then suspend) is trivially satisfied; the async network I/O that
//! drives this coordinator lives entirely in the caller.

pub mod identity;
pub mod phase;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{instrument, warn};
use wallet_mpc_curve::Point;
use wallet_mpc_vss::PedersenCommitment;
use x25519_dalek::{PublicKey as IdentityPublicKey, StaticSecret as IdentitySecretKey};

pub use phase::{CeremonyParams, CompleteData, DkgPhase};

/// Owns the single in-flight ceremony for this node. `None` means idle.
/// Dropping or replacing the held phase frees all ceremony secret material —
/// `Polynomial` and `SecretScalar` zeroize themselves on drop, so discarding
/// the `Option` is enough to satisfy "an aborted ceremony irreversibly
/// discards all in-memory material" (§4.4).
pub struct DkgCoordinator {
    identity_secret: IdentitySecretKey,
    session: Option<DkgPhase>,
}

impl DkgCoordinator {
    pub fn new(identity_secret: IdentitySecretKey) -> Self {
        DkgCoordinator {
            identity_secret,
            session: None,
        }
    }

    pub fn phase(&self) -> Option<&DkgPhase> {
        self.session.as_ref()
    }

    fn abort(&mut self, ceremony_id: String, reason: String) -> DkgError {
        warn!(ceremony_id = %ceremony_id, %reason, "aborting DKG ceremony");
        let err = DkgError::Aborted(reason.clone());
        self.session = Some(DkgPhase::Aborted { ceremony_id, reason });
        err
    }

    #[instrument(skip(self, rng, identity_keys))]
    pub fn propose<R: rand_core::RngCore + rand_core::CryptoRng>(
        &mut self,
        rng: &mut R,
        ceremony_id: String,
        threshold: u16,
        my_party_index: u16,
        identity_keys: BTreeMap<u16, IdentityPublicKey>,
    ) -> PedersenCommitment {
        let total_parties = identity_keys.len() as u16 + 1;
        let params = CeremonyParams {
            ceremony_id,
            threshold,
            total_parties,
            my_party_index,
            identity_keys,
        };
        let (phase, commitment) = phase::start_round1(rng, params);
        self.session = Some(phase);
        commitment
    }

    #[instrument(skip(self, commitment))]
    pub fn handle_round1(
        &mut self,
        from_party: u16,
        commitment: PedersenCommitment,
    ) -> Result<bool, DkgError> {
        let Some(DkgPhase::Round1(params, data)) = &mut self.session else {
            return Err(DkgError::UnexpectedMessage("round1"));
        };
        if let Err(e) = phase::record_round1_commitment(data, from_party, commitment) {
            let ceremony_id = params.ceremony_id.clone();
            return Err(self.abort(ceremony_id, e.to_string()));
        }
        let (params, data) = match &self.session {
            Some(DkgPhase::Round1(p, d)) => (p, d),
            _ => unreachable!(),
        };
        Ok(phase::round1_complete(params, data))
    }

    #[instrument(skip(self, rng))]
    pub fn start_round2<R: rand_core::RngCore + rand_core::CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<phase::Round2Broadcast, DkgError> {
        let Some(DkgPhase::Round1(params, round1)) = &self.session else {
            return Err(DkgError::UnexpectedMessage("round2"));
        };
        let broadcast = phase::start_round2(rng, params, round1);
        let (params, round1) = match self.session.take() {
            Some(DkgPhase::Round1(p, r)) => (p, r),
            _ => unreachable!(),
        };
        self.session = Some(DkgPhase::Round2(params, round1, BTreeMap::new()));
        Ok(broadcast)
    }

    #[instrument(skip(self, feldman, proof))]
    pub fn handle_round2(
        &mut self,
        from_party: u16,
        feldman: Vec<Point>,
        proof: &wallet_mpc_curve::schnorr::Proof,
        blinding: wallet_mpc_curve::Scalar,
    ) -> Result<bool, DkgError> {
        let Some(DkgPhase::Round2(params, round1, opened)) = &mut self.session else {
            return Err(DkgError::UnexpectedMessage("round2"));
        };
        if opened.contains_key(&from_party) {
            let ceremony_id = params.ceremony_id.clone();
            return Err(self.abort(
                ceremony_id,
                DkgError::DuplicateMessage {
                    round: "round2",
                    party: from_party,
                }
                .to_string(),
            ));
        }
        if let Err(e) = phase::verify_and_record_round2(
            &params.ceremony_id,
            round1,
            from_party,
            feldman.clone(),
            proof,
            blinding,
        ) {
            let ceremony_id = params.ceremony_id.clone();
            return Err(self.abort(ceremony_id, e.to_string()));
        }
        opened.insert(from_party, feldman);
        let complete = match &self.session {
            Some(DkgPhase::Round2(p, _, o)) => phase::round2_complete(p, o),
            _ => unreachable!(),
        };
        Ok(complete)
    }

    #[instrument(skip(self, rng))]
    pub fn start_round3<R: rand_core::RngCore + rand_core::CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<(u16, identity::Sealed)>, DkgError> {
        let Some(DkgPhase::Round2(params, round1, _)) = &self.session else {
            return Err(DkgError::UnexpectedMessage("round3"));
        };
        let shares = phase::round3_shares(rng, params, round1);
        let (params, round1, peer_feldman) = match self.session.take() {
            Some(DkgPhase::Round2(p, r, pf)) => (p, r, pf),
            _ => unreachable!(),
        };
        self.session = Some(DkgPhase::Round3(
            params,
            phase::Round3Data {
                round1,
                peer_feldman,
                received_shares: BTreeMap::new(),
            },
        ));
        Ok(shares)
    }

    #[instrument(skip(self, sealed_bytes))]
    pub fn handle_round3(
        &mut self,
        from_party: u16,
        sealed_bytes: &[u8],
    ) -> Result<bool, DkgError> {
        let Some(DkgPhase::Round3(params, data)) = &mut self.session else {
            return Err(DkgError::UnexpectedMessage("round3"));
        };
        if data.received_shares.contains_key(&from_party) {
            let ceremony_id = params.ceremony_id.clone();
            return Err(self.abort(
                ceremony_id,
                DkgError::DuplicateMessage {
                    round: "round3",
                    party: from_party,
                }
                .to_string(),
            ));
        }
        let sender_feldman = data
            .peer_feldman
            .get(&from_party)
            .ok_or(DkgError::UnexpectedMessage("round3 sender never opened round2"))?
            .clone();
        match phase::open_and_verify_round3_share(
            &self.identity_secret,
            from_party,
            params.my_party_index,
            sealed_bytes,
            &sender_feldman,
        ) {
            Ok(share) => {
                data.received_shares.insert(from_party, share);
            }
            Err(e) => {
                let ceremony_id = params.ceremony_id.clone();
                return Err(self.abort(ceremony_id, e.to_string()));
            }
        }
        let complete = match &self.session {
            Some(DkgPhase::Round3(p, d)) => phase::round3_complete(p, d),
            _ => unreachable!(),
        };
        Ok(complete)
    }

    /// Leave Round 3 for Round 4: assembles this node's `x_i` and returns
    /// its own public share `x_i·G` to broadcast.
    #[instrument(skip(self))]
    pub fn start_round4(&mut self) -> Result<Point, DkgError> {
        let Some(DkgPhase::Round3(params, _)) = &self.session else {
            return Err(DkgError::UnexpectedMessage("round4"));
        };
        let (params, data) = match self.session.take() {
            Some(DkgPhase::Round3(p, d)) => (p, d),
            _ => unreachable!(),
        };
        let (round4, my_public_share) = phase::start_round4(&params, data);
        self.session = Some(DkgPhase::Round4(params, round4));
        Ok(my_public_share)
    }

    #[instrument(skip(self))]
    pub fn handle_round4(&mut self, from_party: u16, public_share: Point) -> Result<bool, DkgError> {
        let Some(DkgPhase::Round4(params, data)) = &mut self.session else {
            return Err(DkgError::UnexpectedMessage("round4"));
        };
        if let Err(e) = phase::record_round4_public_share(data, from_party, public_share) {
            let ceremony_id = params.ceremony_id.clone();
            return Err(self.abort(ceremony_id, e.to_string()));
        }
        let complete = match &self.session {
            Some(DkgPhase::Round4(p, d)) => phase::round4_complete(p, d),
            _ => unreachable!(),
        };
        Ok(complete)
    }

    /// Finish the ceremony once every Round 4 public share has arrived,
    /// producing the durable [`key_share::PersistentKeyShare`].
    #[instrument(skip(self))]
    pub fn finish(&mut self, ceremony_id_for_share: String) -> Result<key_share::PersistentKeyShare, DkgError> {
        let Some(DkgPhase::Round4(params, _)) = &self.session else {
            return Err(DkgError::UnexpectedMessage("complete"));
        };
        let (params, data) = match self.session.take() {
            Some(DkgPhase::Round4(p, d)) => (p, d),
            _ => unreachable!(),
        };
        let complete = match phase::finish(&params, data) {
            Ok(c) => c,
            Err(e) => {
                let ceremony_id = params.ceremony_id.clone();
                return Err(self.abort(ceremony_id, e.to_string()));
            }
        };
        let share = key_share::PersistentKeyShare {
            party_index: params.my_party_index,
            total_parties: params.total_parties,
            x_i: complete.x_i.clone(),
            public_key_shares: complete.public_key_shares.clone(),
            master_public_key: complete.master_public_key,
            chain_code: complete.chain_code,
            ceremony_id: ceremony_id_for_share,
        };
        self.session = Some(DkgPhase::Complete(params, complete));
        Ok(share)
    }
}

#[derive(Debug, Error)]
pub enum DkgError {
    #[error("duplicate {round} message from party {party}")]
    DuplicateMessage { round: &'static str, party: u16 },
    #[error("Pedersen commitment opening failed for party {0}")]
    PedersenOpeningFailed(u16),
    #[error("Schnorr proof of knowledge failed for party {0}")]
    SchnorrVerificationFailed(u16),
    #[error("Feldman verification of party {sender}'s share to {receiver} failed")]
    FeldmanVerificationFailed { sender: u16, receiver: u16 },
    #[error("insufficient participation: got {got}, need {need}")]
    InsufficientParticipation { got: u16, need: u16 },
    #[error("message not valid in the current phase: {0}")]
    UnexpectedMessage(&'static str),
    #[error("ceremony aborted: {0}")]
    Aborted(String),
}
