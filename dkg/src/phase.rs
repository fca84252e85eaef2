//! The per-node DKG state machine, `spec.md` §4.4:
//! `idle → proposed → round1 → round2 → round3 → round4 → complete | aborted`.

use std::collections::BTreeMap;

use wallet_mpc_curve::{schnorr, Point, Scalar, SecretScalar};
use wallet_mpc_vss::{feldman_verify, pedersen_commit, pedersen_verify, PedersenCommitment, Polynomial};
use x25519_dalek::PublicKey as IdentityPublicKey;

use crate::identity;
use crate::DkgError;

fn schnorr_ctx(ceremony_id: &str, party: u16) -> String {
    format!("DKG-{ceremony_id}-party-{party}")
}

/// Static parameters fixed when the ceremony was proposed — never change
/// after `Proposed`.
#[derive(Clone)]
pub struct CeremonyParams {
    pub ceremony_id: String,
    pub threshold: u16,
    pub total_parties: u16,
    pub my_party_index: u16,
    pub identity_keys: BTreeMap<u16, IdentityPublicKey>,
}

impl CeremonyParams {
    fn peers(&self) -> impl Iterator<Item = u16> + '_ {
        (1..=self.total_parties).filter(move |&j| j != self.my_party_index)
    }
}

pub struct Round1Data {
    pub poly: Polynomial,
    pub feldman: Vec<Point>,
    pub blinding: Scalar,
    pub commitment: PedersenCommitment,
    pub received_commitments: BTreeMap<u16, PedersenCommitment>,
}

/// Peer Feldman vectors opened and verified during Round 2, keyed by party
/// index — carried forward into Round 3 so inbound shares can be checked.
pub type Round2Data = BTreeMap<u16, Vec<Point>>;

pub struct Round3Data {
    pub round1: Round1Data,
    pub peer_feldman: BTreeMap<u16, Vec<Point>>,
    pub received_shares: BTreeMap<u16, Scalar>,
}

pub struct Round4Data {
    pub x_i: SecretScalar,
    pub master_public_key: Point,
    pub public_key_shares: Vec<Point>,
    pub received_public_shares: BTreeMap<u16, Point>,
}

pub struct CompleteData {
    pub x_i: SecretScalar,
    pub master_public_key: Point,
    pub chain_code: [u8; 32],
    pub public_key_shares: Vec<Point>,
}

pub enum DkgPhase {
    Idle,
    Proposed(CeremonyParams),
    Round1(CeremonyParams, Round1Data),
    Round2(CeremonyParams, Round1Data, Round2Data),
    Round3(CeremonyParams, Round3Data),
    Round4(CeremonyParams, Round4Data),
    Complete(CeremonyParams, CompleteData),
    Aborted { ceremony_id: String, reason: String },
}

impl DkgPhase {
    pub fn ceremony_id(&self) -> Option<&str> {
        match self {
            DkgPhase::Idle => None,
            DkgPhase::Proposed(p) => Some(&p.ceremony_id),
            DkgPhase::Round1(p, _) => Some(&p.ceremony_id),
            DkgPhase::Round2(p, _, _) => Some(&p.ceremony_id),
            DkgPhase::Round3(p, _) => Some(&p.ceremony_id),
            DkgPhase::Round4(p, _) => Some(&p.ceremony_id),
            DkgPhase::Complete(p, _) => Some(&p.ceremony_id),
            DkgPhase::Aborted { ceremony_id, .. } => Some(ceremony_id),
        }
    }
}

/// Begin Round 1: sample the polynomial, Feldman vector, blinding, and
/// Pedersen commitment. Returns the commitment to broadcast alongside the
/// new phase.
pub fn start_round1<R: rand_core::RngCore + rand_core::CryptoRng>(
    rng: &mut R,
    params: CeremonyParams,
) -> (DkgPhase, PedersenCommitment) {
    let secret = SecretScalar::random(rng);
    let poly = Polynomial::generate(rng, secret, params.threshold);
    let feldman = poly.feldman_commit();
    let blinding = *SecretScalar::random(rng).as_ref();
    let commitment = pedersen_commit(&feldman, &blinding);
    let data = Round1Data {
        poly,
        feldman,
        blinding,
        commitment,
        received_commitments: BTreeMap::new(),
    };
    let phase = DkgPhase::Round1(params, data);
    (phase, commitment)
}

/// Record an inbound Round 1 commitment from `from_party`. Returns `true`
/// once all `n-1` peers have been heard from.
pub fn record_round1_commitment(
    data: &mut Round1Data,
    from_party: u16,
    commitment: PedersenCommitment,
) -> Result<(), DkgError> {
    if data.received_commitments.insert(from_party, commitment).is_some() {
        return Err(DkgError::DuplicateMessage {
            round: "round1",
            party: from_party,
        });
    }
    Ok(())
}

pub fn round1_complete(params: &CeremonyParams, data: &Round1Data) -> bool {
    data.received_commitments.len() == usize::from(params.total_parties) - 1
}

/// Advance to Round 2: the values every party now opens.
pub struct Round2Broadcast {
    pub feldman: Vec<Point>,
    pub proof: schnorr::Proof,
    pub blinding: Scalar,
}

pub fn start_round2<R: rand_core::RngCore + rand_core::CryptoRng>(
    rng: &mut R,
    params: &CeremonyParams,
    round1: &Round1Data,
) -> Round2Broadcast {
    let ctx = schnorr_ctx(&params.ceremony_id, params.my_party_index);
    let public = Point::generator() * round1.poly.intercept();
    let mut intercept_copy = *round1.poly.intercept();
    let x = SecretScalar::new(&mut intercept_copy);
    let proof = schnorr::prove(rng, &x, &public, &ctx);
    Round2Broadcast {
        feldman: round1.feldman.clone(),
        proof,
        blinding: round1.blinding,
    }
}

/// Verify an inbound Round 2 opening against that sender's Round 1
/// commitment and Schnorr proof, then record their Feldman vector.
pub fn verify_and_record_round2(
    ceremony_id: &str,
    data: &mut Round1Data,
    from_party: u16,
    feldman: Vec<Point>,
    proof: &schnorr::Proof,
    blinding: Scalar,
) -> Result<(), DkgError> {
    let expected_commitment = data
        .received_commitments
        .get(&from_party)
        .copied()
        .ok_or(DkgError::PedersenOpeningFailed(from_party))?;

    if !pedersen_verify(&expected_commitment, &feldman, &blinding) {
        return Err(DkgError::PedersenOpeningFailed(from_party));
    }

    let intercept = feldman.first().copied().ok_or(DkgError::PedersenOpeningFailed(from_party))?;
    let ctx = schnorr_ctx(ceremony_id, from_party);
    if !schnorr::verify(&intercept, proof, &ctx) {
        return Err(DkgError::SchnorrVerificationFailed(from_party));
    }

    Ok(())
}

pub fn round2_complete(params: &CeremonyParams, data: &Round2Data) -> bool {
    data.len() == usize::from(params.total_parties) - 1
}

/// Compute the per-peer Shamir shares for Round 3, sealed under each peer's
/// identity public key.
pub fn round3_shares<R: rand_core::RngCore + rand_core::CryptoRng>(
    rng: &mut R,
    params: &CeremonyParams,
    round1: &Round1Data,
) -> Vec<(u16, identity::Sealed)> {
    params
        .peers()
        .map(|j| {
            let share = round1.poly.eval(j);
            let sealed = identity::seal(
                rng,
                &params.identity_keys[&j],
                &share.to_be_bytes().as_bytes()[..],
            );
            (j, sealed)
        })
        .collect()
}

/// Decrypt and Feldman-verify an inbound Round 3 share from `from_party`.
pub fn open_and_verify_round3_share(
    identity_secret: &x25519_dalek::StaticSecret,
    from_party: u16,
    my_party_index: u16,
    sealed_bytes: &[u8],
    sender_feldman: &[Point],
) -> Result<Scalar, DkgError> {
    let sealed = identity::Sealed::from_bytes(sealed_bytes)
        .map_err(|_| DkgError::FeldmanVerificationFailed {
            sender: from_party,
            receiver: my_party_index,
        })?;
    let plaintext = identity::open(identity_secret, &sealed).map_err(|_| {
        DkgError::FeldmanVerificationFailed {
            sender: from_party,
            receiver: my_party_index,
        }
    })?;
    let arr: [u8; 32] = plaintext
        .try_into()
        .map_err(|_| DkgError::FeldmanVerificationFailed {
            sender: from_party,
            receiver: my_party_index,
        })?;
    let share = Scalar::from_be_bytes(arr).map_err(|_| DkgError::FeldmanVerificationFailed {
        sender: from_party,
        receiver: my_party_index,
    })?;

    if !feldman_verify(&share, my_party_index, sender_feldman) {
        return Err(DkgError::FeldmanVerificationFailed {
            sender: from_party,
            receiver: my_party_index,
        });
    }
    Ok(share)
}

pub fn round3_complete(params: &CeremonyParams, data: &Round3Data) -> bool {
    data.received_shares.len() == usize::from(params.total_parties) - 1
}

pub fn round4_complete(params: &CeremonyParams, data: &Round4Data) -> bool {
    data.received_public_shares.len() == usize::from(params.total_parties) - 1
}

/// Assemble Round 4: sum every received share plus the node's own
/// `f_i(i)` to obtain `x_i`.
pub fn assemble_x_i(params: &CeremonyParams, round1: &Round1Data, received_shares: &BTreeMap<u16, Scalar>) -> SecretScalar {
    let mut sum = round1.poly.eval(params.my_party_index);
    for share in received_shares.values() {
        sum = sum + share;
    }
    SecretScalar::new(&mut sum)
}

/// Leave Round 3 for Round 4: compute `x_i` and this node's own public share
/// `x_i·G`, seeding a fresh [`Round4Data`] with that single entry. The
/// coordinator broadcasts the returned point and folds peers' shares in via
/// [`record_round4_public_share`].
///
/// The master public key and per-party `publicKeyShares` are assembled here
/// from the Round 2 Feldman openings already verified into `peer_feldman`
/// (each party's intercept `a_{i,0}·G`, `feldman[0]`) plus this node's own —
/// `P = Σ_i (a_{i,0}·G)` per §4.4, not a sum of the `x_i·G` values Round 4
/// broadcasts for confirmation.
pub fn start_round4(params: &CeremonyParams, data: Round3Data) -> (Round4Data, Point) {
    let x_i = assemble_x_i(params, &data.round1, &data.received_shares);
    let my_public_share = Point::generator() * x_i.as_ref();

    let mut intercepts: BTreeMap<u16, Point> = data
        .peer_feldman
        .iter()
        .map(|(party, feldman)| (*party, feldman[0]))
        .collect();
    intercepts.insert(params.my_party_index, data.round1.feldman[0]);
    let mut public_key_shares = Vec::with_capacity(params.total_parties as usize);
    let mut master_public_key = Point::zero();
    for i in 1..=params.total_parties {
        let p = intercepts[&i];
        master_public_key = master_public_key + p;
        public_key_shares.push(p);
    }

    let mut received_public_shares = BTreeMap::new();
    received_public_shares.insert(params.my_party_index, my_public_share);
    (
        Round4Data {
            x_i,
            master_public_key,
            public_key_shares,
            received_public_shares,
        },
        my_public_share,
    )
}

pub fn record_round4_public_share(
    data: &mut Round4Data,
    from_party: u16,
    public_share: Point,
) -> Result<(), DkgError> {
    if data.received_public_shares.insert(from_party, public_share).is_some() {
        return Err(DkgError::DuplicateMessage {
            round: "round4",
            party: from_party,
        });
    }
    Ok(())
}

/// Finish the ceremony once every Round 4 public share has arrived. The
/// master public key and `publicKeyShares` were already assembled from the
/// Round 2 Feldman intercepts in [`start_round4`]; this only gates on full
/// Round 4 participation and derives the chain code (§4.4 Round 4 assembly).
pub fn finish(params: &CeremonyParams, data: Round4Data) -> Result<CompleteData, DkgError> {
    if data.received_public_shares.len() != usize::from(params.total_parties) {
        return Err(DkgError::InsufficientParticipation {
            got: data.received_public_shares.len() as u16,
            need: params.total_parties,
        });
    }
    let chain_code = wallet_mpc_eth::derive_chain_code(&data.master_public_key);
    Ok(CompleteData {
        x_i: data.x_i,
        master_public_key: data.master_public_key,
        chain_code,
        public_key_shares: data.public_key_shares,
    })
}
