//! Adversarial and concurrency scenarios from `spec.md` §8: equivocation
//! (scenario 4), tx-hash substitution (scenario 5), and the Paillier-keygen
//! completion race (scenario 6). These drive `SigningCoordinator` directly
//! against fabricated single-purpose shares rather than a full DKG ceremony,
//! since none of them depend on the shares being a real DKG output.

mod common;

use rand::rngs::OsRng;
use signing::{SignPhase, SigningCoordinator};
use wallet_mpc_curve::{Point, Scalar, SecretScalar};
use wallet_mpc_paillier::Keypair;
use wallet_mpc_proto::SigningError;

fn toy_master_key(rng: &mut OsRng) -> (Scalar, Point) {
    let x = SecretScalar::random(rng);
    let p = Point::generator() * x.as_ref();
    (*x.as_ref(), p)
}

#[tokio::test]
async fn duplicate_round1_message_triggers_equivocation_abort() {
    let mut rng = OsRng;
    let (_, master) = toy_master_key(&mut rng);
    let share_a = common::fabricate_share(1, 2, *SecretScalar::random(&mut rng).as_ref(), master);
    let share_b = common::fabricate_share(2, 2, *SecretScalar::random(&mut rng).as_ref(), master);

    let tx = common::sample_tx();
    let req = common::sign_request("equiv-session", 1, &tx, i64::MAX);

    let mut node_a = SigningCoordinator::new();
    let mut node_b = SigningCoordinator::new();
    node_a.accept_request(&share_a, &req, 2, 1).unwrap();
    node_b.accept_request(&share_b, &req, 2, 2).unwrap();
    assert!(node_a.handle_accept(2).unwrap());

    node_a.start_round1(&mut rng).unwrap();
    node_b.start_round1(&mut rng).unwrap();

    let kp_a = Keypair::generate(1024).await;
    let kp_b = Keypair::generate(1024).await;
    node_a.complete_local_keygen(&mut rng, kp_a).unwrap();
    let (bcast_b, _) = node_b.complete_local_keygen(&mut rng, kp_b).unwrap();

    assert!(node_a
        .handle_round1(
            2,
            bcast_b.gamma_point,
            bcast_b.paillier_n.clone(),
            bcast_b.ciphertext_k.clone(),
            bcast_b.k_point,
            &bcast_b.proof_gamma,
            &bcast_b.proof_k,
        )
        .unwrap());

    let err = node_a
        .handle_round1(
            2,
            bcast_b.gamma_point,
            bcast_b.paillier_n,
            bcast_b.ciphertext_k,
            bcast_b.k_point,
            &bcast_b.proof_gamma,
            &bcast_b.proof_k,
        )
        .unwrap_err();
    assert!(matches!(err, SigningError::Aborted(_)));
    assert!(matches!(node_a.phase(), Some(SignPhase::Aborted { .. })));
}

#[test]
fn tampered_tx_is_rejected_before_any_crypto_runs() {
    let mut rng = OsRng;
    let (_, master) = toy_master_key(&mut rng);
    let share = common::fabricate_share(1, 2, *SecretScalar::random(&mut rng).as_ref(), master);

    let tx = common::sample_tx();
    let mut req = common::sign_request("substitution-session", 1, &tx, i64::MAX);
    // The initiator's claimed txHash still matches the original tx, but the
    // rawTx bytes have been swapped for a different transaction — the
    // defense independently recomputes the hash from rawTx and must reject.
    let mut swapped = tx.clone();
    swapped.value += 1;
    req.raw_tx = serde_json::to_vec(&swapped).unwrap();

    let mut node = SigningCoordinator::new();
    let err = node.accept_request(&share, &req, 2, 1).unwrap_err();
    assert!(matches!(err, SigningError::TxHashMismatch));
    assert!(node.phase().is_none());
}

#[tokio::test]
async fn round1_completes_regardless_of_keygen_and_peer_message_order() {
    let mut rng = OsRng;
    let (_, master) = toy_master_key(&mut rng);
    let share_a = common::fabricate_share(1, 2, *SecretScalar::random(&mut rng).as_ref(), master);
    let share_b = common::fabricate_share(2, 2, *SecretScalar::random(&mut rng).as_ref(), master);

    let tx = common::sample_tx();
    let req = common::sign_request("race-session", 1, &tx, i64::MAX);

    let mut node_a = SigningCoordinator::new();
    let mut node_b = SigningCoordinator::new();
    node_a.accept_request(&share_a, &req, 2, 1).unwrap();
    node_b.accept_request(&share_b, &req, 2, 2).unwrap();
    assert!(node_a.handle_accept(2).unwrap());

    node_a.start_round1(&mut rng).unwrap();
    node_b.start_round1(&mut rng).unwrap();

    // B's broadcast arrives at A before A's own Paillier keygen finishes.
    let kp_b = Keypair::generate(1024).await;
    let (bcast_b, _) = node_b.complete_local_keygen(&mut rng, kp_b).unwrap();

    let complete_before_local_keygen = node_a
        .handle_round1(
            2,
            bcast_b.gamma_point,
            bcast_b.paillier_n,
            bcast_b.ciphertext_k,
            bcast_b.k_point,
            &bcast_b.proof_gamma,
            &bcast_b.proof_k,
        )
        .unwrap();
    assert!(!complete_before_local_keygen, "round 1 cannot be complete while local keygen is still pending");

    let kp_a = Keypair::generate(1024).await;
    let (_, complete_after_local_keygen) = node_a.complete_local_keygen(&mut rng, kp_a).unwrap();
    assert!(
        complete_after_local_keygen,
        "merging local keygen after the peer message already arrived must flip completion"
    );
}
