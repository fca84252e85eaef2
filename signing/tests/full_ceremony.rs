//! End-to-end signing ceremony (spec.md §8 scenario 3): a real 2-of-3 DKG
//! ceremony feeds a 2-of-3 signing session between a non-contiguous subset
//! of signers, producing a signature that verifies against the derived
//! child public key.

mod common;

use std::collections::BTreeMap;

use dkg::DkgCoordinator;
use key_share::PersistentKeyShare;
use rand::rngs::OsRng;
use wallet_mpc_curve::{reduce_mod_n, Scalar};
use wallet_mpc_paillier::Keypair;
use signing::SigningCoordinator;
use x25519_dalek::{PublicKey as IdentityPublicKey, StaticSecret as IdentitySecretKey};

/// Run a full `n`-of-`n` joint-Feldman DKG ceremony (Shamir threshold `t`)
/// to completion and return each party's durable key share, ordered by
/// party index `1..=n`.
async fn run_dkg(n: u16, t: u16, ceremony_id: &str) -> Vec<PersistentKeyShare> {
    let mut rng = OsRng;
    let secrets: Vec<IdentitySecretKey> = (0..n).map(|_| IdentitySecretKey::random_from_rng(&mut rng)).collect();
    let publics: Vec<IdentityPublicKey> = secrets.iter().map(IdentityPublicKey::from).collect();
    let mut coordinators: Vec<DkgCoordinator> = secrets.into_iter().map(DkgCoordinator::new).collect();

    let mut commitments = Vec::with_capacity(n as usize);
    for (idx, coord) in coordinators.iter_mut().enumerate() {
        let my_party_index = idx as u16 + 1;
        let identity_keys: BTreeMap<u16, IdentityPublicKey> = (1..=n)
            .filter(|&j| j != my_party_index)
            .map(|j| (j, publics[(j - 1) as usize]))
            .collect();
        commitments.push(coord.propose(&mut rng, ceremony_id.to_string(), t, my_party_index, identity_keys));
    }
    for i in 0..n as usize {
        for j in 0..n as usize {
            if i == j {
                continue;
            }
            coordinators[i].handle_round1(j as u16 + 1, commitments[j]).unwrap();
        }
    }

    let mut round2 = Vec::with_capacity(n as usize);
    for coord in coordinators.iter_mut() {
        round2.push(coord.start_round2(&mut rng).unwrap());
    }
    for i in 0..n as usize {
        for j in 0..n as usize {
            if i == j {
                continue;
            }
            let b = &round2[j];
            coordinators[i]
                .handle_round2(j as u16 + 1, b.feldman.clone(), &b.proof, b.blinding)
                .unwrap();
        }
    }

    let mut round3 = Vec::with_capacity(n as usize);
    for coord in coordinators.iter_mut() {
        round3.push(coord.start_round3(&mut rng).unwrap());
    }
    for i in 0..n as usize {
        let my_party_index = i as u16 + 1;
        for j in 0..n as usize {
            if i == j {
                continue;
            }
            let sealed = round3[j]
                .iter()
                .find(|(to, _)| *to == my_party_index)
                .map(|(_, s)| s.to_bytes())
                .expect("sender sealed a share for every peer");
            coordinators[i].handle_round3(j as u16 + 1, &sealed).unwrap();
        }
    }

    let mut public_shares = Vec::with_capacity(n as usize);
    for coord in coordinators.iter_mut() {
        public_shares.push(coord.start_round4().unwrap());
    }
    for i in 0..n as usize {
        for j in 0..n as usize {
            if i == j {
                continue;
            }
            coordinators[i].handle_round4(j as u16 + 1, public_shares[j]).unwrap();
        }
    }

    coordinators
        .iter_mut()
        .map(|coord| coord.finish(ceremony_id.to_string()).unwrap())
        .collect()
}

#[tokio::test]
async fn two_of_three_signing_produces_verifiable_signature() {
    let mut rng = OsRng;
    let shares = run_dkg(3, 2, "dkg-ceremony-1").await;

    // Signers are party 1 (the initiator) and party 3 — a non-contiguous
    // subset, exercising a genuine Lagrange coefficient rather than the
    // trivial all-parties case.
    let tx = common::sample_tx();
    let req = common::sign_request("sign-session-1", 1, &tx, i64::MAX);

    let mut node_a = SigningCoordinator::new();
    let mut node_b = SigningCoordinator::new();
    node_a.accept_request(&shares[0], &req, 2, 1).unwrap();
    node_b.accept_request(&shares[2], &req, 2, 3).unwrap();

    // Node B's own Lagrange subset already contains {initiator=1, self=3},
    // so it needs no further accepts to reach threshold 2. Node A (the
    // initiator) needs to see B's SIGN_ACCEPT.
    assert!(node_a.handle_accept(3).unwrap());

    node_a.start_round1(&mut rng).unwrap();
    node_b.start_round1(&mut rng).unwrap();

    let kp_a = Keypair::generate(1024).await;
    let kp_b = Keypair::generate(1024).await;
    let (bcast_a, _) = node_a.complete_local_keygen(&mut rng, kp_a).unwrap();
    let (bcast_b, _) = node_b.complete_local_keygen(&mut rng, kp_b).unwrap();

    assert!(node_a
        .handle_round1(
            3,
            bcast_b.gamma_point,
            bcast_b.paillier_n.clone(),
            bcast_b.ciphertext_k.clone(),
            bcast_b.k_point,
            &bcast_b.proof_gamma,
            &bcast_b.proof_k,
        )
        .unwrap());
    assert!(node_b
        .handle_round1(
            1,
            bcast_a.gamma_point,
            bcast_a.paillier_n.clone(),
            bcast_a.ciphertext_k.clone(),
            bcast_a.k_point,
            &bcast_a.proof_gamma,
            &bcast_a.proof_k,
        )
        .unwrap());

    let out_a = node_a.start_round2(&mut rng).unwrap();
    let out_b = node_b.start_round2(&mut rng).unwrap();
    let (to_b, payload_ab) = out_a.into_iter().next().expect("node A has exactly one peer");
    assert_eq!(to_b, 3);
    let (to_a, payload_ba) = out_b.into_iter().next().expect("node B has exactly one peer");
    assert_eq!(to_a, 1);

    assert!(node_b.handle_round2(1, payload_ab.delta_enc, payload_ab.sigma_enc).unwrap());
    assert!(node_a.handle_round2(3, payload_ba.delta_enc, payload_ba.sigma_enc).unwrap());

    let delta_a = node_a.start_round3().unwrap();
    let delta_b = node_b.start_round3().unwrap();
    assert!(node_a.handle_round3(3, delta_b).unwrap());
    assert!(node_b.handle_round3(1, delta_a).unwrap());

    let (s_a, sigma_point_a) = node_a.start_round4().unwrap();
    let (s_b, sigma_point_b) = node_b.start_round4().unwrap();
    assert!(node_a.handle_round4(3, s_b, sigma_point_b).unwrap());
    assert!(node_b.handle_round4(1, s_a, sigma_point_a).unwrap());

    let complete_a = node_a.finish().unwrap();
    let complete_b = node_b.finish().unwrap();
    assert_eq!(complete_a.r, complete_b.r);
    assert_eq!(complete_a.s, complete_b.s);
    assert_eq!(complete_a.v, complete_b.v);

    let tweak = wallet_mpc_eth::derive_tweak(&shares[0].master_public_key, &shares[0].chain_code, 0);
    let m = reduce_mod_n(&req.tx_hash);
    let r = Scalar::from_be_bytes(complete_a.r).unwrap();
    let s = Scalar::from_be_bytes(complete_a.s).unwrap();
    assert!(wallet_mpc_curve::ecdsa_verify(&tweak.child_public_key, &m, &r, &s));
}
