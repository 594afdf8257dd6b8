use super::*;
use crate::dao::answer::ConsultationAnswer;
use crate::dao::consultation::ConsultationTx;
use crate::dao::engine::GovernanceState;
use crate::dao::flags::DaoState;
use crate::dao::vote_cache::{VOTE_NO, VOTE_REMOVE, VOTE_YES};
use crate::db::{Column, KvStore};
use crate::index::address::{IndexedOutput, IndexedTx};

type Snapshot = (BTreeMap<Column, BTreeMap<Vec<u8>, Vec<u8>>>, GovernanceState);

/// Chain 0..=30 dengan proposal, payment request, consultation dan vote.
fn busy_chain(h: &mut Harness) -> Vec<ConnectedBlock> {
    let proposal = txid(1);
    let consultation = txid(9);
    let answer = ConsultationAnswer::initial_hash(&consultation, 0);
    let payee = Hash160::from_bytes([0x22; 20]);

    let mut blocks = Vec::new();
    for height in 0..=30u32 {
        let mut block = h.block();
        match height {
            1 => {
                block = block.with_tx(GovernanceTx::Proposal { txid: proposal, tx: proposal_tx(50 * COIN, 1_000_000) });
                block.index_txs.push(IndexedTx {
                    txhash: txid(0xee),
                    coinstake: false,
                    outputs: vec![IndexedOutput {
                        dest: TxDestination::KeyId(payee),
                        amount: 7 * COIN,
                        script: vec![0x76, 0xa9],
                        index: 0,
                    }],
                    spends: Vec::new(),
                });
            }
            2 => {
                let tx = ConsultationTx::consensus_change(P::ProposalMinAccept, 6_000, 15 * COIN).expect("valid");
                block = block.with_tx(GovernanceTx::Consultation { txid: consultation, tx });
            }
            5 => {
                block.votes.push(StakerVotes {
                    staker: staker('A'),
                    entries: vec![(proposal, VOTE_YES), (answer, VOTE_YES)],
                    light_fee: None,
                });
                block.votes.push(StakerVotes { staker: staker('B'), entries: vec![(proposal, VOTE_NO)], light_fee: None });
            }
            // B berubah pikiran: remove lalu yes di block yang sama
            6 => block.votes.push(StakerVotes {
                staker: staker('B'),
                entries: vec![(proposal, VOTE_REMOVE), (proposal, VOTE_YES)],
                light_fee: None,
            }),
            11 => {
                block = block.with_tx(GovernanceTx::PaymentRequest {
                    txid: txid(2),
                    tx: payment_request_tx(proposal, 20 * COIN),
                })
            }
            15 | 25 => block.votes.push(StakerVotes {
                staker: staker('A'),
                entries: vec![(txid(2), VOTE_YES), (answer, VOTE_YES)],
                light_fee: None,
            }),
            _ => {}
        }
        h.connect(block.clone());
        blocks.push(block);
    }
    blocks
}

#[test]
fn disconnect_is_exact_inverse_at_every_height() {
    let mut h = Harness::new(&[(P::ConsultationMinCycles, 1)]);
    let mut snapshots: Vec<Snapshot> = Vec::new();

    // snapshot sebelum tiap connect, dengan block yang sama
    let mut replay = Harness::new(&[(P::ConsultationMinCycles, 1)]);
    let blocks = busy_chain(&mut replay);
    for block in &blocks {
        snapshots.push((h.store.dump(), h.engine.state().clone()));
        h.connect(block.clone());
    }

    let state = h.engine.state();
    assert_eq!(state.proposals[&txid(1)].state_at(30), DaoState::Accepted);
    assert_eq!(state.payment_requests[&txid(2)].state_at(20), DaoState::Accepted);
    assert_eq!(state.consultations[&txid(9)].state_at(30), DaoState::Passed);
    assert_eq!(state.param(P::ProposalMinAccept, 30), 6_000);
    assert_eq!(h.store.dump(), replay.store.dump());

    for (block, (dump, state)) in blocks.iter().zip(snapshots).rev() {
        h.engine.disconnect_block(block).expect("disconnect");
        assert_eq!(h.engine.state(), &state, "state mismatch after disconnecting {}", block.height);
        assert_eq!(h.store.dump(), dump, "store mismatch after disconnecting {}", block.height);
    }
    assert_eq!(h.engine.tip(), None);
    assert!(h.store.dump().is_empty());
}

#[test]
fn remove_then_vote_in_same_block_switches_vote() {
    let mut h = Harness::new(&[(P::ConsultationMinCycles, 1)]);
    busy_chain(&mut h);
    let votes = h.engine.staker_votes(&staker('B')).expect("B voted");
    assert_eq!(votes[&5][&txid(1)], VOTE_NO);
    assert_eq!(votes[&6][&txid(1)], VOTE_YES);
    // A 60 + B 25 yes: diterima di cycle pertama
    assert_eq!(h.engine.state().proposals[&txid(1)].accepted_height(), Some(10));
}

#[test]
fn reload_from_store_matches_live_engine() {
    let mut h = Harness::new(&[(P::ConsultationMinCycles, 1)]);
    busy_chain(&mut h);

    let store: Arc<dyn KvStore> = h.store.clone();
    let loaded = GovernanceEngine::load(store, h.engine.settings().clone()).expect("load");
    assert_eq!(loaded.state(), h.engine.state());
    assert_eq!(loaded.tip(), Some(30));
}

#[test]
fn out_of_order_blocks_are_refused() {
    let mut h = Harness::new(&[]);
    h.advance_to(3);

    let skip = ConnectedBlock::new(5, 300, staker('S'));
    assert!(matches!(h.try_connect(skip), Err(DaoError::OutOfOrder { expected: 4, got: 5 })));

    let not_tip = ConnectedBlock::new(2, 120, staker('S'));
    assert!(matches!(h.engine.disconnect_block(&not_tip), Err(DaoError::OutOfOrder { expected: 3, got: 2 })));
}

#[test]
fn disconnect_of_unknown_votes_is_fatal() {
    let mut h = Harness::new(&[]);
    h.advance_to(3);

    // block 3 yang "dikira" berisi vote, padahal tidak pernah di-connect begitu
    let mut forged = ConnectedBlock::new(3, 3 * BLOCK_SPACING, staker('S'));
    forged.votes.push(StakerVotes { staker: staker('A'), entries: vec![(txid(1), VOTE_YES)], light_fee: None });

    let err = h.engine.disconnect_block(&forged).expect_err("inconsistent");
    assert!(matches!(err, DaoError::ReorgInconsistency(_)));
    assert!(err.is_fatal());
    assert_eq!(h.engine.tip(), Some(3));
}

#[test]
fn disconnect_requires_the_connected_voter_set() {
    let mut h = Harness::new(&[]);
    h.advance_to(2);
    h.connect_tx(GovernanceTx::Proposal { txid: txid(1), tx: proposal_tx(10 * COIN, 1_000) });
    let connected = h.connect_votes(&[('A', txid(1), VOTE_YES), ('B', txid(1), VOTE_NO)]);
    let height = connected.height;

    // vote B hilang dari block yang di-disconnect
    let mut partial = connected.clone();
    partial.votes.retain(|v| v.staker == staker('A'));
    let err = h.engine.disconnect_block(&partial).expect_err("voter set differs");
    assert!(matches!(err, DaoError::ReorgInconsistency(_)));
    assert!(err.is_fatal());

    // staker sama, nilai vote berbeda
    let mut altered = connected.clone();
    for votes in &mut altered.votes {
        if votes.staker == staker('B') {
            votes.entries = vec![(txid(1), VOTE_YES)];
        }
    }
    assert!(matches!(h.engine.disconnect_block(&altered), Err(DaoError::ReorgInconsistency(_))));

    assert_eq!(h.engine.tip(), Some(height));
    assert!(h.engine.state().votes.votes_at(&staker('B'), height).is_some());

    h.engine.disconnect_block(&connected).expect("matching block");
    assert_eq!(h.engine.tip(), Some(height - 1));
    assert!(h.engine.state().votes.votes_at_height(height).is_empty());
}

#[test]
fn rejected_block_leaves_no_trace() {
    let mut h = Harness::new(&[]);
    h.advance_to(1);
    h.connect_tx(GovernanceTx::Proposal { txid: txid(1), tx: proposal_tx(10 * COIN, 1_000) });
    let dump = h.store.dump();
    let state = h.engine.state().clone();

    // proposal valid + vote ke object yang tidak ada
    let mut block = h.block().with_tx(GovernanceTx::Proposal { txid: txid(3), tx: proposal_tx(COIN, 1_000) });
    block.votes.push(StakerVotes {
        staker: staker('A'),
        entries: vec![(txid(1), VOTE_YES), (txid(99), VOTE_YES)],
        light_fee: None,
    });
    assert!(matches!(h.try_connect(block), Err(DaoError::Admission(_))));

    assert_eq!(h.engine.state(), &state);
    assert_eq!(h.store.dump(), dump);
    assert_eq!(h.engine.tip(), Some(2));
}
