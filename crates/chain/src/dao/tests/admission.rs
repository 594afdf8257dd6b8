use super::*;
use stock_common::crypto;

use crate::dao::admission::AdmissionError;
use crate::dao::answer::AnswerTx;
use crate::dao::consultation::{ConsultationKind, ConsultationTx};
use crate::dao::flags::{consultation_version, DaoState};
use crate::dao::payment_request::{sign_payment_request, Ed25519Oracle};
use crate::dao::vote_cache::{VOTE_ABSTAIN, VOTE_YES};

fn admission_err(result: Result<BlockSummary, DaoError>) -> AdmissionError {
    match result {
        Err(DaoError::Admission(e)) => e,
        other => panic!("expected admission error, got {:?}", other),
    }
}

/// Proposal `txid(1)` diterima di block 10 (A + B yes).
fn accepted_proposal(h: &mut Harness, owner: TxDestination) -> Hash256 {
    h.advance_to(0);
    let mut tx = proposal_tx(100 * COIN, 1_000_000);
    tx.owner = owner;
    h.connect_tx(GovernanceTx::Proposal { txid: txid(1), tx });
    h.advance_to(4);
    h.connect_votes(&[('A', txid(1), VOTE_YES), ('B', txid(1), VOTE_YES)]);
    h.advance_to(10);
    assert_eq!(h.engine.state().proposals[&txid(1)].state_at(10), DaoState::Accepted);
    txid(1)
}

#[test]
fn proposal_rules() {
    let mut h = Harness::new(&[]);
    h.advance_to(0);

    let mut cheap = proposal_tx(COIN, 1_000);
    cheap.fee = COIN;
    let err = admission_err(h.try_connect(h.block().with_tx(GovernanceTx::Proposal { txid: txid(1), tx: cheap })));
    assert_eq!(err, AdmissionError::FeeTooLow { kind: "proposal", fee: COIN, min: 50 * COIN });

    let no_deadline = proposal_tx(COIN, 0);
    let err = admission_err(h.try_connect(h.block().with_tx(GovernanceTx::Proposal { txid: txid(1), tx: no_deadline })));
    assert_eq!(err, AdmissionError::InvalidDeadline);

    let mut nowhere = proposal_tx(COIN, 1_000);
    nowhere.payment_address = TxDestination::NoDestination;
    let err = admission_err(h.try_connect(h.block().with_tx(GovernanceTx::Proposal { txid: txid(1), tx: nowhere })));
    assert!(matches!(err, AdmissionError::InvalidDestination(_)));

    h.connect_tx(GovernanceTx::Proposal { txid: txid(1), tx: proposal_tx(COIN, 1_000) });
    let err = admission_err(
        h.try_connect(h.block().with_tx(GovernanceTx::Proposal { txid: txid(1), tx: proposal_tx(COIN, 1_000) })),
    );
    assert_eq!(err, AdmissionError::DuplicateObject(txid(1)));
}

#[test]
fn payment_request_needs_accepted_parent() {
    let mut h = Harness::new(&[]);
    h.advance_to(0);
    h.connect_tx(GovernanceTx::Proposal { txid: txid(1), tx: proposal_tx(100 * COIN, 1_000_000) });

    let early = GovernanceTx::PaymentRequest { txid: txid(2), tx: payment_request_tx(txid(1), COIN) };
    let err = admission_err(h.try_connect(h.block().with_tx(early)));
    assert_eq!(err, AdmissionError::ProposalNotAccepted { proposal: txid(1), state: DaoState::Nil });

    let orphan = GovernanceTx::PaymentRequest { txid: txid(2), tx: payment_request_tx(txid(7), COIN) };
    let err = admission_err(h.try_connect(h.block().with_tx(orphan)));
    assert_eq!(err, AdmissionError::UnknownProposal(txid(7)));
}

#[test]
fn payment_request_signature_is_checked_against_owner() {
    let keypair = crypto::generate_keypair_bytes().expect("keygen");
    let pubkey = crypto::public_key_bytes_from_keypair_bytes(&keypair).expect("pubkey");
    let owner = TxDestination::KeyId(Hash160::of_pubkey(&pubkey));

    let mut h = Harness::new(&[]).with_signatures(Box::new(Ed25519Oracle));
    let proposal = accepted_proposal(&mut h, owner);

    let mut unsigned = payment_request_tx(proposal, 10 * COIN);
    unsigned.signature = vec![0; 96];
    let err = admission_err(h.try_connect(h.block().with_tx(GovernanceTx::PaymentRequest { txid: txid(2), tx: unsigned })));
    assert_eq!(err, AdmissionError::BadSignature);

    let mut signed = payment_request_tx(proposal, 10 * COIN);
    signed.signature = sign_payment_request(&keypair, &signed.signed_message()).expect("sign");
    h.connect_tx(GovernanceTx::PaymentRequest { txid: txid(2), tx: signed });
    let requests = {
        let parent = proposal;
        h.engine.payment_requests(&parent)
    };
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].hash, txid(2));
}

#[test]
fn payment_request_cannot_exceed_remaining_amount() {
    let mut h = Harness::new(&[]);
    let proposal = accepted_proposal(&mut h, owner());
    let greedy = GovernanceTx::PaymentRequest { txid: txid(2), tx: payment_request_tx(proposal, 101 * COIN) };
    let err = admission_err(h.try_connect(h.block().with_tx(greedy)));
    assert_eq!(err, AdmissionError::ExceedsAvailable { amount: 101 * COIN, available: 100 * COIN });
}

#[test]
fn consultation_and_answer_rules() {
    let mut h = Harness::new(&[]);
    h.advance_to(0);

    let bad_range = ConsultationTx {
        question: "how many?".to_string(),
        kind: ConsultationKind::Range { min: 10, max: 10 },
        initial_answers: Vec::new(),
        version: consultation_version::BASE | consultation_version::ANSWER_IS_A_RANGE,
        fee: 10 * COIN,
    };
    let err = admission_err(h.try_connect(h.block().with_tx(GovernanceTx::Consultation { txid: txid(5), tx: bad_range })));
    assert_eq!(err, AdmissionError::InvalidRange { min: 10, max: 10 });

    // consensus change membayar fee consultation + satu answer
    let mut cheap = ConsultationTx::consensus_change(P::ProposalMinFee, 60 * COIN, 10 * COIN).expect("valid");
    cheap.fee = 10 * COIN;
    let err = admission_err(h.try_connect(h.block().with_tx(GovernanceTx::Consultation { txid: txid(5), tx: cheap })));
    assert!(matches!(err, AdmissionError::FeeTooLow { min, .. } if min == 15 * COIN));

    let range = ConsultationTx {
        question: "how many?".to_string(),
        kind: ConsultationKind::Range { min: 1, max: 10 },
        initial_answers: Vec::new(),
        version: consultation_version::BASE | consultation_version::ANSWER_IS_A_RANGE,
        fee: 10 * COIN,
    };
    h.connect_tx(GovernanceTx::Consultation { txid: txid(5), tx: range });
    let answer = GovernanceTx::Answer { txid: txid(6), tx: AnswerTx::text(txid(5), "seven", 5 * COIN) };
    let err = admission_err(h.try_connect(h.block().with_tx(answer)));
    assert_eq!(err, AdmissionError::NoNewAnswers(txid(5)));

    let unknown = GovernanceTx::Answer { txid: txid(6), tx: AnswerTx::text(txid(8), "seven", 5 * COIN) };
    let err = admission_err(h.try_connect(h.block().with_tx(unknown)));
    assert_eq!(err, AdmissionError::UnknownConsultation(txid(8)));

    // nilai consensus di luar range tipe parameter
    let consensus = ConsultationTx::consensus_change(P::ProposalMinQuorum, 6_000, 15 * COIN).expect("valid");
    h.connect_tx(GovernanceTx::Consultation { txid: txid(9), tx: consensus });
    let mut bad_value = AnswerTx::consensus_value(txid(9), P::ProposalMinQuorum, 7_000, 5 * COIN).expect("valid");
    bad_value.value = crate::dao::answer::AnswerValue::Number(12_000);
    let err = admission_err(h.try_connect(h.block().with_tx(GovernanceTx::Answer { txid: txid(10), tx: bad_value })));
    assert!(matches!(err, AdmissionError::Param(_)));

    let good = AnswerTx::consensus_value(txid(9), P::ProposalMinQuorum, 7_000, 5 * COIN).expect("valid");
    h.connect_tx(GovernanceTx::Answer { txid: txid(10), tx: good });
    // hasil query tidak meminjam hash argumen
    let answers = {
        let parent = txid(9);
        h.engine.consultation_answers(&parent)
    };
    assert_eq!(answers.len(), 2);
}

#[test]
fn vote_values_are_checked_per_object() {
    let mut h = Harness::new(&[]);
    h.advance_to(0);
    h.connect_tx(GovernanceTx::Proposal { txid: txid(1), tx: proposal_tx(COIN, 1_000) });

    // proposal tanpa flag ABSTAIN_VOTE
    let mut block = h.block();
    block.votes.push(StakerVotes { staker: staker('A'), entries: vec![(txid(1), VOTE_ABSTAIN)], light_fee: None });
    let err = admission_err(h.try_connect(block));
    assert_eq!(err, AdmissionError::InvalidVote { hash: txid(1), value: VOTE_ABSTAIN });

    let mut block = h.block();
    block.votes.push(StakerVotes { staker: staker('A'), entries: vec![(txid(1), 42)], light_fee: None });
    assert!(matches!(admission_err(h.try_connect(block)), AdmissionError::InvalidVote { value: 42, .. }));

    let mut block = h.block();
    block.votes.push(StakerVotes { staker: staker('A'), entries: vec![(txid(4), VOTE_YES)], light_fee: None });
    assert_eq!(admission_err(h.try_connect(block)), AdmissionError::UnknownObject(txid(4)));
}
