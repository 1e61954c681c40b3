//! Tests for the parts the consensus engine is built from: quorum, close time agreement, disputes,
//! validations, the proposal store, and transaction set acquisition.

mod common;

use std::time::{Duration, Instant};

use ledger_consensus::{
    consensus::{
        close_time::{effective_close_time, next_resolution, round_close_time, CloseTimeVotes},
        disputes::DisputedTx,
        validations::{ValidationRejection, ValidationTally},
        ConsensusParameters, QuorumPolicy, ThresholdQuorum,
    },
    proposal_store::{Ingested, ProposalRejection, ProposalStore},
    tx_set::{acquire::TxSetAcquirer, NodeFetcher, TxSet},
    types::data_types::{
        CloseResolution, CryptoHash, LedgerSequence, NetClockTime, Power, ProposeSequence,
        TotalPower,
    },
};

use crate::common::{
    fetcher::SharedFetcher,
    fixtures::{
        account, payment, signed_proposal, signed_validation, signing_keys, validator_set,
    },
};

#[test]
fn threshold_quorum_test() {
    let keys = signing_keys(5);
    let validators = validator_set(&keys);
    let quorum = ThresholdQuorum::new(80);

    assert!(!quorum.accept(TotalPower::new(3), &validators));
    assert!(quorum.accept(TotalPower::new(4), &validators));
    assert!(quorum.accept(TotalPower::new(5), &validators));

    // Nothing is a quorum of an empty set.
    assert!(!quorum.accept(TotalPower::new(0), &validator_set([])));
}

#[test]
fn close_time_rounding_test() {
    let resolution = CloseResolution::new(30);

    assert_eq!(
        round_close_time(NetClockTime::new(100), resolution),
        NetClockTime::new(90)
    );
    assert_eq!(
        round_close_time(NetClockTime::new(105), resolution),
        NetClockTime::new(120)
    );
    assert_eq!(
        round_close_time(NetClockTime::new(0), resolution),
        NetClockTime::new(0)
    );

    // The recorded close time is always after the parent's.
    assert_eq!(
        effective_close_time(NetClockTime::new(100), resolution, NetClockTime::new(95)),
        NetClockTime::new(96)
    );
    assert_eq!(
        effective_close_time(NetClockTime::new(100), resolution, NetClockTime::new(60)),
        NetClockTime::new(90)
    );
}

#[test]
fn close_resolution_adapts_test() {
    let thirty = CloseResolution::new(30);

    // 1. Disagreement makes the resolution coarser right away.
    assert_eq!(
        next_resolution(thirty, false, LedgerSequence::new(5)),
        CloseResolution::new(60)
    );
    assert_eq!(
        next_resolution(CloseResolution::new(120), false, LedgerSequence::new(5)),
        CloseResolution::new(120)
    );

    // 2. Agreement makes it finer, but only every 8 ledgers.
    assert_eq!(next_resolution(thirty, true, LedgerSequence::new(7)), thirty);
    assert_eq!(
        next_resolution(thirty, true, LedgerSequence::new(8)),
        CloseResolution::new(20)
    );
    assert_eq!(
        next_resolution(CloseResolution::new(10), true, LedgerSequence::new(8)),
        CloseResolution::new(10)
    );
}

#[test]
fn close_time_votes_test() {
    let resolution = CloseResolution::new(30);

    // 1. Three of four close times round to 90.
    let mut votes = CloseTimeVotes::new();
    for secs in [100, 101, 102, 200] {
        votes.add(NetClockTime::new(secs), resolution);
    }
    assert_eq!(votes.participants(), 4);
    assert_eq!(votes.count(&NetClockTime::new(90)), 3);
    assert_eq!(votes.winner(75), Some((NetClockTime::new(90), true)));
    assert_eq!(votes.winner(80), Some((NetClockTime::new(90), false)));

    // 2. Ties go to the later close time.
    let mut votes = CloseTimeVotes::new();
    votes.add(NetClockTime::new(90), resolution);
    votes.add(NetClockTime::new(210), resolution);
    assert_eq!(votes.winner(75), Some((NetClockTime::new(210), false)));

    assert_eq!(CloseTimeVotes::new().winner(75), None);
}

#[test]
fn dispute_threshold_schedule_test() {
    let params = ConsensusParameters::default();
    assert_eq!(params.dispute_threshold(0), 50);
    assert_eq!(params.dispute_threshold(49), 50);
    assert_eq!(params.dispute_threshold(50), 65);
    assert_eq!(params.dispute_threshold(100), 70);
    assert_eq!(params.dispute_threshold(250), 95);
}

#[test]
fn disputed_transaction_votes_test() {
    let keys = signing_keys(4);
    let transaction = payment(account(1), 1, account(2), 10);

    // 1. A proposing node that includes a transaction nobody else does drops it.
    let mut dispute = DisputedTx::new(transaction.clone(), true);
    for key in &keys {
        assert!(dispute.set_vote(key.verifying_key(), false, Power::new(1)));
    }
    assert_eq!(dispute.nays(), TotalPower::new(4));
    assert!(dispute.update_vote(50, true, Power::new(1)));
    assert!(!dispute.our_vote());

    // 2. Once everyone agrees, the vote stays.
    assert!(!dispute.update_vote(50, true, Power::new(1)));

    // 3. A transaction everybody else includes is adopted, unless the threshold has risen too high.
    let mut dispute = DisputedTx::new(transaction.clone(), false);
    for key in &keys {
        dispute.set_vote(key.verifying_key(), true, Power::new(1));
    }
    assert!(!dispute.update_vote(95, true, Power::new(1)));
    assert!(!dispute.our_vote());
    assert!(dispute.update_vote(50, true, Power::new(1)));
    assert!(dispute.our_vote());

    // 4. A node that is not proposing follows the majority of its peers.
    let mut dispute = DisputedTx::new(transaction, true);
    dispute.set_vote(keys[0].verifying_key(), true, Power::new(1));
    dispute.set_vote(keys[1].verifying_key(), false, Power::new(1));
    dispute.set_vote(keys[2].verifying_key(), false, Power::new(1));
    assert!(dispute.update_vote(50, false, Power::new(1)));
    assert!(!dispute.our_vote());

    // Changing a peer's vote is reported, repeating it is not.
    assert!(!dispute.set_vote(keys[0].verifying_key(), true, Power::new(1)));
    assert!(dispute.set_vote(keys[0].verifying_key(), false, Power::new(1)));
}

#[test]
fn ledgers_become_fully_validated_test() {
    let keys = signing_keys(5);
    let validators = validator_set(&keys);
    let quorum = ThresholdQuorum::new(80);
    let mut tally = ValidationTally::new();
    let (seq, hash) = (LedgerSequence::new(2), CryptoHash::new([2u8; 32]));

    // 1. Three of five validations are not a quorum, four are.
    for key in &keys[..3] {
        assert_eq!(
            tally.add(signed_validation(key, hash, seq), &validators, &quorum),
            Ok(None)
        );
    }
    assert_eq!(
        tally.add(signed_validation(&keys[3], hash, seq), &validators, &quorum),
        Ok(Some((seq, hash)))
    );
    assert_eq!(tally.last_fully_validated(), Some((seq, hash)));

    // 2. The fifth validation does not validate the ledger again.
    assert_eq!(
        tally.add(signed_validation(&keys[4], hash, seq), &validators, &quorum),
        Ok(None)
    );
    assert_eq!(tally.support(&hash, &validators), TotalPower::new(5));
}

#[test]
fn validations_are_rejected_test() {
    let keys = signing_keys(3);
    let validators = validator_set(&keys[..2]);
    let quorum = ThresholdQuorum::new(80);
    let mut tally = ValidationTally::new();
    let hash = CryptoHash::new([2u8; 32]);

    // 1. A validator not in the set.
    assert_eq!(
        tally.add(
            signed_validation(&keys[2], hash, LedgerSequence::new(2)),
            &validators,
            &quorum
        ),
        Err(ValidationRejection::Untrusted)
    );

    // 2. A validation altered after it was signed.
    let mut altered = signed_validation(&keys[0], hash, LedgerSequence::new(2));
    altered.ledger_hash = CryptoHash::new([3u8; 32]);
    assert_eq!(
        tally.add(altered, &validators, &quorum),
        Err(ValidationRejection::BadSignature)
    );

    // 3. A validation that is not newer than the validator's latest.
    tally
        .add(
            signed_validation(&keys[0], hash, LedgerSequence::new(3)),
            &validators,
            &quorum,
        )
        .unwrap();
    assert_eq!(
        tally.add(
            signed_validation(&keys[0], hash, LedgerSequence::new(3)),
            &validators,
            &quorum
        ),
        Err(ValidationRejection::Stale)
    );
}

#[test]
fn proposals_supersede_older_positions_test() {
    let keys = signing_keys(2);
    let validators = validator_set(&keys[..1]);
    let mut store = ProposalStore::new();
    let now = Instant::now();
    let (prev, other_prev) = (CryptoHash::new([1u8; 32]), CryptoHash::new([9u8; 32]));
    let close_time = NetClockTime::new(100);
    let position = |n: u8| CryptoHash::new([n; 32]);

    // 1. Within a round, only a higher sequence replaces the position.
    let propose = |prev, n, seq| {
        signed_proposal(&keys[0], prev, position(n), close_time, ProposeSequence::new(seq))
    };
    assert_eq!(
        store.ingest(propose(prev, 10, 0), &validators, now),
        Ok(Ingested::Position)
    );
    assert_eq!(
        store.ingest(propose(prev, 11, 0), &validators, now),
        Err(ProposalRejection::StaleSequence)
    );
    assert_eq!(
        store.ingest(propose(prev, 12, 1), &validators, now),
        Ok(Ingested::Position)
    );
    let peer = keys[0].verifying_key();
    assert_eq!(store.position(&peer).unwrap().proposal.position, position(12));

    // 2. A position on another previous ledger replaces it whatever its sequence.
    assert_eq!(
        store.ingest(propose(other_prev, 13, 0), &validators, now),
        Ok(Ingested::Position)
    );
    assert_eq!(store.len(), 1);
    assert!(store
        .positions_for(&prev, now, Duration::from_secs(20))
        .is_empty());

    // 3. A superseded proposal on the earlier ledger is refused when received again.
    assert_eq!(
        store.ingest(propose(prev, 12, 1), &validators, now),
        Err(ProposalRejection::StaleSequence)
    );
    assert_eq!(store.position(&peer).unwrap().proposal.prev_ledger, other_prev);
    assert_eq!(
        store.ingest(propose(prev, 16, 2), &validators, now),
        Ok(Ingested::Position)
    );

    // 4. Untrusted and altered proposals are ignored.
    assert_eq!(
        store.ingest(
            signed_proposal(&keys[1], prev, position(1), close_time, ProposeSequence::init()),
            &validators,
            now
        ),
        Err(ProposalRejection::Untrusted)
    );
    let mut altered = propose(prev, 14, 5);
    altered.position = position(15);
    assert_eq!(
        store.ingest(altered, &validators, now),
        Err(ProposalRejection::BadSignature)
    );
}

#[test]
fn bowing_out_of_a_round_test() {
    let keys = signing_keys(1);
    let validators = validator_set(&keys);
    let mut store = ProposalStore::new();
    let now = Instant::now();
    let prev = CryptoHash::new([1u8; 32]);
    let close_time = NetClockTime::new(100);
    let peer = keys[0].verifying_key();

    store
        .ingest(
            signed_proposal(&keys[0], prev, prev, close_time, ProposeSequence::init()),
            &validators,
            now,
        )
        .unwrap();

    // 1. Bowing out removes the position.
    assert_eq!(
        store.ingest(
            signed_proposal(&keys[0], prev, prev, close_time, ProposeSequence::BOW_OUT),
            &validators,
            now
        ),
        Ok(Ingested::BowOut)
    );
    assert!(store.position(&peer).is_none());
    assert!(store.is_dead(&prev, &peer));

    // 2. The peer can not rejoin the round.
    assert_eq!(
        store.ingest(
            signed_proposal(&keys[0], prev, prev, close_time, ProposeSequence::new(1)),
            &validators,
            now
        ),
        Err(ProposalRejection::DeadNode)
    );

    // 3. Retiring the round forgets that the peer left it, but not what it proposed there.
    store.retire(&prev);
    assert!(!store.is_dead(&prev, &peer));
    assert_eq!(
        store.ingest(
            signed_proposal(&keys[0], prev, prev, close_time, ProposeSequence::init()),
            &validators,
            now
        ),
        Err(ProposalRejection::StaleSequence)
    );
    assert!(store.position(&peer).is_none());
}

#[test]
fn support_for_previous_ledgers_test() {
    let keys = signing_keys(4);
    let validators = validator_set(&keys);
    let mut store = ProposalStore::new();
    let start = Instant::now();
    let (prev_a, prev_b) = (CryptoHash::new([1u8; 32]), CryptoHash::new([2u8; 32]));
    let close_time = NetClockTime::new(100);
    let freshness = Duration::from_secs(20);

    for (i, key) in keys.iter().enumerate() {
        let (prev, received) = if i == 3 {
            (prev_b, start + Duration::from_secs(10))
        } else {
            (prev_a, start)
        };
        store
            .ingest(
                signed_proposal(key, prev, prev, close_time, ProposeSequence::init()),
                &validators,
                received,
            )
            .unwrap();
    }

    // 1. Every position is fresh.
    let support = store.prev_ledger_support(&validators, start + Duration::from_secs(10), freshness);
    assert_eq!(support.get(&prev_a), Some(&TotalPower::new(3)));
    assert_eq!(support.get(&prev_b), Some(&TotalPower::new(1)));
    assert_eq!(
        store
            .positions_for(&prev_a, start + Duration::from_secs(10), freshness)
            .len(),
        3
    );

    // 2. Only the later position is still fresh.
    let later = start + Duration::from_secs(25);
    let support = store.prev_ledger_support(&validators, later, freshness);
    assert_eq!(support.get(&prev_a), None);
    assert_eq!(support.get(&prev_b), Some(&TotalPower::new(1)));

    store.expire(later, freshness);
    assert_eq!(store.len(), 1);
}

#[test]
fn transaction_set_difference_test() {
    let (tx1, tx2, tx3) = (
        payment(account(1), 1, account(2), 10),
        payment(account(1), 2, account(2), 10),
        payment(account(2), 1, account(1), 10),
    );
    let ours = TxSet::new([tx1.clone(), tx2.clone()]);
    let theirs = ours.without(&tx2.id()).with(tx3.clone());

    let difference = ours.difference(&theirs);
    assert_eq!(difference.len(), 2);
    assert_eq!(difference.get(&tx2.id()), Some(&(tx2.clone(), true)));
    assert_eq!(difference.get(&tx3.id()), Some(&(tx3.clone(), false)));
    assert!(!difference.contains_key(&tx1.id()));

    // The hash only depends on the transactions.
    assert_eq!(
        ours.without(&tx2.id()).hash(),
        TxSet::new([payment(account(1), 1, account(2), 10)]).hash()
    );
    assert_eq!(TxSet::new([tx1]).hash(), theirs.without(&tx3.id()).hash());
    assert_ne!(ours.hash(), theirs.hash());
    assert_ne!(TxSet::empty().hash(), ours.hash());
}

#[test]
fn acquiring_a_transaction_set_test() {
    let set = TxSet::new([
        payment(account(1), 1, account(2), 10),
        payment(account(2), 1, account(1), 10),
    ]);
    let mut fetcher = SharedFetcher::new();
    let mut acquirer = TxSetAcquirer::new();

    // 1. Nothing can be pulled until the nodes are published.
    assert!(acquirer.acquire(set.hash()));
    assert!(!acquirer.acquire(set.hash()));
    assert!(acquirer.poll(&mut fetcher).is_empty());
    assert!(acquirer.is_acquiring(&set.hash()));

    // 2. Publish only the root node: the leaves are still missing.
    let mut nodes = set.nodes().into_iter();
    let (root_hash, root_node) = nodes.next().unwrap();
    assert_eq!(root_hash, set.hash());
    fetcher.got(root_hash, root_node);
    assert!(acquirer.poll(&mut fetcher).is_empty());

    // 3. Publish the leaves.
    for (hash, bytes) in nodes {
        fetcher.got(hash, bytes);
    }
    let mut fetched = acquirer.poll(&mut fetcher);
    assert_eq!(fetched.len(), 1);
    assert!(!acquirer.is_acquiring(&set.hash()));

    let assembled = fetched.pop().unwrap().assemble().unwrap();
    assert_eq!(assembled.hash(), set.hash());
    assert_eq!(assembled.len(), 2);
}

#[test]
fn acquiring_rejects_nodes_that_do_not_match_test() {
    let set = TxSet::new([payment(account(1), 1, account(2), 10)]);
    let mut fetcher = SharedFetcher::new();
    let mut acquirer = TxSetAcquirer::new();
    acquirer.acquire(set.hash());

    // A root node published under the wrong hash is never accepted.
    let other = TxSet::new([payment(account(2), 1, account(1), 10)]);
    fetcher.got(set.hash(), other.root_node());
    assert!(acquirer.poll(&mut fetcher).is_empty());
    assert!(acquirer.is_acquiring(&set.hash()));

    acquirer.abandon(&set.hash());
    assert!(acquirer.pending().next().is_none());
}

#[test]
fn proposal_sequences_never_reach_bow_out_test() {
    assert_eq!(ProposeSequence::init().next(), ProposeSequence::new(1));

    let last = ProposeSequence::new(u32::MAX - 1);
    assert_eq!(ProposeSequence::new(u32::MAX - 2).next(), last);
    assert_eq!(last.next(), last);
    assert!(!last.next().is_bow_out());
    assert!(!ProposeSequence::BOW_OUT.next().is_bow_out());
}
