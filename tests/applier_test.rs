//! Tests for applying transactions: single transactions, agreed sets in canonical order with retry passes,
//! and the open ledger.

mod common;

use std::sync::Arc;

use ledger_consensus::{
    applier::{
        apply_transaction, build_ledger,
        open_ledger::OpenLedger,
        result::{ApplyOutcome, TxResultCode},
        transactors::{reserve, ACCOUNT_RESERVE},
    },
    directory,
    entry_cache::{metadata::NodeAction, LedgerEntryCache},
    ledger::{
        entry::{Field, LedgerEntryType},
        keys,
        snapshot::Ledger,
    },
    types::{
        data_types::{CloseResolution, CryptoHash, LedgerSequence, NetClockTime},
        transaction::{Transaction, TransactionKind},
    },
};

use crate::common::fixtures::{account, balance, genesis, payment, FEE, STARTING_BALANCE};

fn build(parent: &Arc<Ledger>, transactions: Vec<Transaction>) -> (Ledger, ledger_consensus::applier::ApplyReport) {
    build_ledger(
        parent,
        transactions,
        CryptoHash::new([7u8; 32]),
        NetClockTime::new(parent.close_time().secs() + 30),
        CloseResolution::new(30),
        true,
        3,
        1,
    )
}

#[test]
fn payment_between_existing_accounts_test() {
    let (alice, bob) = (account(1), account(2));
    let parent = Arc::new(genesis(&[alice, bob]));
    let transaction = payment(alice, 1, bob, 1_000);

    let (ledger, report) = build(&parent, vec![transaction.clone()]);

    // 1. Balances and sequence numbers.
    assert_eq!(report.applied.len(), 1);
    assert_eq!(balance(&ledger, &alice), Some(STARTING_BALANCE - 1_000 - FEE));
    assert_eq!(balance(&ledger, &bob), Some(STARTING_BALANCE + 1_000));
    let alice_root = ledger.entry(&keys::account_root(&alice)).unwrap();
    assert_eq!(alice_root.u32(Field::Sequence), 2);

    // 2. Both account roots are threaded to the transaction.
    for account in [alice, bob] {
        let root = ledger.entry(&keys::account_root(&account)).unwrap();
        assert_eq!(root.hash(Field::PreviousTxnID), transaction.id());
        assert_eq!(root.u32(Field::PreviousTxnLgrSeq), 2);
    }

    // 3. Metadata records both modifications.
    let metadata = &report.applied[0].metadata;
    assert_eq!(metadata.tx_id, transaction.id());
    assert_eq!(metadata.ledger_seq, LedgerSequence::new(2));
    assert_eq!(metadata.result, TxResultCode::Success);
    let sender = metadata
        .affected_node(&keys::account_root(&alice))
        .unwrap();
    assert_eq!(sender.action, NodeAction::Modified);
    assert!(sender.previous_fields.contains_key(&Field::Balance));
    assert!(sender.final_fields.contains_key(&Field::Balance));
    assert_eq!(ledger.transactions().len(), 1);
}

#[test]
fn payment_creating_the_destination_test() {
    let (alice, carol) = (account(1), account(3));
    let parent = Arc::new(genesis(&[alice]));

    // 1. A payment too small to fund the reserve only claims its fee.
    let (ledger, report) = build(&parent, vec![payment(alice, 1, carol, ACCOUNT_RESERVE - 1)]);
    assert_eq!(
        report.applied[0].metadata.result,
        TxResultCode::NoDestinationInsufficient
    );
    assert_eq!(balance(&ledger, &carol), None);
    assert_eq!(balance(&ledger, &alice), Some(STARTING_BALANCE - FEE));

    // 2. A large enough payment creates the account.
    let (ledger, report) = build(&parent, vec![payment(alice, 1, carol, ACCOUNT_RESERVE)]);
    assert_eq!(balance(&ledger, &carol), Some(ACCOUNT_RESERVE));
    let created = report.applied[0]
        .metadata
        .affected_node(&keys::account_root(&carol))
        .unwrap();
    assert_eq!(created.action, NodeAction::Created);
    assert!(created.new_fields.contains_key(&Field::Balance));
}

#[test]
fn dependent_transaction_is_retried_test() {
    let (alice, bob, carol) = (account(1), account(2), account(3));
    let parent = Arc::new(genesis(&[alice, bob]));

    // Carol's payment can only apply after Alice's payment creates her account, whichever comes first in
    // the canonical order.
    let funding = payment(alice, 1, carol, 10_000);
    let dependent = payment(carol, 1, bob, 500);
    let (ledger, report) = build(&parent, vec![dependent.clone(), funding.clone()]);

    let applied: Vec<_> = report.applied_ids().collect();
    assert_eq!(applied.len(), 2);
    assert!(applied.contains(&funding.id()));
    assert!(applied.contains(&dependent.id()));
    assert!(report.excluded.is_empty());
    assert_eq!(balance(&ledger, &carol), Some(10_000 - 500 - FEE));
    assert_eq!(balance(&ledger, &bob), Some(STARTING_BALANCE + 500));
}

#[test]
fn transactions_that_cannot_apply_are_excluded_test() {
    let (alice, bob) = (account(1), account(2));
    let parent = Arc::new(genesis(&[alice, bob]));

    let malformed = payment(alice, 1, bob, 0);
    let to_self = payment(bob, 1, bob, 10);
    let ahead = payment(alice, 5, bob, 10);
    let (ledger, report) = build(&parent, vec![malformed.clone(), to_self.clone(), ahead.clone()]);

    assert!(report.applied.is_empty());
    assert_eq!(
        report.excluded_result(&malformed.id()),
        Some(TxResultCode::BadAmount)
    );
    assert_eq!(
        report.excluded_result(&to_self.id()),
        Some(TxResultCode::DestinationIsSource)
    );

    // A transaction still waiting for its sequence after the last pass may apply to a later ledger.
    assert_eq!(
        report.excluded_result(&ahead.id()),
        Some(TxResultCode::RetriesExhausted)
    );
    assert_eq!(report.retriable, vec![ahead]);
    assert_eq!(balance(&ledger, &alice), Some(STARTING_BALANCE));
}

#[test]
fn unfunded_payment_claims_its_fee_after_retry_passes_test() {
    let (alice, bob) = (account(1), account(2));
    let parent = Arc::new(genesis(&[alice, bob]));

    let unfunded = payment(alice, 1, bob, STARTING_BALANCE);
    let (ledger, report) = build(&parent, vec![unfunded.clone()]);

    assert_eq!(report.applied.len(), 1);
    assert_eq!(
        report.applied[0].metadata.result,
        TxResultCode::UnfundedPayment
    );
    assert!(TxResultCode::UnfundedPayment.is_included());
    assert!(!TxResultCode::PreSequence.is_included());
    assert_eq!(balance(&ledger, &alice), Some(STARTING_BALANCE - FEE));
    assert_eq!(balance(&ledger, &bob), Some(STARTING_BALANCE));
}

#[test]
fn past_sequence_is_a_failure_test() {
    let (alice, bob) = (account(1), account(2));
    let parent = Arc::new(genesis(&[alice, bob]));
    let mut cache = LedgerEntryCache::new(parent);

    let first = payment(alice, 1, bob, 100);
    assert!(matches!(
        apply_transaction(&mut cache, &first, 0, false),
        ApplyOutcome::Applied { .. }
    ));

    let replay = payment(alice, 1, bob, 200);
    let outcome = apply_transaction(&mut cache, &replay, 1, false);
    assert!(matches!(
        outcome,
        ApplyOutcome::Excluded(TxResultCode::PastSequence)
    ));
}

#[test]
fn offers_are_linked_into_the_owner_directory_test() {
    let alice = account(1);
    let parent = Arc::new(genesis(&[alice]));
    let mut cache = LedgerEntryCache::new(parent);

    // 1. Create an offer.
    let create = Transaction::new(
        alice,
        1,
        FEE,
        TransactionKind::OfferCreate {
            taker_pays: 10,
            taker_gets: 20,
        },
    );
    assert!(matches!(
        apply_transaction(&mut cache, &create, 0, false),
        ApplyOutcome::Applied {
            code: TxResultCode::Success,
            ..
        }
    ));
    let offer_key = keys::offer(&alice, 1);
    let owner_dir = keys::owner_dir(&alice);
    assert_eq!(directory::count(&mut cache, &owner_dir), Ok(1));
    assert_eq!(
        cache
            .peek(&keys::account_root(&alice))
            .unwrap()
            .u32(Field::OwnerCount),
        1
    );
    assert_eq!(
        cache.peek(&offer_key).unwrap().entry_type(),
        LedgerEntryType::Offer
    );

    // 2. Cancel it.
    let cancel = Transaction::new(
        alice,
        2,
        FEE,
        TransactionKind::OfferCancel { offer_sequence: 1 },
    );
    let ApplyOutcome::Applied { code, metadata } = apply_transaction(&mut cache, &cancel, 1, false)
    else {
        panic!("offer cancel was not applied");
    };
    assert_eq!(code, TxResultCode::Success);
    assert!(cache.peek(&offer_key).is_none());
    assert!(directory::is_empty(&mut cache, &owner_dir));
    assert_eq!(
        metadata.affected_node(&offer_key).unwrap().action,
        NodeAction::Deleted
    );

    // 3. Cancelling it again only claims the fee.
    let again = Transaction::new(
        alice,
        3,
        FEE,
        TransactionKind::OfferCancel { offer_sequence: 1 },
    );
    assert_eq!(
        apply_transaction(&mut cache, &again, 2, false).code(),
        TxResultCode::NoEntry
    );
}

#[test]
fn trust_lines_hold_a_reserve_test() {
    let (alice, bob) = (account(1), account(2));
    let parent = Arc::new(genesis(&[alice, bob]));
    let mut cache = LedgerEntryCache::new(parent);
    let line_key = keys::trust_line(&alice, &bob);

    // 1. Opening a line costs the setter one owner reserve.
    let open = Transaction::new(
        alice,
        1,
        FEE,
        TransactionKind::TrustSet {
            counterparty: bob,
            limit: 100,
        },
    );
    assert_eq!(
        apply_transaction(&mut cache, &open, 0, false).code(),
        TxResultCode::Success
    );
    assert!(cache.peek(&line_key).is_some());
    assert_eq!(
        cache
            .peek(&keys::account_root(&alice))
            .unwrap()
            .u32(Field::OwnerCount),
        1
    );
    assert!(STARTING_BALANCE >= reserve(1));

    // 2. Setting the limit back to zero deletes the line, and frees the reserve.
    let close = Transaction::new(
        alice,
        2,
        FEE,
        TransactionKind::TrustSet {
            counterparty: bob,
            limit: 0,
        },
    );
    assert_eq!(
        apply_transaction(&mut cache, &close, 1, false).code(),
        TxResultCode::Success
    );
    assert!(cache.peek(&line_key).is_none());
    assert_eq!(
        cache
            .peek(&keys::account_root(&alice))
            .unwrap()
            .u32(Field::OwnerCount),
        0
    );
    assert!(directory::is_empty(&mut cache, &keys::owner_dir(&alice)));
    assert!(directory::is_empty(&mut cache, &keys::owner_dir(&bob)));
}

#[test]
fn owner_directory_is_rebuilt_after_being_emptied_test() {
    let alice = account(1);
    let parent = Arc::new(genesis(&[alice]));
    let offer = |sequence| {
        Transaction::new(
            alice,
            sequence,
            FEE,
            TransactionKind::OfferCreate {
                taker_pays: 10,
                taker_gets: 20,
            },
        )
    };
    let cancel = Transaction::new(
        alice,
        2,
        FEE,
        TransactionKind::OfferCancel { offer_sequence: 1 },
    );

    // Cancelling the only offer empties the directory, and the next offer refills it in the same ledger.
    let (ledger, report) = build(&parent, vec![offer(1), cancel, offer(3)]);

    assert_eq!(report.applied.len(), 3);
    assert!(report
        .applied
        .iter()
        .all(|applied| applied.metadata.result == TxResultCode::Success));
    assert!(ledger.entry(&keys::offer(&alice, 1)).is_none());
    assert!(ledger.entry(&keys::offer(&alice, 3)).is_some());
    let root = ledger.entry(&keys::owner_dir(&alice)).unwrap();
    assert_eq!(root.hashes(Field::Indexes).to_vec(), vec![keys::offer(&alice, 3)]);
    let alice_root = ledger.entry(&keys::account_root(&alice)).unwrap();
    assert_eq!(alice_root.u32(Field::OwnerCount), 1);
    assert_eq!(balance(&ledger, &alice), Some(STARTING_BALANCE - 3 * FEE));
}

#[test]
fn trust_line_is_reopened_after_being_closed_test() {
    let (alice, bob) = (account(1), account(2));
    let trust = |sequence, limit| {
        Transaction::new(
            alice,
            sequence,
            FEE,
            TransactionKind::TrustSet {
                counterparty: bob,
                limit,
            },
        )
    };

    // 1. Open the line in one ledger.
    let parent = Arc::new(genesis(&[alice, bob]));
    let (opened, _) = build(&parent, vec![trust(1, 100)]);
    let opened = Arc::new(opened);
    assert!(opened.entry(&keys::trust_line(&alice, &bob)).is_some());

    // 2. Close it and open it again in the next.
    let (ledger, report) = build(&opened, vec![trust(2, 0), trust(3, 50)]);

    assert_eq!(report.applied.len(), 2);
    assert!(report
        .applied
        .iter()
        .all(|applied| applied.metadata.result == TxResultCode::Success));
    let line = ledger.entry(&keys::trust_line(&alice, &bob)).unwrap();
    let limit_field = if alice < bob {
        Field::LowLimit
    } else {
        Field::HighLimit
    };
    assert_eq!(line.amount(limit_field), 50);
    assert_eq!(line.amount(Field::Balance), 0);
    for owner in [alice, bob] {
        let root = ledger.entry(&keys::owner_dir(&owner)).unwrap();
        assert_eq!(
            root.hashes(Field::Indexes).to_vec(),
            vec![keys::trust_line(&alice, &bob)]
        );
    }
    let alice_root = ledger.entry(&keys::account_root(&alice)).unwrap();
    assert_eq!(alice_root.u32(Field::OwnerCount), 1);
}

#[test]
fn open_ledger_holds_transactions_until_they_can_apply_test() {
    let (alice, bob, carol) = (account(1), account(2), account(3));
    let mut open_ledger = OpenLedger::new(Arc::new(genesis(&[alice, bob])));

    // 1. Carol does not exist yet, so her payment is held.
    let dependent = payment(carol, 1, bob, 500);
    assert!(matches!(
        open_ledger.apply(dependent.clone()),
        Some(ApplyOutcome::Retry(TxResultCode::NoAccount))
    ));
    assert!(open_ledger.is_empty());
    assert_eq!(open_ledger.held().count(), 1);

    // 2. Funding Carol lets the held payment apply too.
    let funding = payment(alice, 1, carol, 10_000);
    assert!(matches!(
        open_ledger.apply(funding.clone()),
        Some(ApplyOutcome::Applied { .. })
    ));
    assert_eq!(open_ledger.len(), 2);
    assert!(open_ledger.transactions().contains_key(&dependent.id()));
    assert_eq!(open_ledger.held().count(), 0);

    // 3. Applying an included transaction again does nothing.
    assert!(open_ledger.apply(funding).is_none());
}

#[test]
fn reopening_applies_carried_transactions_in_sequence_order_test() {
    let (alice, bob) = (account(1), account(2));
    let parent = Arc::new(genesis(&[alice, bob]));

    let carried = vec![
        payment(alice, 3, bob, 30),
        payment(alice, 1, bob, 10),
        payment(alice, 2, bob, 20),
    ];
    let open_ledger = OpenLedger::reopen(parent, carried);
    assert_eq!(open_ledger.len(), 3);
    assert_eq!(open_ledger.held().count(), 0);
}
