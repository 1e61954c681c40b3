//! Tests for the canonical order in which agreed transactions are applied.

mod common;

use ledger_consensus::{
    canonical_set::CanonicalTxSet,
    types::{data_types::CryptoHash, transaction::Transaction},
};

use crate::common::fixtures::{account, payment};

fn order(set: &CanonicalTxSet) -> Vec<(u8, u32)> {
    set.iter()
        .map(|(_, _, transaction)| (transaction.account.bytes()[0], transaction.sequence))
        .collect()
}

fn transactions() -> Vec<Transaction> {
    vec![
        payment(account(2), 2, account(9), 10),
        payment(account(1), 3, account(9), 10),
        payment(account(2), 1, account(9), 10),
        payment(account(1), 1, account(9), 10),
        payment(account(1), 2, account(9), 10),
    ]
}

#[test]
fn transactions_of_one_account_are_ordered_by_sequence_test() {
    let mut set = CanonicalTxSet::new(CryptoHash::zero());
    set.extend(transactions());

    assert_eq!(set.len(), 5);
    assert_eq!(order(&set), vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2)]);

    let sequences: Vec<u32> = set
        .into_transactions()
        .iter()
        .map(|transaction| transaction.sequence)
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 1, 2]);
}

#[test]
fn the_salt_decides_the_order_of_accounts_test() {
    // Salting with 0x03.. swaps accounts 0x01.. and 0x02..
    let mut set = CanonicalTxSet::new(CryptoHash::new([3u8; 32]));
    set.extend(transactions());

    assert_eq!(order(&set), vec![(2, 1), (2, 2), (1, 1), (1, 2), (1, 3)]);
}

#[test]
fn inserting_twice_has_no_effect_test() {
    let mut set = CanonicalTxSet::new(CryptoHash::zero());
    let transaction = payment(account(1), 1, account(2), 10);

    let key = set.insert(transaction.clone());
    assert_eq!(set.insert(transaction.clone()), key);
    assert_eq!(set.len(), 1);

    assert_eq!(set.remove(&key), Some(transaction));
    assert!(set.is_empty());
}

#[test]
fn insertion_order_does_not_matter_test() {
    let salt = CryptoHash::new([5u8; 32]);
    let mut forwards = CanonicalTxSet::new(salt);
    forwards.extend(transactions());
    let mut backwards = CanonicalTxSet::new(salt);
    backwards.extend(transactions().into_iter().rev());

    let ids = |set: &CanonicalTxSet| -> Vec<_> {
        set.iter()
            .map(|(_, _, transaction)| transaction.id())
            .collect()
    };
    assert_eq!(ids(&forwards), ids(&backwards));
    assert_eq!(order(&forwards), order(&backwards));
}
