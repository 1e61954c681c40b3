/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The deterministic order in which the transactions of an agreed set are applied.
//!
//! Transactions of the same account are ordered by sequence number, so that they can apply one after
//! another. Across accounts, the order is derived from the account id XOR-ed with a salt, the hash of the
//! transaction set being applied. The salt is only known once the set is agreed, so no proposer can choose
//! a set that places its own transactions first.

use std::collections::BTreeMap;

use crate::types::{
    data_types::{CryptoHash, TxID},
    transaction::Transaction,
};

/// Position of a transaction in the canonical order. Keys compare by salted account, then sequence, then
/// salted transaction id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalKey {
    account: CryptoHash,
    sequence: u32,
    tx_id: CryptoHash,
}

/// An ordered collection of transactions pending application.
#[derive(Clone)]
pub struct CanonicalTxSet {
    salt: CryptoHash,
    transactions: BTreeMap<CanonicalKey, (TxID, Transaction)>,
}

impl CanonicalTxSet {
    pub fn new(salt: CryptoHash) -> Self {
        Self {
            salt,
            transactions: BTreeMap::new(),
        }
    }

    pub fn salt(&self) -> CryptoHash {
        self.salt
    }

    /// Compute the key `transaction` would have in this set.
    pub fn key(&self, transaction: &Transaction, tx_id: &TxID) -> CanonicalKey {
        CanonicalKey {
            account: transaction.account.widened() ^ self.salt,
            sequence: transaction.sequence,
            tx_id: *tx_id ^ self.salt,
        }
    }

    /// Insert `transaction`, or re-insert it for another attempt. Inserting a transaction that is already
    /// in the set has no effect.
    pub fn insert(&mut self, transaction: Transaction) -> CanonicalKey {
        let tx_id = transaction.id();
        let key = self.key(&transaction, &tx_id);
        self.transactions.entry(key).or_insert((tx_id, transaction));
        key
    }

    pub fn remove(&mut self, key: &CanonicalKey) -> Option<Transaction> {
        self.transactions.remove(key).map(|(_, transaction)| transaction)
    }

    pub fn get(&self, key: &CanonicalKey) -> Option<&Transaction> {
        self.transactions.get(key).map(|(_, transaction)| transaction)
    }

    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.transactions.contains_key(key)
    }

    /// Iterate through the transactions in canonical order, with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalKey, &TxID, &Transaction)> {
        self.transactions
            .iter()
            .map(|(key, (tx_id, transaction))| (key, tx_id, transaction))
    }

    /// Keys of every transaction in the set, in canonical order.
    pub fn keys(&self) -> Vec<CanonicalKey> {
        self.transactions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Consume the set, producing its transactions in canonical order.
    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
            .into_values()
            .map(|(_, transaction)| transaction)
            .collect()
    }
}

impl Extend<Transaction> for CanonicalTxSet {
    fn extend<I: IntoIterator<Item = Transaction>>(&mut self, iter: I) {
        for transaction in iter {
            self.insert(transaction);
        }
    }
}
