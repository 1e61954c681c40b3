/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transaction sets, their node encoding, and the node-fetch collaborator they are synchronized through.
//!
//! ## Node encoding
//!
//! A transaction set is stored and exchanged as nodes keyed by hash:
//! - The **root node** is the Borsh encoding of the ascending list of the set's transaction ids, and is
//!   keyed by the set's hash, which is computed over that same encoding.
//! - Each **leaf node** is the Borsh encoding of one transaction, keyed by its transaction id.
//!
//! Every node can therefore be checked against the key it was requested by.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{collections::BTreeMap, io};

use crate::types::{
    crypto_primitives::{hash_prefix, prefixed_hash},
    data_types::{CryptoHash, TxID},
    transaction::Transaction,
};

/// Pulls serialized nodes (of transaction sets, and of ledgers) from peers or a local store, and takes in
/// nodes for others to pull.
///
/// ## Non-blocking
///
/// [`have`](Self::have) must return immediately. If the node is not available yet, it returns `None`,
/// and the implementation is expected to start fetching it so that a later call succeeds. Consensus
/// treats the node as pending until then.
pub trait NodeFetcher: Send {
    /// Get the node keyed by `hash`, if it is available right now.
    fn have(&mut self, hash: &CryptoHash) -> Option<Vec<u8>>;

    /// Store the node keyed by `hash`.
    fn got(&mut self, hash: CryptoHash, bytes: Vec<u8>);
}

/// A set of transactions, identified by the hash of its root node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxSet {
    hash: CryptoHash,
    transactions: BTreeMap<TxID, Transaction>,
}

impl TxSet {
    pub fn new(transactions: impl IntoIterator<Item = Transaction>) -> TxSet {
        let transactions: BTreeMap<TxID, Transaction> = transactions
            .into_iter()
            .map(|transaction| (transaction.id(), transaction))
            .collect();
        TxSet::from_map(transactions)
    }

    pub fn empty() -> TxSet {
        TxSet::from_map(BTreeMap::new())
    }

    fn from_map(transactions: BTreeMap<TxID, Transaction>) -> TxSet {
        let ids: Vec<TxID> = transactions.keys().copied().collect();
        TxSet {
            hash: set_hash(&ids.try_to_vec().unwrap()),
            transactions,
        }
    }

    pub fn hash(&self) -> CryptoHash {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn contains(&self, tx_id: &TxID) -> bool {
        self.transactions.contains_key(tx_id)
    }

    pub fn get(&self, tx_id: &TxID) -> Option<&Transaction> {
        self.transactions.get(tx_id)
    }

    /// Iterate through the transactions of this set in ascending order of id.
    pub fn iter(&self) -> impl Iterator<Item = (&TxID, &Transaction)> {
        self.transactions.iter()
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// Create a copy of this set with `transaction` added.
    pub fn with(&self, transaction: Transaction) -> TxSet {
        let mut transactions = self.transactions.clone();
        transactions.insert(transaction.id(), transaction);
        TxSet::from_map(transactions)
    }

    /// Create a copy of this set with the transaction `tx_id` removed.
    pub fn without(&self, tx_id: &TxID) -> TxSet {
        let mut transactions = self.transactions.clone();
        transactions.remove(tx_id);
        TxSet::from_map(transactions)
    }

    /// Get the transactions that are in exactly one of `self` and `other`, each with whether it is in
    /// `self`.
    pub fn difference(&self, other: &TxSet) -> BTreeMap<TxID, (Transaction, bool)> {
        let mut difference = BTreeMap::new();
        for (tx_id, transaction) in &self.transactions {
            if !other.contains(tx_id) {
                difference.insert(*tx_id, (transaction.clone(), true));
            }
        }
        for (tx_id, transaction) in &other.transactions {
            if !self.contains(tx_id) {
                difference.insert(*tx_id, (transaction.clone(), false));
            }
        }
        difference
    }

    pub fn root_node(&self) -> Vec<u8> {
        let ids: Vec<TxID> = self.transactions.keys().copied().collect();
        ids.try_to_vec().unwrap()
    }

    /// Get every node of this set, keyed by hash: the root node first, then the leaves.
    pub fn nodes(&self) -> Vec<(CryptoHash, Vec<u8>)> {
        let mut nodes = Vec::with_capacity(self.transactions.len() + 1);
        nodes.push((self.hash, self.root_node()));
        for (tx_id, transaction) in &self.transactions {
            nodes.push((*tx_id, transaction.to_bytes()));
        }
        nodes
    }

    /// Decode the root node of the set `expected_hash` into the ids of its transactions.
    pub fn decode_root(bytes: &[u8], expected_hash: &CryptoHash) -> Result<Vec<TxID>, TxSetError> {
        if set_hash(bytes) != *expected_hash {
            return Err(TxSetError::HashMismatch);
        }
        Ok(Vec::<TxID>::try_from_slice(bytes)?)
    }

    /// Decode the leaf node of the transaction `expected_id`.
    pub fn decode_leaf(bytes: &[u8], expected_id: &TxID) -> Result<Transaction, TxSetError> {
        let transaction = Transaction::from_bytes(bytes)?;
        if transaction.id() != *expected_id {
            return Err(TxSetError::HashMismatch);
        }
        Ok(transaction)
    }
}

fn set_hash(root_node: &[u8]) -> CryptoHash {
    prefixed_hash(hash_prefix::TX_SET, &[root_node])
}

#[derive(Debug)]
pub enum TxSetError {
    Deserialize(io::Error),
    /// A node does not hash to the key it was requested by.
    HashMismatch,
}

impl From<io::Error> for TxSetError {
    fn from(value: io::Error) -> Self {
        TxSetError::Deserialize(value)
    }
}
