/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Immutable ledger snapshots.
//!
//! A [`Ledger`] is never mutated in place. The next ledger is always [derived](Ledger::derive) from its
//! parent by applying [`StateUpdates`], which share every untouched entry with the parent.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    collections::{btree_map, BTreeMap, BTreeSet},
    io,
    ops::Bound,
    sync::Arc,
};

use crate::{
    entry_cache::metadata::RawMetadata,
    types::{
        crypto_primitives::{hash_prefix, prefixed_hash, CryptoHasher, Digest},
        data_types::{CloseResolution, CryptoHash, EntryKey, LedgerSequence, NetClockTime},
        transaction::Transaction,
    },
};

use super::entry::LedgerEntry;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LedgerHeader {
    pub seq: LedgerSequence,
    pub parent_hash: CryptoHash,
    pub close_time: NetClockTime,
    pub parent_close_time: NetClockTime,
    pub close_resolution: CloseResolution,
    /// Whether the validators agreed on `close_time`. If not, `close_time` is `parent_close_time + 1`.
    pub close_agree: bool,
    pub state_root: CryptoHash,
    pub tx_root: CryptoHash,
}

impl LedgerHeader {
    pub fn hash(&self) -> CryptoHash {
        prefixed_hash(hash_prefix::LEDGER_HEADER, &[&self.try_to_vec().unwrap()])
    }
}

/// A transaction included in a ledger, with the metadata produced by applying it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AppliedTransaction {
    pub transaction: Transaction,
    pub metadata: RawMetadata,
}

/// Entries inserted (or overwritten) and deleted by a batch of transactions.
#[derive(Clone, Default)]
pub struct StateUpdates {
    inserts: BTreeMap<EntryKey, Arc<LedgerEntry>>,
    deletes: BTreeSet<EntryKey>,
}

impl StateUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: Arc<LedgerEntry>) {
        let key = entry.key();
        self.deletes.remove(&key);
        self.inserts.insert(key, entry);
    }

    pub fn delete(&mut self, key: EntryKey) {
        self.inserts.remove(&key);
        self.deletes.insert(key);
    }

    pub fn inserts(&self) -> btree_map::Iter<EntryKey, Arc<LedgerEntry>> {
        self.inserts.iter()
    }

    pub fn deletes(&self) -> impl Iterator<Item = &EntryKey> {
        self.deletes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// Immutable snapshot of global state at a given sequence number.
#[derive(Clone, Debug)]
pub struct Ledger {
    header: LedgerHeader,
    hash: CryptoHash,
    state: Arc<BTreeMap<EntryKey, Arc<LedgerEntry>>>,
    transactions: Arc<Vec<AppliedTransaction>>,
}

impl Ledger {
    /// Create the first ledger of a chain, holding `entries`.
    pub fn genesis(
        entries: impl IntoIterator<Item = LedgerEntry>,
        close_time: NetClockTime,
        close_resolution: CloseResolution,
    ) -> Ledger {
        let state: BTreeMap<EntryKey, Arc<LedgerEntry>> = entries
            .into_iter()
            .map(|entry| (entry.key(), Arc::new(entry)))
            .collect();
        let header = LedgerHeader {
            seq: LedgerSequence::new(1),
            parent_hash: CryptoHash::zero(),
            close_time,
            parent_close_time: NetClockTime::new(0),
            close_resolution,
            close_agree: true,
            state_root: state_root(&state),
            tx_root: tx_root(&[]),
        };
        Ledger::from_parts(header, state, Vec::new())
    }

    /// Derive the child of `parent` by applying `updates`.
    pub fn derive(
        parent: &Ledger,
        updates: StateUpdates,
        transactions: Vec<AppliedTransaction>,
        close_time: NetClockTime,
        close_resolution: CloseResolution,
        close_agree: bool,
    ) -> Ledger {
        let mut state = (*parent.state).clone();
        for key in updates.deletes {
            state.remove(&key);
        }
        for (key, entry) in updates.inserts {
            state.insert(key, entry);
        }

        let header = LedgerHeader {
            seq: parent.seq() + 1,
            parent_hash: parent.hash(),
            close_time,
            parent_close_time: parent.close_time(),
            close_resolution,
            close_agree,
            state_root: state_root(&state),
            tx_root: tx_root(&transactions),
        };
        Ledger::from_parts(header, state, transactions)
    }

    fn from_parts(
        header: LedgerHeader,
        state: BTreeMap<EntryKey, Arc<LedgerEntry>>,
        transactions: Vec<AppliedTransaction>,
    ) -> Ledger {
        Ledger {
            hash: header.hash(),
            header,
            state: Arc::new(state),
            transactions: Arc::new(transactions),
        }
    }

    pub fn header(&self) -> &LedgerHeader {
        &self.header
    }

    pub fn hash(&self) -> CryptoHash {
        self.hash
    }

    pub fn seq(&self) -> LedgerSequence {
        self.header.seq
    }

    pub fn parent_hash(&self) -> CryptoHash {
        self.header.parent_hash
    }

    pub fn close_time(&self) -> NetClockTime {
        self.header.close_time
    }

    pub fn close_resolution(&self) -> CloseResolution {
        self.header.close_resolution
    }

    pub fn close_agree(&self) -> bool {
        self.header.close_agree
    }

    pub fn entry(&self, key: &EntryKey) -> Option<&Arc<LedgerEntry>> {
        self.state.get(key)
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        self.state.contains_key(key)
    }

    /// Get the smallest key strictly greater than `after`.
    pub fn next_key(&self, after: &EntryKey) -> Option<EntryKey> {
        self.state
            .range((Bound::Excluded(*after), Bound::Unbounded))
            .next()
            .map(|(key, _)| *key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<LedgerEntry>> {
        self.state.values()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn transactions(&self) -> &[AppliedTransaction] {
        &self.transactions
    }

    /// Serialize the full ledger (header, state and transactions) for storage in the node store.
    pub fn to_bytes(&self) -> Vec<u8> {
        LedgerBytes {
            header: self.header.clone(),
            entries: self.state.values().map(|e| (**e).clone()).collect(),
            transactions: (*self.transactions).clone(),
        }
        .try_to_vec()
        .unwrap()
    }

    /// Deserialize a ledger produced by [`to_bytes`](Self::to_bytes), checking that its contents match
    /// its header and that its header hashes to `expected_hash`.
    pub fn from_bytes(bytes: &[u8], expected_hash: &CryptoHash) -> Result<Ledger, LedgerDecodeError> {
        let ledger_bytes = LedgerBytes::try_from_slice(bytes)?;
        let state: BTreeMap<EntryKey, Arc<LedgerEntry>> = ledger_bytes
            .entries
            .into_iter()
            .map(|entry| (entry.key(), Arc::new(entry)))
            .collect();

        if state_root(&state) != ledger_bytes.header.state_root
            || tx_root(&ledger_bytes.transactions) != ledger_bytes.header.tx_root
            || ledger_bytes.header.hash() != *expected_hash
        {
            return Err(LedgerDecodeError::HashMismatch);
        }

        Ok(Ledger::from_parts(
            ledger_bytes.header,
            state,
            ledger_bytes.transactions,
        ))
    }
}

#[derive(BorshSerialize, BorshDeserialize)]
struct LedgerBytes {
    header: LedgerHeader,
    entries: Vec<LedgerEntry>,
    transactions: Vec<AppliedTransaction>,
}

// A flat digest over every (key, entry) pair in key order.
fn state_root(state: &BTreeMap<EntryKey, Arc<LedgerEntry>>) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update(hash_prefix::STATE_ROOT);
    for (key, entry) in state {
        hasher.update(key.bytes());
        hasher.update(entry.try_to_vec().unwrap());
    }
    CryptoHash::new(hasher.finalize().into())
}

fn tx_root(transactions: &[AppliedTransaction]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update(hash_prefix::TX_SET);
    for applied in transactions {
        hasher.update(applied.try_to_vec().unwrap());
    }
    CryptoHash::new(hasher.finalize().into())
}

#[derive(Debug)]
pub enum LedgerDecodeError {
    Deserialize(io::Error),
    HashMismatch,
}

impl From<io::Error> for LedgerDecodeError {
    fn from(value: io::Error) -> Self {
        LedgerDecodeError::Deserialize(value)
    }
}
