/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transaction metadata: a record of every entry a transaction created, modified or deleted.
//!
//! ## Threading
//!
//! Every threaded entry (see [`LedgerEntryType::is_threaded`]) records the id and ledger of the last
//! transaction that touched it in its `PreviousTxnID` and `PreviousTxnLgrSeq` fields. Computing metadata
//! threads the transaction into:
//! 1. Each modified threaded entry,
//! 2. Each created threaded entry, and
//! 3. The account roots of the owners of each created or deleted entry.
//!
//! The values these fields held before are recorded in the [`AffectedNode`] of the threaded entry,
//! which links each transaction to the previous one in the entry's history.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    applier::result::TxResultCode,
    ledger::{
        entry::{Field, FieldValue, LedgerEntry, LedgerEntryType, MetaFlags},
        keys,
    },
    types::data_types::{AccountID, EntryKey, LedgerSequence, TxID},
};

use super::implementation::{CachedEntry, EntryAction, LedgerEntryCache};

#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum NodeAction {
    Created,
    Modified,
    Deleted,
}

/// How one transaction affected one entry.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AffectedNode {
    pub action: NodeAction,
    pub key: EntryKey,
    pub entry_type: LedgerEntryType,
    /// Original values of fields that changed.
    pub previous_fields: BTreeMap<Field, FieldValue>,
    /// Values of fields after a modification, or just before deletion.
    pub final_fields: BTreeMap<Field, FieldValue>,
    /// Non-default values of a created entry.
    pub new_fields: BTreeMap<Field, FieldValue>,
    /// The transaction that touched this entry before this one, if this transaction was threaded into it.
    pub previous_txn: Option<(TxID, LedgerSequence)>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RawMetadata {
    pub tx_id: TxID,
    pub ledger_seq: LedgerSequence,
    /// Position of the transaction in the ledger's apply order.
    pub tx_index: u32,
    pub result: TxResultCode,
    /// In ascending order of key.
    pub affected_nodes: Vec<AffectedNode>,
}

impl RawMetadata {
    pub fn affected_node(&self, key: &EntryKey) -> Option<&AffectedNode> {
        self.affected_nodes.iter().find(|node| node.key == *key)
    }
}

impl LedgerEntryCache {
    /// Compute the metadata of transaction `tx_id`, assuming every change recorded in this cache (relative
    /// to the cache it was duplicated from, or to the base ledger) was made by it.
    ///
    /// Threading modifies the entries it touches, so this must be called before the cache is committed.
    /// A missing owner account is logged and skipped; it does not stop metadata generation for the other
    /// entries.
    pub fn compute_metadata(
        &mut self,
        tx_id: TxID,
        result: TxResultCode,
        tx_index: u32,
    ) -> RawMetadata {
        // 1. Thread the transaction into the affected entries and their owners.
        let mut threads = BTreeMap::new();
        for (key, action) in self.affected_keys() {
            match action {
                NodeAction::Deleted => {
                    if let Some(original) = self.origin(&key) {
                        self.thread_owners(&original, tx_id, &mut threads);
                    }
                }
                NodeAction::Modified => {
                    if self.current(&key).entry_type().is_threaded() {
                        self.thread_entry(&key, tx_id, &mut threads);
                    }
                }
                NodeAction::Created => {
                    let current = self.current(&key);
                    self.thread_owners(&current, tx_id, &mut threads);
                    if current.entry_type().is_threaded() {
                        self.thread_entry(&key, tx_id, &mut threads);
                    }
                }
            }
        }

        // 2. Describe every affected entry, including the owners that threading has just modified.
        let affected_nodes = self
            .affected_keys()
            .into_iter()
            .map(|(key, action)| self.describe(key, action, threads.get(&key).copied()))
            .collect();

        RawMetadata {
            tx_id,
            ledger_seq: self.ledger_seq(),
            tx_index,
            result,
            affected_nodes,
        }
    }

    // Entries whose value differs from their origin, with how they differ.
    fn affected_keys(&self) -> Vec<(EntryKey, NodeAction)> {
        let mut affected = Vec::new();
        for (key, cached) in &self.entries {
            if cached.action == EntryAction::Cached {
                continue;
            }
            let live = cached.action != EntryAction::Deleted;
            match (live, self.origin(key)) {
                (true, None) => affected.push((*key, NodeAction::Created)),
                (true, Some(original)) if *original != *cached.entry => {
                    affected.push((*key, NodeAction::Modified))
                }
                (false, Some(_)) => affected.push((*key, NodeAction::Deleted)),
                _ => (),
            }
        }
        affected
    }

    // The value of the entry under `key` before this cache's changes.
    fn origin(&self, key: &EntryKey) -> Option<Arc<LedgerEntry>> {
        if let Some(baseline) = &self.baseline {
            if let Some(cached) = baseline.get(key) {
                return match cached.action {
                    EntryAction::Deleted => None,
                    _ => Some(cached.entry.clone()),
                };
            }
        }
        self.base().entry(key).cloned()
    }

    fn current(&self, key: &EntryKey) -> Arc<LedgerEntry> {
        match self.entries.get(key) {
            Some(cached) => cached.entry.clone(),
            None => panic!("metadata for entry {:?} which is not in the cache", key),
        }
    }

    fn thread_owners(
        &mut self,
        entry: &LedgerEntry,
        tx_id: TxID,
        threads: &mut BTreeMap<EntryKey, (TxID, LedgerSequence)>,
    ) {
        for owner in entry.owners() {
            self.thread_account(&owner, tx_id, threads);
        }
    }

    fn thread_account(
        &mut self,
        account: &AccountID,
        tx_id: TxID,
        threads: &mut BTreeMap<EntryKey, (TxID, LedgerSequence)>,
    ) {
        let key = keys::account_root(account);
        let generation = self.generation();

        // Make the account root modifiable, pulling it from the base ledger if needed.
        match self.entries.get_mut(&key) {
            Some(cached) if cached.action == EntryAction::Deleted => {
                log::error!("Threading to deleted account {:?}", account);
                return;
            }
            Some(cached) => {
                if cached.action == EntryAction::Cached {
                    cached.action = EntryAction::Modified;
                }
                cached.generation = generation;
            }
            None => match self.base().entry(&key).cloned() {
                Some(entry) => {
                    self.entries.insert(
                        key,
                        CachedEntry {
                            entry,
                            action: EntryAction::Modified,
                            generation,
                        },
                    );
                }
                None => {
                    log::error!("Threading to non-existent account {:?}", account);
                    return;
                }
            },
        }

        self.thread_entry(&key, tx_id, threads);
    }

    fn thread_entry(
        &mut self,
        key: &EntryKey,
        tx_id: TxID,
        threads: &mut BTreeMap<EntryKey, (TxID, LedgerSequence)>,
    ) {
        let ledger_seq = self.ledger_seq();
        if let Some(cached) = self.entries.get_mut(key) {
            if let Some(previous) = Arc::make_mut(&mut cached.entry).thread(tx_id, ledger_seq) {
                threads.entry(*key).or_insert(previous);
            }
        }
    }

    fn describe(
        &self,
        key: EntryKey,
        action: NodeAction,
        previous_txn: Option<(TxID, LedgerSequence)>,
    ) -> AffectedNode {
        let current = self.current(&key);
        let original = self.origin(&key);

        let mut node = AffectedNode {
            action,
            key,
            entry_type: current.entry_type(),
            previous_fields: BTreeMap::new(),
            final_fields: BTreeMap::new(),
            new_fields: BTreeMap::new(),
            previous_txn,
        };

        match action {
            NodeAction::Modified | NodeAction::Deleted => {
                if let Some(original) = &original {
                    for (field, value) in original.fields() {
                        if field.meta_flags().intersects(MetaFlags::CHANGE_ORIG)
                            && !current.has_matching_field(*field, value)
                        {
                            node.previous_fields.insert(*field, value.clone());
                        }
                    }
                }

                let final_mask = match action {
                    NodeAction::Deleted => MetaFlags::ALWAYS.union(MetaFlags::DELETE_FINAL),
                    _ => MetaFlags::ALWAYS.union(MetaFlags::CHANGE_NEW),
                };
                for (field, value) in current.fields() {
                    if field.meta_flags().intersects(final_mask) {
                        node.final_fields.insert(*field, value.clone());
                    }
                }
            }
            NodeAction::Created => {
                for (field, value) in current.fields() {
                    if !value.is_default()
                        && field
                            .meta_flags()
                            .intersects(MetaFlags::CREATE.union(MetaFlags::ALWAYS))
                    {
                        node.new_fields.insert(*field, value.clone());
                    }
                }
            }
        }

        node
    }
}
