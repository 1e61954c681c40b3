/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Copy-on-write transactional view over a base ledger's entries.
//!
//! Main type: [`LedgerEntryCache`].

use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use crate::{
    ledger::{
        entry::{Field, LedgerEntry, LedgerEntryType},
        keys,
        snapshot::{Ledger, StateUpdates},
    },
    types::data_types::{AccountID, EntryKey, LedgerSequence},
};

/// What a cache has done with an entry.
///
/// ## Legal transitions
///
/// ```text
/// (absent) --cache--> Cached --modify--> Modified --delete--> Deleted
/// (absent) --create--> Created --modify--> Created --delete--> (absent)
/// Deleted --recreate--> Modified (or Created, if the base ledger lacks the entry)
/// ```
///
/// Additionally, `Cached` may be deleted directly, `delete` after `Deleted` is a no-op, and `cache` of an
/// entry that is already `Cached` refreshes it. Every other transition is a bug in the caller and panics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryAction {
    Cached,
    Created,
    Modified,
    Deleted,
}

/// Generation-stamped reference to an entry in a [`LedgerEntryCache`].
///
/// A handle is only valid in the generation of the cache that issued it. In particular, handles issued
/// by a cache cannot be used on its [duplicates](LedgerEntryCache::duplicate), and handles issued before
/// a duplicate was taken cannot be used to mutate an entry that the duplicate shares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHandle {
    key: EntryKey,
    generation: u32,
}

impl EntryHandle {
    pub fn key(&self) -> EntryKey {
        self.key
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Clone)]
pub(crate) struct CachedEntry {
    pub(crate) entry: Arc<LedgerEntry>,
    pub(crate) action: EntryAction,
    pub(crate) generation: u32,
}

/// An overlay over a base [`Ledger`] that records every entry read, created, modified or deleted while
/// applying transactions.
///
/// ## Copy-on-write
///
/// Entries are held behind `Arc`s that may be shared with the base ledger or with the cache this cache
/// was [duplicated](Self::duplicate) from. An entry is copied the first time it is mutated through a
/// handle of the current generation, so a value visible through another cache or ledger is never
/// changed.
pub struct LedgerEntryCache {
    base: Arc<Ledger>,
    ledger_seq: LedgerSequence,
    pub(crate) entries: BTreeMap<EntryKey, CachedEntry>,
    // The parent's entries at the time this cache was duplicated from it.
    pub(crate) baseline: Option<Arc<BTreeMap<EntryKey, CachedEntry>>>,
    generation: u32,
}

impl LedgerEntryCache {
    /// Create an empty cache over `base`. Transactions applied through it belong to the ledger that
    /// follows `base`.
    pub fn new(base: Arc<Ledger>) -> Self {
        let ledger_seq = base.seq() + 1;
        Self {
            base,
            ledger_seq,
            entries: BTreeMap::new(),
            baseline: None,
            generation: 0,
        }
    }

    pub fn base(&self) -> &Arc<Ledger> {
        &self.base
    }

    /// Sequence number of the ledger being built.
    pub fn ledger_seq(&self) -> LedgerSequence {
        self.ledger_seq
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of entries the cache has recorded, including `Cached` ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the entry recorded under `key`, if any, along with what the cache has done with it.
    ///
    /// Entries last touched in an older generation are re-stamped with the current one. The returned
    /// handle is valid until the next [`duplicate`](Self::duplicate).
    pub fn get(&mut self, key: &EntryKey) -> Option<(EntryHandle, EntryAction)> {
        let generation = self.generation;
        let cached = self.entries.get_mut(key)?;
        if cached.generation != generation {
            assert!(
                cached.generation < generation,
                "entry stamped with a future generation"
            );
            cached.generation = generation;
        }
        Some((
            EntryHandle {
                key: *key,
                generation,
            },
            cached.action,
        ))
    }

    /// Get a handle to the live entry of `entry_type` under `key`, reading it from the base ledger and
    /// recording it as `Cached` if the cache has not seen it yet.
    ///
    /// Returns `None` if there is no such entry, or if the cache has deleted it.
    pub fn load(&mut self, entry_type: LedgerEntryType, key: &EntryKey) -> Option<EntryHandle> {
        if let Some((handle, action)) = self.get(key) {
            if action == EntryAction::Deleted {
                return None;
            }
            if self.entry(&handle).entry_type() != entry_type {
                log::error!(
                    "Entry {} is a {:?}, expected a {:?}",
                    key,
                    self.entry(&handle).entry_type(),
                    entry_type
                );
                return None;
            }
            return Some(handle);
        }

        let entry = self.base.entry(key)?.clone();
        if entry.entry_type() != entry_type {
            log::error!(
                "Entry {} is a {:?}, expected a {:?}",
                key,
                entry.entry_type(),
                entry_type
            );
            return None;
        }
        Some(self.cache(entry))
    }

    /// Record `entry` as read.
    ///
    /// # Panics
    ///
    /// If the cache has already created, modified or deleted the entry.
    pub fn cache(&mut self, entry: Arc<LedgerEntry>) -> EntryHandle {
        let key = entry.key();
        let generation = self.generation;
        match self.entries.get_mut(&key) {
            None => {
                self.entries.insert(
                    key,
                    CachedEntry {
                        entry,
                        action: EntryAction::Cached,
                        generation,
                    },
                );
            }
            Some(cached) => match cached.action {
                EntryAction::Cached => {
                    cached.entry = entry;
                    cached.generation = generation;
                }
                action => panic!("cache of entry {:?} after {:?}", key, action),
            },
        }
        EntryHandle { key, generation }
    }

    /// Create a new, empty entry of `entry_type` under `key`.
    ///
    /// # Panics
    ///
    /// If `key` is zero, if the cache has already recorded an entry under `key`, or if the base ledger
    /// already holds one.
    pub fn create(&mut self, entry_type: LedgerEntryType, key: EntryKey) -> EntryHandle {
        assert!(!key.is_zero(), "create of an entry with a zero key");
        if let Some(cached) = self.entries.get(&key) {
            panic!("create of entry {:?} after {:?}", key, cached.action);
        }
        assert!(
            !self.base.contains(&key),
            "create of entry {:?} which exists in the base ledger",
            key
        );

        let generation = self.generation;
        self.entries.insert(
            key,
            CachedEntry {
                entry: Arc::new(LedgerEntry::new(entry_type, key)),
                action: EntryAction::Created,
                generation,
            },
        );
        EntryHandle { key, generation }
    }

    /// Replace an entry that this cache has deleted with a new, empty entry of `entry_type`.
    ///
    /// The entry becomes `Modified` if the base ledger holds it, and `Created` otherwise, so committing
    /// the cache overwrites the old entry instead of deleting it.
    ///
    /// # Panics
    ///
    /// If the cache has not deleted the entry under `key`.
    pub fn recreate(&mut self, entry_type: LedgerEntryType, key: EntryKey) -> EntryHandle {
        let action = if self.base.contains(&key) {
            EntryAction::Modified
        } else {
            EntryAction::Created
        };
        let generation = self.generation;
        match self.entries.get_mut(&key) {
            Some(cached) if cached.action == EntryAction::Deleted => {
                cached.entry = Arc::new(LedgerEntry::new(entry_type, key));
                cached.action = action;
                cached.generation = generation;
            }
            Some(cached) => panic!("recreate of entry {:?} after {:?}", key, cached.action),
            None => panic!("recreate of entry {:?} which is not in the cache", key),
        }
        EntryHandle { key, generation }
    }

    /// Whether this cache has deleted the entry under `key`.
    pub fn is_deleted(&self, key: &EntryKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|cached| cached.action == EntryAction::Deleted)
    }

    /// [`create`](Self::create) an entry under `key`, or [`recreate`](Self::recreate) it if this cache
    /// has deleted it.
    pub fn create_or_recreate(&mut self, entry_type: LedgerEntryType, key: EntryKey) -> EntryHandle {
        if self.is_deleted(&key) {
            self.recreate(entry_type, key)
        } else {
            self.create(entry_type, key)
        }
    }

    /// Mark the entry referred to by `handle` as modified.
    ///
    /// # Panics
    ///
    /// If the entry has been deleted, or if `handle` is stale.
    pub fn modify(&mut self, handle: &EntryHandle) {
        let cached = self.slot_mut(handle);
        match cached.action {
            EntryAction::Cached => cached.action = EntryAction::Modified,
            EntryAction::Created | EntryAction::Modified => (),
            EntryAction::Deleted => panic!("modify of entry {:?} after Deleted", handle.key),
        }
    }

    /// Mark the entry referred to by `handle` as deleted. Deleting an entry this cache created removes
    /// every trace of it, unless the entry existed when this cache was duplicated.
    ///
    /// # Panics
    ///
    /// If `handle` is stale.
    pub fn delete(&mut self, handle: &EntryHandle) {
        let in_baseline = self
            .baseline
            .as_ref()
            .and_then(|baseline| baseline.get(&handle.key))
            .is_some_and(|cached| cached.action != EntryAction::Deleted);

        match self.slot(handle).action {
            EntryAction::Cached | EntryAction::Modified => {
                self.slot_mut(handle).action = EntryAction::Deleted
            }
            EntryAction::Created if in_baseline => {
                self.slot_mut(handle).action = EntryAction::Deleted
            }
            EntryAction::Created => {
                self.entries.remove(&handle.key);
            }
            EntryAction::Deleted => (),
        }
    }

    /// Read the entry referred to by `handle`.
    ///
    /// # Panics
    ///
    /// If `handle` is stale, or if its entry was removed from the cache.
    pub fn entry(&self, handle: &EntryHandle) -> &LedgerEntry {
        &self.slot(handle).entry
    }

    /// Get a mutable reference to the entry referred to by `handle`, copying it first if it is shared.
    ///
    /// # Panics
    ///
    /// If the entry is not marked `Created` or `Modified`, or if `handle` is stale.
    pub fn entry_mut(&mut self, handle: &EntryHandle) -> &mut LedgerEntry {
        let cached = self.slot_mut(handle);
        match cached.action {
            EntryAction::Created | EntryAction::Modified => Arc::make_mut(&mut cached.entry),
            action => panic!(
                "mutation of entry {:?} which is {:?}, not Created or Modified",
                handle.key, action
            ),
        }
    }

    /// [`modify`](Self::modify) the entry referred to by `handle`, then mutate it with `f`.
    pub fn update<R>(&mut self, handle: &EntryHandle, f: impl FnOnce(&mut LedgerEntry) -> R) -> R {
        self.modify(handle);
        f(self.entry_mut(handle))
    }

    /// Read the current value of the entry under `key`, looking through to the base ledger, without
    /// recording anything.
    pub fn peek(&self, key: &EntryKey) -> Option<&LedgerEntry> {
        match self.entries.get(key) {
            Some(cached) if cached.action == EntryAction::Deleted => None,
            Some(cached) => Some(&cached.entry),
            None => self.base.entry(key).map(|entry| entry.as_ref()),
        }
    }

    /// Get the smallest key strictly greater than `after` that holds a live entry, taking entries this
    /// cache created or deleted into account.
    pub fn next_key(&self, after: &EntryKey) -> Option<EntryKey> {
        // 1. Find the next key in the base ledger which this cache has not deleted.
        let mut ledger_next = self.base.next_key(after);
        while let Some(key) = ledger_next {
            match self.entries.get(&key) {
                Some(cached) if cached.action == EntryAction::Deleted => {
                    ledger_next = self.base.next_key(&key)
                }
                _ => break,
            }
        }

        // 2. Find the next live key among the entries of this cache, and return the earlier one.
        let cache_next = self
            .entries
            .range((Bound::Excluded(*after), Bound::Unbounded))
            .find(|(_, cached)| cached.action != EntryAction::Deleted)
            .map(|(key, _)| *key);

        match (ledger_next, cache_next) {
            (Some(l), Some(c)) => Some(l.min(c)),
            (l, c) => l.or(c),
        }
    }

    /// Create an independent child view of this cache. The child shares every entry with this cache until
    /// it mutates it, and nothing the child does is visible through this cache.
    pub fn duplicate(&self) -> LedgerEntryCache {
        LedgerEntryCache {
            base: self.base.clone(),
            ledger_seq: self.ledger_seq,
            entries: self.entries.clone(),
            baseline: Some(Arc::new(self.entries.clone())),
            generation: self.generation + 1,
        }
    }

    pub fn increment_owner_count(&mut self, account: &AccountID) {
        let Some(handle) = self.load(LedgerEntryType::AccountRoot, &keys::account_root(account))
        else {
            log::error!("Owner count of missing account {:?}", account);
            return;
        };
        let current = self.entry(&handle).u32(Field::OwnerCount);
        if current == u32::MAX {
            log::error!("Account {:?} owner count exceeds max", account);
            return;
        }
        self.update(&handle, |entry| entry.set_u32(Field::OwnerCount, current + 1));
    }

    pub fn decrement_owner_count(&mut self, account: &AccountID) {
        let Some(handle) = self.load(LedgerEntryType::AccountRoot, &keys::account_root(account))
        else {
            log::error!("Owner count of missing account {:?}", account);
            return;
        };
        let current = self.entry(&handle).u32(Field::OwnerCount);
        if current == 0 {
            log::error!("Account {:?} owner count is already 0", account);
            return;
        }
        self.update(&handle, |entry| entry.set_u32(Field::OwnerCount, current - 1));
    }

    /// Consume the cache, producing the inserts and deletes that derive the next ledger from its base.
    pub fn into_updates(self) -> StateUpdates {
        let mut updates = StateUpdates::new();
        for (key, cached) in self.entries {
            match cached.action {
                EntryAction::Cached => (),
                EntryAction::Created | EntryAction::Modified => updates.insert(cached.entry),
                EntryAction::Deleted => updates.delete(key),
            }
        }
        updates
    }

    fn slot(&self, handle: &EntryHandle) -> &CachedEntry {
        assert_eq!(
            handle.generation, self.generation,
            "stale handle for entry {:?}",
            handle.key
        );
        match self.entries.get(&handle.key) {
            Some(cached) => cached,
            None => panic!("handle to entry {:?} which is not in the cache", handle.key),
        }
    }

    fn slot_mut(&mut self, handle: &EntryHandle) -> &mut CachedEntry {
        assert_eq!(
            handle.generation, self.generation,
            "stale handle for entry {:?}",
            handle.key
        );
        match self.entries.get_mut(&handle.key) {
            Some(cached) => cached,
            None => panic!("handle to entry {:?} which is not in the cache", handle.key),
        }
    }
}
