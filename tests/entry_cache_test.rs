//! Tests for the copy-on-write entry cache: action transitions, duplicates, and key iteration.

mod common;

use std::sync::Arc;

use ledger_consensus::{
    entry_cache::{EntryAction, LedgerEntryCache},
    ledger::{
        entry::{Field, LedgerEntryType},
        keys,
    },
};

use crate::common::fixtures::{account, genesis, STARTING_BALANCE};

#[test]
fn loading_and_modifying_an_entry_test() {
    let alice = account(1);
    let base = Arc::new(genesis(&[alice]));
    let mut cache = LedgerEntryCache::new(base.clone());

    let handle = cache
        .load(LedgerEntryType::AccountRoot, &keys::account_root(&alice))
        .unwrap();
    assert_eq!(cache.get(&handle.key()).unwrap().1, EntryAction::Cached);

    cache.update(&handle, |entry| entry.set_amount(Field::Balance, 5));
    assert_eq!(cache.get(&handle.key()).unwrap().1, EntryAction::Modified);
    assert_eq!(cache.entry(&handle).amount(Field::Balance), 5);

    // The base ledger is never changed.
    assert_eq!(
        base.entry(&handle.key()).unwrap().amount(Field::Balance),
        STARTING_BALANCE
    );

    let updates = cache.into_updates();
    assert_eq!(updates.inserts().count(), 1);
    assert_eq!(updates.deletes().count(), 0);
}

#[test]
fn loading_with_the_wrong_type_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    assert!(cache
        .load(LedgerEntryType::Offer, &keys::account_root(&alice))
        .is_none());
}

#[test]
fn deleting_a_created_entry_leaves_no_trace_test() {
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[account(1)])));
    let key = keys::account_root(&account(2));

    let handle = cache.create(LedgerEntryType::AccountRoot, key);
    cache.update(&handle, |entry| entry.set_amount(Field::Balance, 1));
    assert_eq!(cache.get(&key).unwrap().1, EntryAction::Created);

    cache.delete(&handle);
    assert!(cache.get(&key).is_none());
    assert!(cache.into_updates().is_empty());
}

#[test]
fn deleting_a_loaded_entry_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let key = keys::account_root(&alice);

    let handle = cache.load(LedgerEntryType::AccountRoot, &key).unwrap();
    cache.delete(&handle);
    assert_eq!(cache.get(&key).unwrap().1, EntryAction::Deleted);
    assert!(cache.peek(&key).is_none());
    assert!(cache.load(LedgerEntryType::AccountRoot, &key).is_none());

    // Deleting again changes nothing.
    let (handle, _) = cache.get(&key).unwrap();
    cache.delete(&handle);

    let updates = cache.into_updates();
    assert_eq!(updates.deletes().copied().collect::<Vec<_>>(), vec![key]);
}

#[test]
#[should_panic]
fn creating_a_deleted_entry_panics_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let key = keys::account_root(&alice);

    let handle = cache.load(LedgerEntryType::AccountRoot, &key).unwrap();
    cache.delete(&handle);
    cache.create(LedgerEntryType::AccountRoot, key);
}

#[test]
#[should_panic]
fn creating_an_entry_in_the_base_ledger_panics_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    cache.create(LedgerEntryType::AccountRoot, keys::account_root(&alice));
}

#[test]
#[should_panic]
fn mutating_a_cached_entry_panics_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let handle = cache
        .load(LedgerEntryType::AccountRoot, &keys::account_root(&alice))
        .unwrap();
    cache.entry_mut(&handle);
}

#[test]
#[should_panic]
fn modifying_a_deleted_entry_panics_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let handle = cache
        .load(LedgerEntryType::AccountRoot, &keys::account_root(&alice))
        .unwrap();

    cache.delete(&handle);
    cache.modify(&handle);
}

#[test]
#[should_panic]
fn creating_a_modified_entry_panics_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let key = keys::account_root(&alice);
    let handle = cache.load(LedgerEntryType::AccountRoot, &key).unwrap();

    cache.update(&handle, |entry| entry.set_amount(Field::Balance, 1));
    cache.create(LedgerEntryType::AccountRoot, key);
}

#[test]
#[should_panic]
fn creating_an_entry_twice_panics_test() {
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[account(1)])));
    let key = keys::account_root(&account(2));

    cache.create(LedgerEntryType::AccountRoot, key);
    cache.create(LedgerEntryType::AccountRoot, key);
}

#[test]
#[should_panic]
fn caching_a_modified_entry_panics_test() {
    let alice = account(1);
    let base = Arc::new(genesis(&[alice]));
    let mut cache = LedgerEntryCache::new(base.clone());
    let key = keys::account_root(&alice);
    let handle = cache.load(LedgerEntryType::AccountRoot, &key).unwrap();

    cache.update(&handle, |entry| entry.set_amount(Field::Balance, 1));
    cache.cache(base.entry(&key).unwrap().clone());
}

#[test]
fn deleting_twice_changes_nothing_test() {
    let alice = account(1);
    let mut parent = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let loaded = keys::account_root(&alice);
    let created = keys::account_root(&account(2));
    parent.load(LedgerEntryType::AccountRoot, &loaded).unwrap();
    parent.create(LedgerEntryType::AccountRoot, created);

    let mut child = parent.duplicate();
    for key in [loaded, created] {
        let (handle, _) = child.get(&key).unwrap();
        child.delete(&handle);
        child.delete(&handle);
        assert_eq!(child.get(&key).unwrap().1, EntryAction::Deleted);
        assert!(child.peek(&key).is_none());
    }

    let updates = child.into_updates();
    assert_eq!(updates.inserts().count(), 0);
    assert_eq!(updates.deletes().copied().collect::<Vec<_>>(), {
        let mut expected = vec![loaded, created];
        expected.sort();
        expected
    });
}

#[test]
fn recreating_a_deleted_entry_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let key = keys::account_root(&alice);

    let handle = cache.load(LedgerEntryType::AccountRoot, &key).unwrap();
    cache.delete(&handle);

    // 1. The entry comes back empty, and overwrites the one in the base ledger.
    let handle = cache.create_or_recreate(LedgerEntryType::AccountRoot, key);
    assert_eq!(cache.get(&key).unwrap().1, EntryAction::Modified);
    assert_eq!(cache.entry(&handle).amount(Field::Balance), 0);
    cache.update(&handle, |entry| entry.set_amount(Field::Balance, 7));
    assert_eq!(cache.peek(&key).unwrap().amount(Field::Balance), 7);

    // 2. An entry missing from the base ledger comes back as created.
    let other = keys::account_root(&account(2));
    let created = cache.create_or_recreate(LedgerEntryType::AccountRoot, other);
    assert_eq!(cache.get(&other).unwrap().1, EntryAction::Created);
    cache.delete(&created);
    assert!(cache.get(&other).is_none());

    let updates = cache.into_updates();
    assert_eq!(updates.inserts().count(), 1);
    assert_eq!(updates.deletes().count(), 0);
}

#[test]
#[should_panic]
fn recreating_a_live_entry_panics_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let key = keys::account_root(&alice);

    cache.load(LedgerEntryType::AccountRoot, &key).unwrap();
    cache.recreate(LedgerEntryType::AccountRoot, key);
}

#[test]
fn duplicates_are_isolated_from_each_other_test() {
    let alice = account(1);
    let mut parent = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let key = keys::account_root(&alice);

    let handle = parent.load(LedgerEntryType::AccountRoot, &key).unwrap();
    parent.update(&handle, |entry| entry.set_amount(Field::Balance, 10));

    // 1. The child sees the parent's changes.
    let mut child = parent.duplicate();
    assert_eq!(child.generation(), parent.generation() + 1);
    let (child_handle, action) = child.get(&key).unwrap();
    assert_eq!(action, EntryAction::Modified);
    assert_eq!(child.entry(&child_handle).amount(Field::Balance), 10);

    // 2. The parent does not see the child's changes.
    child.update(&child_handle, |entry| entry.set_amount(Field::Balance, 20));
    assert_eq!(child.entry(&child_handle).amount(Field::Balance), 20);
    assert_eq!(parent.peek(&key).unwrap().amount(Field::Balance), 10);

    // 3. Nor does the child see the parent's later changes.
    let (parent_handle, _) = parent.get(&key).unwrap();
    parent.update(&parent_handle, |entry| entry.set_amount(Field::Balance, 30));
    assert_eq!(child.peek(&key).unwrap().amount(Field::Balance), 20);
}

#[test]
fn deleting_in_a_duplicate_an_entry_created_before_it_test() {
    let mut parent = LedgerEntryCache::new(Arc::new(genesis(&[account(1)])));
    let key = keys::account_root(&account(2));
    parent.create(LedgerEntryType::AccountRoot, key);

    let mut child = parent.duplicate();
    let (handle, _) = child.get(&key).unwrap();
    child.delete(&handle);

    // The entry existed when the child was duplicated, so the deletion is recorded.
    assert_eq!(child.get(&key).unwrap().1, EntryAction::Deleted);
    assert_eq!(parent.get(&key).unwrap().1, EntryAction::Created);
}

#[test]
#[should_panic]
fn using_a_handle_from_before_a_duplicate_panics_test() {
    let alice = account(1);
    let mut parent = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let handle = parent
        .load(LedgerEntryType::AccountRoot, &keys::account_root(&alice))
        .unwrap();

    let mut child = parent.duplicate();
    child.modify(&handle);
}

#[test]
fn next_key_merges_the_cache_and_the_base_ledger_test() {
    let accounts = [account(1), account(2), account(3)];
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&accounts)));

    let mut base_keys: Vec<_> = accounts.iter().map(keys::account_root).collect();
    base_keys.sort();

    // 1. Delete the middle entry of the base ledger, and create a new one.
    let handle = cache
        .load(LedgerEntryType::AccountRoot, &base_keys[1])
        .unwrap();
    cache.delete(&handle);
    let created = keys::account_root(&account(4));
    cache.create(LedgerEntryType::AccountRoot, created);

    // 2. Walk every live key.
    let mut expected = vec![base_keys[0], base_keys[2], created];
    expected.sort();
    let mut walked = Vec::new();
    let mut cursor = Default::default();
    while let Some(key) = cache.next_key(&cursor) {
        walked.push(key);
        cursor = key;
    }
    assert_eq!(walked, expected);
}

#[test]
fn owner_count_test() {
    let alice = account(1);
    let mut cache = LedgerEntryCache::new(Arc::new(genesis(&[alice])));
    let key = keys::account_root(&alice);

    cache.increment_owner_count(&alice);
    cache.increment_owner_count(&alice);
    cache.decrement_owner_count(&alice);
    assert_eq!(cache.peek(&key).unwrap().u32(Field::OwnerCount), 1);

    // Decrementing below zero is logged and ignored.
    cache.decrement_owner_count(&alice);
    cache.decrement_owner_count(&alice);
    assert_eq!(cache.peek(&key).unwrap().u32(Field::OwnerCount), 0);
}
