/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Derivation of the keys under which entries are stored.

use crate::types::{
    crypto_primitives::{hash_prefix, prefixed_hash},
    data_types::{AccountID, EntryKey},
};

pub fn account_root(account: &AccountID) -> EntryKey {
    prefixed_hash(hash_prefix::ACCOUNT_ROOT, &[&account.bytes()])
}

/// Root page of the directory of entries owned by `account`.
pub fn owner_dir(account: &AccountID) -> EntryKey {
    prefixed_hash(hash_prefix::OWNER_DIR, &[&account.bytes()])
}

/// Page `page` of the directory rooted at `root`. Page 0 is the root page itself.
pub fn dir_node(root: &EntryKey, page: u64) -> EntryKey {
    if page == 0 {
        return *root;
    }
    prefixed_hash(hash_prefix::DIR_NODE, &[&root.bytes(), &page.to_be_bytes()])
}

pub fn offer(account: &AccountID, sequence: u32) -> EntryKey {
    prefixed_hash(hash_prefix::OFFER, &[&account.bytes(), &sequence.to_be_bytes()])
}

/// The trust line between `a` and `b`. Symmetric in its arguments.
pub fn trust_line(a: &AccountID, b: &AccountID) -> EntryKey {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    prefixed_hash(hash_prefix::TRUST_LINE, &[&low.bytes(), &high.bytes()])
}
