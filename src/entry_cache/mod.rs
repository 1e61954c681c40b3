/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Copy-on-write transactional view over a ledger's entries, used to apply transactions speculatively
//! and finally.
//!
//! The [`LedgerEntryCache`](implementation::LedgerEntryCache) is owned by exactly one execution context
//! at a time and is never shared across threads. Speculative application isolates itself by working on a
//! [duplicate](implementation::LedgerEntryCache::duplicate).

pub mod implementation;

pub mod metadata;

pub use implementation::{EntryAction, EntryHandle, LedgerEntryCache};
