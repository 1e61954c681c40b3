/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Applying transactions to a [`LedgerEntryCache`](crate::entry_cache::LedgerEntryCache).
//!
//! [`apply_transaction`](implementation::apply_transaction) applies one transaction in isolation.
//! [`apply_canonical`](implementation::apply_canonical) applies a whole agreed set in canonical order,
//! retrying transactions that depend on others, and [`build_ledger`](implementation::build_ledger) turns
//! the result into the next [`Ledger`](crate::ledger::snapshot::Ledger).

pub mod implementation;

pub mod open_ledger;

pub mod result;

pub mod transactors;

pub use implementation::{apply_canonical, apply_transaction, build_ledger, ApplyReport};
