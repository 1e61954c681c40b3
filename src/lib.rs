/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The agreement and state-transition core of a replicated ledger.
//!
//! Validators repeatedly agree on a set of transactions and a close time, apply the agreed set to the
//! previous ledger in a deterministic order, and sign the resulting ledger.
//!
//! The crate is made of two halves:
//! - The ledger state machinery: [ledger entries](ledger::entry) and [snapshots](ledger::snapshot), a
//!   copy-on-write [entry cache](entry_cache), [directories](directory), the [canonical
//!   order](canonical_set) of an agreed set, and the [transaction applier](applier).
//! - The agreement machinery: [transaction sets](tx_set), [peer positions](proposal_store), and the
//!   [consensus state machine](consensus), run by a [node](node).

pub mod types;

pub mod ledger;

pub mod entry_cache;

pub mod directory;

pub mod canonical_set;

pub mod applier;

pub mod tx_set;

pub mod proposal_store;

pub mod consensus;

pub mod networking;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;

pub mod node;
