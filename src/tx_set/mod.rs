/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transaction sets: the positions that validators propose and agree on.
//!
//! A position names a transaction set by its [hash](types::TxSet::hash). Peers that do not have a
//! proposed set acquire it node by node through the external [`NodeFetcher`](types::NodeFetcher)
//! collaborator, using an [`acquire::TxSetAcquirer`].

pub mod acquire;

pub mod types;

pub use types::{NodeFetcher, TxSet, TxSetError};
