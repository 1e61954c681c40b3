/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Proposals and the store of each peer's current position.
//!
//! A [`LedgerProposal`](messages::LedgerProposal) is created when a validator announces a position,
//! superseded by a newer proposal from the same validator, and discarded when the round it belongs to
//! concludes or when the validator moves on to a different previous ledger.

pub mod implementation;

pub mod messages;

pub use implementation::{Ingested, PeerPosition, ProposalRejection, ProposalStore};
pub use messages::LedgerProposal;
