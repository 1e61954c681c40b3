/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The consensus state machine and the policies it is parameterized by.
//!
//! Validators repeatedly agree on the next ledger in rounds. In each round, every validator proposes
//! the set of transactions it thinks the next ledger should apply, and validators converge by voting on
//! the transactions their positions disagree on (see [`disputes`]) and on the ledger's close time (see
//! [`close_time`]). A round concludes when a [quorum](quorum) of trusted power shares a position, at
//! which point the agreed set is applied to build the next ledger.
//!
//! The state machine lives in [`engine`]. The state of one round lives in [`round`].

pub mod close_time;

pub mod disputes;

pub mod engine;

pub mod params;

pub mod quorum;

pub mod round;

pub mod types;

pub mod validations;

pub(crate) mod worker;

pub use engine::{ConsensusEngine, ConsensusError};
pub use params::ConsensusParameters;
pub use quorum::{QuorumPolicy, ThresholdQuorum};
