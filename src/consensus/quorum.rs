/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable quorum policy.
//!
//! A [`QuorumPolicy`] decides whether a given amount of support is enough to act on: to declare
//! consensus on a transaction set, to switch to the previous ledger a group of peers builds on, or to
//! consider a ledger fully validated.
//!
//! Support is always weighed against the whole trusted validator set, and never against the validators
//! that happened to respond. Silence therefore counts against quorum, and a partitioned minority cannot
//! declare consensus on its own.

use crate::types::{data_types::TotalPower, validator_set::ValidatorSet};

pub trait QuorumPolicy: Send {
    /// Decide whether `support`, the summed power of the validators backing some position, is a quorum of
    /// `validators`.
    fn accept(&self, support: TotalPower, validators: &ValidatorSet) -> bool;
}

/// The default [`QuorumPolicy`]: support must be at least `percent` percent of the total power of the
/// trusted validator set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThresholdQuorum {
    percent: u32,
}

impl ThresholdQuorum {
    pub fn new(percent: u32) -> Self {
        Self { percent }
    }

    pub fn percent(&self) -> u32 {
        self.percent
    }
}

impl QuorumPolicy for ThresholdQuorum {
    fn accept(&self, support: TotalPower, validators: &ValidatorSet) -> bool {
        let total_power = validators.total_power();
        if total_power.int() == 0 {
            return false;
        }
        support.int() * 100 >= self.percent as u128 * total_power.int()
    }
}
