/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The set of validators a node trusts, and their voting weights.
//!
//! A consensus round copies the trusted set when it starts and keeps that copy until it ends, so updates
//! made through [`Node::update_validator_set`](crate::node::Node::update_validator_set) only take effect
//! from the next round on.

use std::collections::{btree_map, BTreeMap, BTreeSet};

use super::data_types::{Power, TotalPower, VerifyingKeyBytes};

pub use ed25519_dalek::VerifyingKey;

/// Identities of trusted validators with their voting powers.
///
/// Validators are kept in ascending order of their verifying key bytes, so every node that trusts the
/// same set walks through it in the same order.
///
/// Users must make sure that the total power does not exceed `u128::MAX/100`, so that percentage
/// thresholds can be computed without overflow.
#[derive(Clone, Default, PartialEq)]
pub struct ValidatorSet {
    members: BTreeMap<VerifyingKeyBytes, (VerifyingKey, Power)>,
}

impl ValidatorSet {
    pub fn new() -> ValidatorSet {
        Self::default()
    }

    /// Trust `validator` with `power`, returning its previous power if it was already trusted.
    pub fn put(&mut self, validator: &VerifyingKey, power: Power) -> Option<Power> {
        self.members
            .insert(validator.to_bytes(), (*validator, power))
            .map(|(_, previous)| previous)
    }

    /// Stop trusting `validator`.
    pub fn remove(&mut self, validator: &VerifyingKey) -> Option<(VerifyingKey, Power)> {
        self.members.remove(&validator.to_bytes())
    }

    pub fn power(&self, validator: &VerifyingKey) -> Option<&Power> {
        self.members
            .get(&validator.to_bytes())
            .map(|(_, power)| power)
    }

    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.members.contains_key(&validator.to_bytes())
    }

    /// Sum of the powers of every trusted validator. Quorum thresholds are fractions of this.
    pub fn total_power(&self) -> TotalPower {
        let mut total_power = TotalPower::new(0);
        for (_, power) in self.members.values() {
            total_power += *power;
        }
        total_power
    }

    /// Sum of the powers of those of `validators` that are trusted. Untrusted keys weigh nothing, and a
    /// key listed twice is counted once.
    pub fn power_of<'a>(&self, validators: impl IntoIterator<Item = &'a VerifyingKey>) -> TotalPower {
        let counted: BTreeSet<VerifyingKeyBytes> =
            validators.into_iter().map(|validator| validator.to_bytes()).collect();
        let mut total_power = TotalPower::new(0);
        for key in counted {
            if let Some((_, power)) = self.members.get(&key) {
                total_power += *power;
            }
        }
        total_power
    }

    /// Trusted verifying keys, in ascending order of their bytes.
    pub fn validators(&self) -> Validators {
        Validators(self.members.values())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Iterator over the verifying keys in a [`ValidatorSet`].
pub struct Validators<'a>(btree_map::Values<'a, VerifyingKeyBytes, (VerifyingKey, Power)>);

impl<'a> Iterator for Validators<'a> {
    type Item = &'a VerifyingKey;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(validator, _)| validator)
    }
}
