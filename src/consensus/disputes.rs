/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Disputed transactions: transactions that some, but not all, positions in a round include.

use std::collections::HashMap;

use ed25519_dalek::VerifyingKey;

use crate::types::{
    data_types::{Power, TotalPower, TxID},
    transaction::Transaction,
};

/// A transaction that is in some positions and not in others, with the vote of each peer and this node
/// on whether to include it.
#[derive(Clone, Debug)]
pub struct DisputedTx {
    tx_id: TxID,
    transaction: Transaction,
    our_vote: bool,
    votes: HashMap<VerifyingKey, (bool, Power)>,
}

impl DisputedTx {
    pub fn new(transaction: Transaction, our_vote: bool) -> Self {
        Self {
            tx_id: transaction.id(),
            transaction,
            our_vote,
            votes: HashMap::new(),
        }
    }

    pub fn tx_id(&self) -> TxID {
        self.tx_id
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Whether this node's position includes the transaction.
    pub fn our_vote(&self) -> bool {
        self.our_vote
    }

    /// Record that `peer`, with voting `power`, does (`votes_yes`) or does not include the transaction.
    /// Returns whether the peer's vote changed.
    pub fn set_vote(&mut self, peer: VerifyingKey, votes_yes: bool, power: Power) -> bool {
        match self.votes.insert(peer, (votes_yes, power)) {
            Some((previous, _)) => previous != votes_yes,
            None => true,
        }
    }

    /// Forget `peer`'s vote, e.g., because its position went stale.
    pub fn unvote(&mut self, peer: &VerifyingKey) {
        self.votes.remove(peer);
    }

    /// Total power of the peers that include the transaction.
    pub fn yays(&self) -> TotalPower {
        self.tally(true)
    }

    /// Total power of the peers that do not include the transaction.
    pub fn nays(&self) -> TotalPower {
        self.tally(false)
    }

    fn tally(&self, side: bool) -> TotalPower {
        let mut total = TotalPower::new(0);
        for (vote, power) in self.votes.values() {
            if *vote == side {
                total += *power;
            }
        }
        total
    }

    /// Reconsider this node's vote. Returns whether it changed.
    ///
    /// A proposing node, with voting power `our_power`, votes to include the transaction if the
    /// percentage of power (its own included) that includes it exceeds `threshold_percent`. A node that
    /// is not proposing simply follows the majority of its peers.
    pub fn update_vote(&mut self, threshold_percent: u32, proposing: bool, our_power: Power) -> bool {
        let yays = self.yays().int();
        let nays = self.nays().int();

        // Everyone agrees with us.
        if (self.our_vote && nays == 0) || (!self.our_vote && yays == 0) {
            return false;
        }

        let new_vote = if proposing {
            let our_power = our_power.int().max(1) as u128;
            let our_weight = if self.our_vote { our_power * 100 } else { 0 };
            let weight = (yays * 100 + our_weight) / (yays + nays + our_power);
            weight > threshold_percent as u128
        } else {
            yays > nays
        };

        if new_vote == self.our_vote {
            return false;
        }

        log::debug!(
            "Vote on disputed transaction {} changes to {} (yays {}, nays {})",
            self.tx_id,
            if new_vote { "yes" } else { "no" },
            yays,
            nays
        );
        self.our_vote = new_vote;
        true
    }
}
