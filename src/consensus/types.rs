/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types specific to the consensus state machine.

use std::fmt::{self, Display, Formatter};

/// Phase of one round. Phases only ever move forward, in the order they are declared, and a round never
/// revisits a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Accumulating transactions into the open ledger. Peer positions are collected but not weighed.
    Open,
    /// Exchanging positions until validators converge on a transaction set and close time.
    Establishing,
    /// Consensus was reached, and the agreed set is being applied.
    Finished,
    /// The round's ledger has been built. The round is retired.
    Accepted,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Open => "Open",
            Phase::Establishing => "Establishing",
            Phase::Finished => "Finished",
            Phase::Accepted => "Accepted",
        };
        write!(f, "{}", name)
    }
}

/// How this node takes part in a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Taking part in the round and broadcasting its positions.
    Proposing,
    /// Following the round without broadcasting positions, e.g., because this node is not a trusted
    /// validator.
    Observing,
    /// This node's previous ledger is not the one the network is building on. The node listens, but
    /// does not propose.
    WrongLedger,
    /// This node switched to the network's previous ledger in the middle of a round, and does not
    /// propose until the next round.
    SwitchedLedger,
}

impl Mode {
    pub fn is_proposing(&self) -> bool {
        *self == Mode::Proposing
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Proposing => "Proposing",
            Mode::Observing => "Observing",
            Mode::WrongLedger => "WrongLedger",
            Mode::SwitchedLedger => "SwitchedLedger",
        };
        write!(f, "{}", name)
    }
}
