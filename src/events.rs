/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Events that the consensus engine emits as it makes progress.
//!
//! An event indicates that the action it names has been completed. Users subscribe to events by
//! registering handlers with the `on_*` setters of [`NodeSpec`](crate::node::NodeSpec). Handlers run on
//! a dedicated event bus thread, so a slow handler never holds up consensus.

use std::{sync::mpsc::Sender, time::SystemTime};

use ed25519_dalek::VerifyingKey;

use crate::{
    consensus::{types::Mode, validations::Validation},
    ledger::accepted::AcceptedLedger,
    proposal_store::LedgerProposal,
    types::data_types::{CryptoHash, LedgerSequence, NetClockTime, RoundID, TxID},
};

pub enum Event {
    // Events that mark the progress of a round.
    StartRound(StartRoundEvent),
    CloseLedger(CloseLedgerEvent),
    ReachConsensus(ReachConsensusEvent),
    AcceptLedger(AcceptLedgerEvent),
    FullyValidateLedger(FullyValidateLedgerEvent),
    // Events that involve broadcasting a message.
    Propose(ProposeEvent),
    Validate(ValidateEvent),
    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveValidation(ReceiveValidationEvent),
    // Events about disputed transactions and transaction sets.
    CreateDispute(CreateDisputeEvent),
    UpdateDisputeVote(UpdateDisputeVoteEvent),
    AcquireTxSet(AcquireTxSetEvent),
    // Fork recovery events.
    WrongLedger(WrongLedgerEvent),
    SwitchLedger(SwitchLedgerEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // The event bus only goes away while the node is shutting down.
            let _ = event_publisher.send(event);
        }
    }
}

/// A round started, building on `prev_ledger` towards the ledger with sequence `ledger_seq`.
pub struct StartRoundEvent {
    pub timestamp: SystemTime,
    pub round: RoundID,
    pub prev_ledger: CryptoHash,
    pub ledger_seq: LedgerSequence,
    pub mode: Mode,
}

/// The open ledger closed, and its `tx_count` transactions became this node's initial position.
pub struct CloseLedgerEvent {
    pub timestamp: SystemTime,
    pub round: RoundID,
    pub prev_ledger: CryptoHash,
    pub tx_count: usize,
    pub close_time: NetClockTime,
}

/// A quorum agreed on `tx_set`, and the round moved on to building its ledger.
pub struct ReachConsensusEvent {
    pub timestamp: SystemTime,
    pub round: RoundID,
    pub tx_set: CryptoHash,
    pub close_time: NetClockTime,
    pub close_agree: bool,
}

/// The ledger a round agreed on was built and accepted as the last closed ledger.
pub struct AcceptLedgerEvent {
    pub timestamp: SystemTime,
    pub ledger: AcceptedLedger,
}

impl AcceptLedgerEvent {
    pub fn sequence(&self) -> LedgerSequence {
        self.ledger.ledger.seq()
    }

    pub fn hash(&self) -> CryptoHash {
        self.ledger.ledger.hash()
    }

    pub fn close_time(&self) -> NetClockTime {
        self.ledger.ledger.close_time()
    }

    pub fn applied_tx_count(&self) -> usize {
        self.ledger.applied_tx_count()
    }
}

/// Validations from a quorum of trusted validators name the same ledger.
pub struct FullyValidateLedgerEvent {
    pub timestamp: SystemTime,
    pub ledger_seq: LedgerSequence,
    pub ledger_hash: CryptoHash,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: LedgerProposal,
}

pub struct ValidateEvent {
    pub timestamp: SystemTime,
    pub validation: Validation,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub proposal: LedgerProposal,
}

pub struct ReceiveValidationEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub validation: Validation,
}

pub struct CreateDisputeEvent {
    pub timestamp: SystemTime,
    pub tx_id: TxID,
    pub our_vote: bool,
}

pub struct UpdateDisputeVoteEvent {
    pub timestamp: SystemTime,
    pub tx_id: TxID,
    pub our_vote: bool,
}

pub struct AcquireTxSetEvent {
    pub timestamp: SystemTime,
    pub tx_set: CryptoHash,
}

/// A weightier group of trusted validators builds on `network_ledger` rather than on `our_ledger`.
pub struct WrongLedgerEvent {
    pub timestamp: SystemTime,
    pub our_ledger: CryptoHash,
    pub network_ledger: CryptoHash,
}

/// The node abandoned its round and now builds on `to`.
pub struct SwitchLedgerEvent {
    pub timestamp: SystemTime,
    pub from: CryptoHash,
    pub to: CryptoHash,
    pub ledger_seq: LedgerSequence,
}
