/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Default handlers that print each [event](crate::events) as one line of CSV.
//!
//! These handlers are registered when [`Configuration::log_events`](crate::node::Configuration) is set.
//! They print through the [log](https://docs.rs/log/latest/log/) facade at `info` level, so nothing
//! appears unless the embedding program installs a logger.
//!
//! ## Line format
//!
//! Every line starts with the event's name (one of the constants below) and the number of seconds
//! between the Unix Epoch and the moment the event was published. Event-specific fields follow. Hashes
//! and keys are shortened to the first seven characters of their Base64 encoding. For example, an
//! [AcceptLedger](crate::events::AcceptLedgerEvent) line carries the ledger hash, its sequence, its close
//! time and the number of transactions it applied:
//!
//! ```text
//! AcceptLedger, 1701329264, fNGCJyk, 12, 760000020, 3
//! ```

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

use crate::events::*;

pub const START_ROUND: &str = "StartRound";
pub const CLOSE_LEDGER: &str = "CloseLedger";
pub const REACH_CONSENSUS: &str = "ReachConsensus";
pub const ACCEPT_LEDGER: &str = "AcceptLedger";
pub const FULLY_VALIDATE_LEDGER: &str = "FullyValidateLedger";

pub const PROPOSE: &str = "Propose";
pub const VALIDATE: &str = "Validate";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_VALIDATION: &str = "ReceiveValidation";

pub const CREATE_DISPUTE: &str = "CreateDispute";
pub const UPDATE_DISPUTE_VOTE: &str = "UpdateDisputeVote";
pub const ACQUIRE_TX_SET: &str = "AcquireTxSet";

pub const WRONG_LEDGER: &str = "WrongLedger";
pub const SWITCH_LEDGER: &str = "SwitchLedger";

/// Gives the default logging closure of an event type.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for StartRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_round_event: &StartRoundEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                START_ROUND,
                secs_since_unix_epoch(start_round_event.timestamp),
                start_round_event.round.int(),
                first_seven_base64_chars(&start_round_event.prev_ledger.bytes()),
                start_round_event.ledger_seq,
                start_round_event.mode
            )
        };
        Box::new(logger)
    }
}

impl Logger for CloseLedgerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |close_ledger_event: &CloseLedgerEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                CLOSE_LEDGER,
                secs_since_unix_epoch(close_ledger_event.timestamp),
                close_ledger_event.round.int(),
                first_seven_base64_chars(&close_ledger_event.prev_ledger.bytes()),
                close_ledger_event.tx_count,
                close_ledger_event.close_time
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReachConsensusEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reach_consensus_event: &ReachConsensusEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                REACH_CONSENSUS,
                secs_since_unix_epoch(reach_consensus_event.timestamp),
                reach_consensus_event.round.int(),
                first_seven_base64_chars(&reach_consensus_event.tx_set.bytes()),
                reach_consensus_event.close_time,
                reach_consensus_event.close_agree
            )
        };
        Box::new(logger)
    }
}

impl Logger for AcceptLedgerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |accept_ledger_event: &AcceptLedgerEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                ACCEPT_LEDGER,
                secs_since_unix_epoch(accept_ledger_event.timestamp),
                first_seven_base64_chars(&accept_ledger_event.hash().bytes()),
                accept_ledger_event.sequence(),
                accept_ledger_event.close_time(),
                accept_ledger_event.applied_tx_count()
            )
        };
        Box::new(logger)
    }
}

impl Logger for FullyValidateLedgerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |fully_validate_ledger_event: &FullyValidateLedgerEvent| {
            log::info!(
                "{}, {}, {}, {}",
                FULLY_VALIDATE_LEDGER,
                secs_since_unix_epoch(fully_validate_ledger_event.timestamp),
                first_seven_base64_chars(&fully_validate_ledger_event.ledger_hash.bytes()),
                fully_validate_ledger_event.ledger_seq
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                first_seven_base64_chars(&propose_event.proposal.position.bytes()),
                propose_event.proposal.close_time,
                propose_event.proposal.propose_seq.int()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ValidateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |validate_event: &ValidateEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VALIDATE,
                secs_since_unix_epoch(validate_event.timestamp),
                first_seven_base64_chars(&validate_event.validation.ledger_hash.bytes()),
                validate_event.validation.ledger_seq
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                first_seven_base64_chars(&receive_proposal_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_proposal_event.proposal.position.bytes()),
                receive_proposal_event.proposal.propose_seq.int()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveValidationEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_validation_event: &ReceiveValidationEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_VALIDATION,
                secs_since_unix_epoch(receive_validation_event.timestamp),
                first_seven_base64_chars(&receive_validation_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_validation_event.validation.ledger_hash.bytes()),
                receive_validation_event.validation.ledger_seq
            )
        };
        Box::new(logger)
    }
}

impl Logger for CreateDisputeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |create_dispute_event: &CreateDisputeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                CREATE_DISPUTE,
                secs_since_unix_epoch(create_dispute_event.timestamp),
                first_seven_base64_chars(&create_dispute_event.tx_id.bytes()),
                create_dispute_event.our_vote
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateDisputeVoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_dispute_vote_event: &UpdateDisputeVoteEvent| {
            log::info!(
                "{}, {}, {}, {}",
                UPDATE_DISPUTE_VOTE,
                secs_since_unix_epoch(update_dispute_vote_event.timestamp),
                first_seven_base64_chars(&update_dispute_vote_event.tx_id.bytes()),
                update_dispute_vote_event.our_vote
            )
        };
        Box::new(logger)
    }
}

impl Logger for AcquireTxSetEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |acquire_tx_set_event: &AcquireTxSetEvent| {
            log::info!(
                "{}, {}, {}",
                ACQUIRE_TX_SET,
                secs_since_unix_epoch(acquire_tx_set_event.timestamp),
                first_seven_base64_chars(&acquire_tx_set_event.tx_set.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for WrongLedgerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |wrong_ledger_event: &WrongLedgerEvent| {
            log::info!(
                "{}, {}, {}, {}",
                WRONG_LEDGER,
                secs_since_unix_epoch(wrong_ledger_event.timestamp),
                first_seven_base64_chars(&wrong_ledger_event.our_ledger.bytes()),
                first_seven_base64_chars(&wrong_ledger_event.network_ledger.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for SwitchLedgerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |switch_ledger_event: &SwitchLedgerEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SWITCH_LEDGER,
                secs_since_unix_epoch(switch_ledger_event.timestamp),
                first_seven_base64_chars(&switch_ledger_event.from.bytes()),
                first_seven_base64_chars(&switch_ledger_event.to.bytes()),
                switch_ledger_event.ledger_seq
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
