/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which runs user-registered and logging handlers for every published
//! [`Event`].

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) start_round_handlers: Vec<HandlerPtr<StartRoundEvent>>,
    pub(crate) close_ledger_handlers: Vec<HandlerPtr<CloseLedgerEvent>>,
    pub(crate) reach_consensus_handlers: Vec<HandlerPtr<ReachConsensusEvent>>,
    pub(crate) accept_ledger_handlers: Vec<HandlerPtr<AcceptLedgerEvent>>,
    pub(crate) fully_validate_ledger_handlers: Vec<HandlerPtr<FullyValidateLedgerEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) validate_handlers: Vec<HandlerPtr<ValidateEvent>>,
    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_validation_handlers: Vec<HandlerPtr<ReceiveValidationEvent>>,
    pub(crate) create_dispute_handlers: Vec<HandlerPtr<CreateDisputeEvent>>,
    pub(crate) update_dispute_vote_handlers: Vec<HandlerPtr<UpdateDisputeVoteEvent>>,
    pub(crate) acquire_tx_set_handlers: Vec<HandlerPtr<AcquireTxSetEvent>>,
    pub(crate) wrong_ledger_handlers: Vec<HandlerPtr<WrongLedgerEvent>>,
    pub(crate) switch_ledger_handlers: Vec<HandlerPtr<SwitchLedgerEvent>>,
}

// Collect the user's handler for an event type, preceded by the default logger if events are logged.
fn handlers<T: Logger>(log_events: bool, handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(handler) = handler {
        handlers.push(handler);
    }
    handlers
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        start_round_handler: Option<HandlerPtr<StartRoundEvent>>,
        close_ledger_handler: Option<HandlerPtr<CloseLedgerEvent>>,
        reach_consensus_handler: Option<HandlerPtr<ReachConsensusEvent>>,
        accept_ledger_handler: Option<HandlerPtr<AcceptLedgerEvent>>,
        fully_validate_ledger_handler: Option<HandlerPtr<FullyValidateLedgerEvent>>,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        validate_handler: Option<HandlerPtr<ValidateEvent>>,
        receive_proposal_handler: Option<HandlerPtr<ReceiveProposalEvent>>,
        receive_validation_handler: Option<HandlerPtr<ReceiveValidationEvent>>,
        create_dispute_handler: Option<HandlerPtr<CreateDisputeEvent>>,
        update_dispute_vote_handler: Option<HandlerPtr<UpdateDisputeVoteEvent>>,
        acquire_tx_set_handler: Option<HandlerPtr<AcquireTxSetEvent>>,
        wrong_ledger_handler: Option<HandlerPtr<WrongLedgerEvent>>,
        switch_ledger_handler: Option<HandlerPtr<SwitchLedgerEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            start_round_handlers: handlers(log_events, start_round_handler),
            close_ledger_handlers: handlers(log_events, close_ledger_handler),
            reach_consensus_handlers: handlers(log_events, reach_consensus_handler),
            accept_ledger_handlers: handlers(log_events, accept_ledger_handler),
            fully_validate_ledger_handlers: handlers(log_events, fully_validate_ledger_handler),
            propose_handlers: handlers(log_events, propose_handler),
            validate_handlers: handlers(log_events, validate_handler),
            receive_proposal_handlers: handlers(log_events, receive_proposal_handler),
            receive_validation_handlers: handlers(log_events, receive_validation_handler),
            create_dispute_handlers: handlers(log_events, create_dispute_handler),
            update_dispute_vote_handlers: handlers(log_events, update_dispute_vote_handler),
            acquire_tx_set_handlers: handlers(log_events, acquire_tx_set_handler),
            wrong_ledger_handlers: handlers(log_events, wrong_ledger_handler),
            switch_ledger_handlers: handlers(log_events, switch_ledger_handler),
        }
    }

    /// Check whether there are no handlers at all, in which case events need not be published.
    pub(crate) fn is_empty(&self) -> bool {
        self.start_round_handlers.is_empty()
            && self.close_ledger_handlers.is_empty()
            && self.reach_consensus_handlers.is_empty()
            && self.accept_ledger_handlers.is_empty()
            && self.fully_validate_ledger_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.validate_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_validation_handlers.is_empty()
            && self.create_dispute_handlers.is_empty()
            && self.update_dispute_vote_handlers.is_empty()
            && self.acquire_tx_set_handlers.is_empty()
            && self.wrong_ledger_handlers.is_empty()
            && self.switch_ledger_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::StartRound(start_round_event) => self
                .start_round_handlers
                .iter()
                .for_each(|handler| handler(&start_round_event)),

            Event::CloseLedger(close_ledger_event) => self
                .close_ledger_handlers
                .iter()
                .for_each(|handler| handler(&close_ledger_event)),

            Event::ReachConsensus(reach_consensus_event) => self
                .reach_consensus_handlers
                .iter()
                .for_each(|handler| handler(&reach_consensus_event)),

            Event::AcceptLedger(accept_ledger_event) => self
                .accept_ledger_handlers
                .iter()
                .for_each(|handler| handler(&accept_ledger_event)),

            Event::FullyValidateLedger(fully_validate_ledger_event) => self
                .fully_validate_ledger_handlers
                .iter()
                .for_each(|handler| handler(&fully_validate_ledger_event)),

            Event::Propose(propose_event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&propose_event)),

            Event::Validate(validate_event) => self
                .validate_handlers
                .iter()
                .for_each(|handler| handler(&validate_event)),

            Event::ReceiveProposal(receive_proposal_event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&receive_proposal_event)),

            Event::ReceiveValidation(receive_validation_event) => self
                .receive_validation_handlers
                .iter()
                .for_each(|handler| handler(&receive_validation_event)),

            Event::CreateDispute(create_dispute_event) => self
                .create_dispute_handlers
                .iter()
                .for_each(|handler| handler(&create_dispute_event)),

            Event::UpdateDisputeVote(update_dispute_vote_event) => self
                .update_dispute_vote_handlers
                .iter()
                .for_each(|handler| handler(&update_dispute_vote_event)),

            Event::AcquireTxSet(acquire_tx_set_event) => self
                .acquire_tx_set_handlers
                .iter()
                .for_each(|handler| handler(&acquire_tx_set_event)),

            Event::WrongLedger(wrong_ledger_event) => self
                .wrong_ledger_handlers
                .iter()
                .for_each(|handler| handler(&wrong_ledger_event)),

            Event::SwitchLedger(switch_ledger_event) => self
                .switch_ledger_handlers
                .iter()
                .for_each(|handler| handler(&switch_ledger_event)),
        }
    }
}

/// Start the event bus thread, which fires the handlers of every event received from
/// `event_subscriber` until `shutdown_signal` fires.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from the node")
            }
        }

        match event_subscriber.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // The engine thread is gone. Wait for the shutdown signal.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(50)),
        }
    })
}
