/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a node.
//!
//! A node runs a [`ConsensusEngine`] on a dedicated thread, which is the single owner of all round state.
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the node](NodeSpec) with:
//!   1. `NodeSpec::builder` to construct a `NodeSpecBuilder`,
//!   2. The setters of the `NodeSpecBuilder`, and
//!   3. The `NodeSpecBuilder::build` method to construct a [NodeSpec],
//! - The function to [start](NodeSpec::start) a [Node] given its specification,
//! - [The type](Node) which keeps the node alive.
//!
//! ## Validators and observers
//!
//! Not every node has to propose in consensus. A node whose configuration says it is not `validating`,
//! or whose key is not in the trusted validator set, follows consensus as an observer: it builds every
//! ledger the network agrees on, but never broadcasts positions or validations.
//!
//! ## Starting a node
//!
//! ```ignore
//! let node =
//!     NodeSpec::builder()
//!     .network(network)
//!     .fetcher(fetcher)
//!     .genesis(genesis)
//!     .validators(validators)
//!     .configuration(configuration)
//!     .on_accept_ledger(accept_ledger_handler)
//!     .build()
//!     .start();
//! ```
//!
//! The node's [configuration](Configuration) can also be defined using the builder pattern, for example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(signing_key)
//!     .validating(true)
//!     .tick_interval(Duration::from_millis(250))
//!     .log_events(true)
//!     .build();
//! ```

use std::{
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, RwLock,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use ed25519_dalek::SigningKey;
use typed_builder::TypedBuilder;

use crate::{
    consensus::{ConsensusEngine, ConsensusParameters, QuorumPolicy, ThresholdQuorum},
    event_bus::*,
    events::*,
    ledger::snapshot::Ledger,
    networking::network::Network,
    tx_set::NodeFetcher,
    types::{data_types::NetClockTime, transaction::Transaction, validator_set::ValidatorSet},
};

/// Stores the user-defined parameters required to start the node, that is:
/// 1. The node's [signing key](ed25519_dalek::SigningKey), which identifies it as a validator.
/// 2. Whether the node should propose and validate when it is a trusted validator.
/// 3. The tick interval, i.e., how often the engine thread advances the current round.
/// 4. The "Log Events" flag, if set to "true" then events are logged.
/// 5. The [consensus parameters](ConsensusParameters).
/// 6. The number of worker threads that build ledgers and decode transaction sets.
///
/// ## Log Events
///
/// Events are logged using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.validating(...)`
    - `.tick_interval(...)`
    - `.log_events(...)`

    Optional:
    - `.consensus_parameters(...)`
    - `.worker_threads(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the node's signing key, used to sign proposals and validations. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set whether the node proposes and validates when it is a trusted validator. Required."))]
    pub validating: bool,
    #[builder(setter(doc = "Set how often the engine thread advances the current round. Required."))]
    pub tick_interval: Duration,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
    #[builder(default, setter(doc = "Set the [consensus parameters](ConsensusParameters). Optional, defaults to `ConsensusParameters::default()`."))]
    pub consensus_parameters: ConsensusParameters,
    #[builder(default = 1, setter(doc = "Set the number of worker threads. Zero runs their work on the engine thread. Optional, defaults to 1."))]
    pub worker_threads: usize,
}

/// Stores all necessary parameters and trait implementations required to run the [Node].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [NodeSpec]. On the builder call the following methods to construct a valid [NodeSpec].

    Required:
    - `.network(...)`
    - `.fetcher(...)`
    - `.genesis(...)`
    - `.validators(...)`
    - `.configuration(...)`

    Optional:
    - `.quorum(...)`
    - `.on_start_round(...)`
    - `.on_close_ledger(...)`
    - `.on_reach_consensus(...)`
    - `.on_accept_ledger(...)`
    - `.on_fully_validate_ledger(...)`
    - `.on_propose(...)`
    - `.on_validate(...)`
    - `.on_receive_proposal(...)`
    - `.on_receive_validation(...)`
    - `.on_create_dispute(...)`
    - `.on_update_dispute_vote(...)`
    - `.on_acquire_tx_set(...)`
    - `.on_wrong_ledger(...)`
    - `.on_switch_ledger(...)`
"))]
pub struct NodeSpec<N: Network + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(transform = |fetcher: impl NodeFetcher + 'static| Box::new(fetcher) as Box<dyn NodeFetcher>,
    doc = "Set the collaborator that transaction set and ledger nodes are pulled from and published to. The argument must implement the [NodeFetcher] trait. Required."))]
    fetcher: Box<dyn NodeFetcher>,
    #[builder(setter(transform = |genesis: Ledger| Arc::new(genesis),
    doc = "Set the ledger the node starts from. Required."))]
    genesis: Arc<Ledger>,
    #[builder(setter(doc = "Set the initial trusted validator set. Required."))]
    validators: ValidatorSet,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a node. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |quorum: impl QuorumPolicy + 'static| Some(Box::new(quorum) as Box<dyn QuorumPolicy>),
    doc = "Set the quorum policy. Optional, defaults to a [ThresholdQuorum] with the configured `quorum_percent`."))]
    quorum: Option<Box<dyn QuorumPolicy>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartRoundEvent>),
    doc = "Register a handler closure to be invoked after the node starts a round. Optional."))]
    on_start_round: Option<HandlerPtr<StartRoundEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CloseLedgerEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CloseLedgerEvent>),
    doc = "Register a handler closure to be invoked after the node closes its open ledger. Optional."))]
    on_close_ledger: Option<HandlerPtr<CloseLedgerEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReachConsensusEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReachConsensusEvent>),
    doc = "Register a handler closure to be invoked after the node declares consensus on a transaction set. Optional."))]
    on_reach_consensus: Option<HandlerPtr<ReachConsensusEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AcceptLedgerEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AcceptLedgerEvent>),
    doc = "Register a handler closure to be invoked after the node accepts a new ledger. Optional."))]
    on_accept_ledger: Option<HandlerPtr<AcceptLedgerEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&FullyValidateLedgerEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<FullyValidateLedgerEvent>),
    doc = "Register a handler closure to be invoked after a ledger collects validations from a quorum. Optional."))]
    on_fully_validate_ledger: Option<HandlerPtr<FullyValidateLedgerEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the node broadcasts a proposal. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ValidateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ValidateEvent>),
    doc = "Register a handler closure to be invoked after the node broadcasts a validation. Optional."))]
    on_validate: Option<HandlerPtr<ValidateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the node accepts a peer's proposal. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveValidationEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveValidationEvent>),
    doc = "Register a handler closure to be invoked after the node receives a validation. Optional."))]
    on_receive_validation: Option<HandlerPtr<ReceiveValidationEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CreateDisputeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CreateDisputeEvent>),
    doc = "Register a handler closure to be invoked after the node finds a transaction that positions disagree on. Optional."))]
    on_create_dispute: Option<HandlerPtr<CreateDisputeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateDisputeVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateDisputeVoteEvent>),
    doc = "Register a handler closure to be invoked after the node changes its vote on a disputed transaction. Optional."))]
    on_update_dispute_vote: Option<HandlerPtr<UpdateDisputeVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AcquireTxSetEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AcquireTxSetEvent>),
    doc = "Register a handler closure to be invoked after the node starts acquiring a peer's transaction set. Optional."))]
    on_acquire_tx_set: Option<HandlerPtr<AcquireTxSetEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&WrongLedgerEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<WrongLedgerEvent>),
    doc = "Register a handler closure to be invoked after the node finds that the network builds on another ledger. Optional."))]
    on_wrong_ledger: Option<HandlerPtr<WrongLedgerEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SwitchLedgerEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SwitchLedgerEvent>),
    doc = "Register a handler closure to be invoked after the node switches to the ledger the network builds on. Optional."))]
    on_switch_ledger: Option<HandlerPtr<SwitchLedgerEvent>>,
}

impl<N: Network + 'static> NodeSpec<N> {
    /// Starts all threads and channels associated with running a node, and returns the handles to them in
    /// a [Node] struct.
    pub fn start(self) -> Node {
        let configuration = self.configuration;

        let event_handlers = EventHandlers::new(
            configuration.log_events,
            self.on_start_round,
            self.on_close_ledger,
            self.on_reach_consensus,
            self.on_accept_ledger,
            self.on_fully_validate_ledger,
            self.on_propose,
            self.on_validate,
            self.on_receive_proposal,
            self.on_receive_validation,
            self.on_create_dispute,
            self.on_update_dispute_vote,
            self.on_acquire_tx_set,
            self.on_wrong_ledger,
            self.on_switch_ledger,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let quorum = self.quorum.unwrap_or_else(|| {
            Box::new(ThresholdQuorum::new(
                configuration.consensus_parameters.quorum_percent,
            ))
        });
        let last_closed = Arc::new(RwLock::new(self.genesis.clone()));
        let engine = ConsensusEngine::new(
            configuration.me,
            configuration.validating,
            configuration.consensus_parameters,
            configuration.worker_threads,
            self.network.clone(),
            self.fetcher,
            quorum,
            self.genesis,
            self.validators,
            event_publisher,
            Instant::now(),
        );

        let (command_sender, command_receiver) = mpsc::channel();
        let (engine_shutdown, engine_shutdown_receiver) = mpsc::channel();
        let engine = start_engine(
            engine,
            self.network,
            configuration.tick_interval,
            command_receiver,
            last_closed.clone(),
            engine_shutdown_receiver,
        );

        let (event_bus_shutdown, event_bus_shutdown_receiver) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let event_bus = match (event_subscriber, event_bus_shutdown_receiver) {
            (Some(event_subscriber), Some(event_bus_shutdown_receiver)) => Some(start_event_bus(
                event_handlers,
                event_subscriber,
                event_bus_shutdown_receiver,
            )),
            _ => None,
        };

        Node {
            last_closed,
            commands: command_sender,
            engine: Some(engine),
            engine_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }
}

enum Command {
    SubmitTransaction(Transaction),
    UpdateValidatorSet(ValidatorSet),
}

fn start_engine<N: Network + 'static>(
    mut engine: ConsensusEngine<N>,
    mut network: N,
    tick_interval: Duration,
    commands: Receiver<Command>,
    last_closed: Arc<RwLock<Arc<Ledger>>>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("engine thread disconnected from the node")
            }
        }

        // 1. Take in local commands.
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::SubmitTransaction(transaction) => {
                    engine.on_submit_transaction(transaction);
                }
                Command::UpdateValidatorSet(validators) => engine.update_validator_set(validators),
            }
        }

        // 2. Take in messages from peers.
        while let Some((origin, msg)) = network.recv() {
            engine.on_receive_msg(Instant::now(), origin, msg);
        }

        // 3. Advance the round.
        let previous = engine.last_closed_ledger().hash();
        engine.on_tick(Instant::now(), NetClockTime::now());
        if engine.last_closed_ledger().hash() != previous {
            let mut shared = last_closed
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *shared = engine.last_closed_ledger().clone();
        }

        thread::sleep(tick_interval);
    })
}

/// A handle to the background threads of a node. When this value is dropped, all background threads are
/// gracefully shut down.
pub struct Node {
    last_closed: Arc<RwLock<Arc<Ledger>>>,
    commands: Sender<Command>,
    engine: Option<JoinHandle<()>>,
    engine_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Node {
    /// Submit a transaction to the node's open ledger. Transactions that can still apply are relayed to
    /// peers.
    pub fn submit_transaction(&self, transaction: Transaction) {
        let _ = self
            .commands
            .send(Command::SubmitTransaction(transaction));
    }

    /// Replace the trusted validator set from the next round on.
    pub fn update_validator_set(&self, validators: ValidatorSet) {
        let _ = self
            .commands
            .send(Command::UpdateValidatorSet(validators));
    }

    /// Get the last ledger the node accepted.
    pub fn last_closed_ledger(&self) -> Arc<Ledger> {
        self.last_closed
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Safety: the event bus is shut down first, so that the engine thread may keep publishing events
        // until it is shut down itself. Publishing to a closed event bus is harmless.

        self.event_bus_shutdown
            .iter()
            .for_each(|shutdown| shutdown.send(()).unwrap());
        if let Some(event_bus) = self.event_bus.take() {
            event_bus.join().unwrap();
        }

        self.engine_shutdown.send(()).unwrap();
        if let Some(engine) = self.engine.take() {
            engine.join().unwrap();
        }
    }
}
