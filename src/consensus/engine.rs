/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The consensus state machine.
//!
//! [`ConsensusEngine`] owns every piece of round state: the current [`ConsensusRound`], peer positions,
//! validations, the open ledger and recent history. Its `on_*` methods are its only entry points, and
//! they all take `&mut self`, so timer ticks and inbound messages are serialized by construction.
//!
//! ## Driving the engine
//!
//! The engine never reads a clock itself. Every entry point that depends on time takes `now`, a monotonic
//! [`Instant`] used for every duration the engine measures, and most also take `net_time`, the network
//! time that close times are expressed in. [`Node`](crate::node::Node) drives the engine with real clocks
//! on a dedicated thread; tests may drive it with simulated ones.
//!
//! ## Round lifecycle
//!
//! 1. **Open**: transactions accumulate in the open ledger. Each tick, the engine decides whether to
//!    close it (see [`should_close_ledger`]).
//! 2. **Establishing**: the open ledger's transactions become this node's position. Each tick after the
//!    minimum consensus time, the engine votes on disputed transactions and on the close time, and
//!    declares consensus once its position has been stable long enough and a quorum of trusted power
//!    shares it.
//! 3. **Finished**: the agreed set is applied on the worker pool.
//! 4. **Accepted**: the new ledger becomes the last closed ledger, and the next round starts right away.
//!
//! ## Fork recovery
//!
//! Each tick in the Open and Establishing phases, the engine checks which previous ledger the trusted
//! peers build on. If a weightier group builds on another ledger, the node stops proposing. Once that
//! ledger has quorum support and can be obtained, the round is abandoned and a new one starts on it.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{mpsc::Sender, Arc},
    time::{Duration, Instant, SystemTime},
};

use ed25519_dalek::{SigningKey, VerifyingKey};

use crate::{
    applier::{open_ledger::OpenLedger, result::ApplyOutcome, ApplyReport},
    events::*,
    ledger::{
        accepted::{AcceptedLedger, AddressBook},
        history::LedgerHistory,
        snapshot::{Ledger, LedgerDecodeError},
    },
    networking::{
        messages::Message,
        network::{Network, ValidatorSetUpdateHandle},
        sending::SenderHandle,
    },
    proposal_store::{Ingested, LedgerProposal, ProposalStore},
    tx_set::{acquire::TxSetAcquirer, NodeFetcher, TxSet, TxSetError},
    types::{
        bounded_cache::BoundedCache,
        crypto_primitives::Keypair,
        data_types::{CryptoHash, LedgerSequence, NetClockTime, Power, RoundID, TotalPower, TxID},
        transaction::Transaction,
        validator_set::ValidatorSet,
    },
};

use super::{
    close_time::{effective_close_time, round_close_time, CloseTimeVotes},
    params::ConsensusParameters,
    quorum::QuorumPolicy,
    round::ConsensusRound,
    types::{Mode, Phase},
    validations::{Validation, ValidationTally},
    worker::{ApplyWorker, BuildLedgerJob, Job, JobResult},
};

/// Number of transaction sets (ours and peers') kept for comparing positions.
const TX_SET_CACHE_CAPACITY: usize = 128;

/// A round that has been running for this long without closing closes regardless of anything else.
const MAX_ROUND_TIME: Duration = Duration::from_secs(600);

#[derive(Debug)]
pub enum ConsensusError {
    /// The ledger is neither in recent history nor available from the node fetcher right now.
    LedgerNotFound,
    Ledger(LedgerDecodeError),
    TxSet(TxSetError),
}

impl From<LedgerDecodeError> for ConsensusError {
    fn from(value: LedgerDecodeError) -> Self {
        ConsensusError::Ledger(value)
    }
}

impl From<TxSetError> for ConsensusError {
    fn from(value: TxSetError) -> Self {
        ConsensusError::TxSet(value)
    }
}

/// Decide whether the open ledger should close.
///
/// - `any_transactions`: whether the open ledger holds any transactions.
/// - `previous_proposers`: number of peers that proposed in the previous round.
/// - `proposers_closed`: number of peers that already proposed in this round.
/// - `previous_round_time`: how long the previous round spent establishing.
/// - `open_time`: how long the ledger has been open.
pub fn should_close_ledger(
    any_transactions: bool,
    previous_proposers: usize,
    proposers_closed: usize,
    previous_round_time: Duration,
    open_time: Duration,
    params: &ConsensusParameters,
) -> bool {
    // Something went wrong with timing. Close to get back on track.
    if previous_round_time > MAX_ROUND_TIME || open_time > MAX_ROUND_TIME {
        return true;
    }

    // Most of the peers that proposed last time have already closed.
    if proposers_closed > previous_proposers / 2 {
        return true;
    }

    if !any_transactions {
        return open_time >= params.ledger_idle_interval;
    }

    // Give peers a chance to catch up, and keep a pace that slow peers can follow.
    if open_time < params.ledger_min_close {
        return false;
    }
    if open_time < previous_round_time / 2 {
        return false;
    }

    true
}

pub struct ConsensusEngine<N: Network> {
    keypair: Keypair,
    validating: bool,
    params: ConsensusParameters,
    quorum: Box<dyn QuorumPolicy>,
    sender: SenderHandle<N>,
    validator_set_update_handle: ValidatorSetUpdateHandle<N>,
    fetcher: Box<dyn NodeFetcher>,
    worker: ApplyWorker,
    event_publisher: Option<Sender<Event>>,

    history: LedgerHistory,
    address_book: AddressBook,
    last_closed: Arc<Ledger>,
    open_ledger: OpenLedger,

    proposals: ProposalStore,
    validations: ValidationTally,
    acquirer: TxSetAcquirer,
    tx_sets: BoundedCache<CryptoHash, Arc<TxSet>>,

    // Takes effect at the start of the next round.
    pending_validators: Option<ValidatorSet>,
    round: ConsensusRound,
    previous_round_time: Duration,
    previous_proposers: usize,
}

impl<N: Network> ConsensusEngine<N> {
    /// Create an engine whose last closed ledger is `genesis`, and start its first round at `now`.
    ///
    /// `worker_threads` is the size of the pool that builds ledgers and decodes acquired transaction sets.
    /// Zero runs that work inline, on the caller's thread.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signing_key: SigningKey,
        validating: bool,
        params: ConsensusParameters,
        worker_threads: usize,
        mut network: N,
        mut fetcher: Box<dyn NodeFetcher>,
        quorum: Box<dyn QuorumPolicy>,
        genesis: Arc<Ledger>,
        validators: ValidatorSet,
        event_publisher: Option<Sender<Event>>,
        now: Instant,
    ) -> Self {
        network.init_validator_set(validators.clone());
        fetcher.got(genesis.hash(), genesis.to_bytes());

        let keypair = Keypair::new(signing_key);
        let mut history = LedgerHistory::new(params.ledger_history_capacity);
        history.insert(genesis.clone());
        let mode = initial_mode(validating, &validators, &keypair.public());

        let mut engine = Self {
            keypair,
            validating,
            quorum,
            sender: SenderHandle::new(network.clone()),
            validator_set_update_handle: ValidatorSetUpdateHandle::new(network),
            fetcher,
            worker: ApplyWorker::new(worker_threads),
            event_publisher,
            history,
            address_book: AddressBook::new(params.address_book_capacity),
            last_closed: genesis.clone(),
            open_ledger: OpenLedger::new(genesis.clone()),
            proposals: ProposalStore::new(),
            validations: ValidationTally::new(),
            acquirer: TxSetAcquirer::new(),
            tx_sets: BoundedCache::new(TX_SET_CACHE_CAPACITY),
            pending_validators: None,
            round: ConsensusRound::new(RoundID::new(0), genesis, mode, validators, now),
            previous_round_time: params.avalanche_min_round_time,
            previous_proposers: 0,
            params,
        };
        engine.publish_start_round();
        engine
    }

    /* ↓↓↓ Entry points ↓↓↓ */

    /// Advance the current round by one timer tick.
    pub fn on_tick(&mut self, now: Instant, net_time: NetClockTime) {
        // 1. Pull pending transaction set nodes, and fold in finished work.
        self.poll_acquisitions();
        self.drain_worker_results(now, net_time);

        // 2. Forget positions that went silent.
        self.proposals.expire(now, self.params.proposal_freshness);

        // 3. Check that we are building on the same ledger as the network.
        if matches!(self.round.phase(), Phase::Open | Phase::Establishing) {
            self.check_ledger(now);
        }
        if self.round.mode() == Mode::WrongLedger {
            return;
        }

        // 4. Advance the round.
        match self.round.phase() {
            Phase::Open => self.phase_open(now, net_time),
            Phase::Establishing => self.phase_establish(now),
            Phase::Finished | Phase::Accepted => (),
        }

        self.drain_worker_results(now, net_time);
    }

    /// Process a message received from `origin`.
    pub fn on_receive_msg(&mut self, now: Instant, origin: VerifyingKey, msg: Message) {
        match msg {
            Message::Proposal(proposal) => self.on_receive_proposal(now, origin, proposal),
            Message::Validation(validation) => self.on_receive_validation(origin, validation),
            Message::Transaction(transaction) => {
                self.on_receive_transaction(transaction);
            }
        }
    }

    /// Process a peer's proposal. Proposals that fail to be ingested are ignored.
    pub fn on_receive_proposal(&mut self, now: Instant, origin: VerifyingKey, proposal: LedgerProposal) {
        // Our own position is tracked by the round, not the proposal store.
        if proposal.peer == self.keypair.public().to_bytes() {
            return;
        }
        let ingested = self
            .proposals
            .ingest(proposal.clone(), self.round.validators(), now);
        let ingested = match ingested {
            Ok(ingested) => ingested,
            Err(rejection) => {
                log::trace!("Ignoring proposal from {:?}: {:?}", origin, rejection);
                return;
            }
        };

        Event::publish(
            &self.event_publisher,
            Event::ReceiveProposal(ReceiveProposalEvent {
                timestamp: SystemTime::now(),
                origin,
                proposal: proposal.clone(),
            }),
        );

        if proposal.prev_ledger != self.round.prev_ledger_hash() {
            return;
        }
        match ingested {
            Ingested::Position => {
                if self.tx_sets.peek(&proposal.position).is_none() {
                    self.acquire_tx_set(proposal.position);
                } else if self.round.phase() == Phase::Establishing {
                    self.refresh_disputes(now);
                }
            }
            Ingested::BowOut => {
                if let Ok(peer) = proposal.verifying_key() {
                    self.round.forget_votes(&peer);
                }
            }
        }
    }

    /// Process a validation. Validations from untrusted validators, and stale ones, are ignored.
    pub fn on_receive_validation(&mut self, origin: VerifyingKey, validation: Validation) {
        Event::publish(
            &self.event_publisher,
            Event::ReceiveValidation(ReceiveValidationEvent {
                timestamp: SystemTime::now(),
                origin,
                validation: validation.clone(),
            }),
        );
        self.tally_validation(validation);
    }

    /// Apply a transaction relayed by a peer to the open ledger.
    pub fn on_receive_transaction(&mut self, transaction: Transaction) -> Option<ApplyOutcome> {
        self.open_ledger.apply(transaction)
    }

    /// Apply a locally submitted transaction to the open ledger, and relay it to peers unless it is
    /// already known or can never apply.
    pub fn on_submit_transaction(&mut self, transaction: Transaction) -> Option<ApplyOutcome> {
        let outcome = self.open_ledger.apply(transaction.clone())?;
        if !matches!(outcome, ApplyOutcome::Excluded(_)) {
            self.sender.broadcast(transaction);
        }
        Some(outcome)
    }

    /// Take in a node fetched by the node fetcher's transport, and continue pending acquisitions.
    pub fn on_node_fetched(&mut self, now: Instant, net_time: NetClockTime, hash: CryptoHash, bytes: Vec<u8>) {
        self.fetcher.got(hash, bytes);
        self.poll_acquisitions();
        self.drain_worker_results(now, net_time);
    }

    /// Replace the trusted validator set from the next round on.
    pub fn update_validator_set(&mut self, validators: ValidatorSet) {
        self.validator_set_update_handle
            .update_validator_set(validators.clone());
        self.pending_validators = Some(validators);
    }

    /* ↓↓↓ Getters ↓↓↓ */

    pub fn public_key(&self) -> VerifyingKey {
        self.keypair.public()
    }

    pub fn round(&self) -> &ConsensusRound {
        &self.round
    }

    pub fn last_closed_ledger(&self) -> &Arc<Ledger> {
        &self.last_closed
    }

    pub fn open_ledger(&self) -> &OpenLedger {
        &self.open_ledger
    }

    pub fn last_fully_validated(&self) -> Option<(LedgerSequence, CryptoHash)> {
        self.validations.last_fully_validated()
    }

    /// Get the ledger `hash`, from recent history or else from the node fetcher.
    pub fn ledger(&mut self, hash: &CryptoHash) -> Result<Arc<Ledger>, ConsensusError> {
        if let Some(ledger) = self.history.get(hash) {
            return Ok(ledger);
        }
        let bytes = self
            .fetcher
            .have(hash)
            .ok_or(ConsensusError::LedgerNotFound)?;
        let ledger = Arc::new(Ledger::from_bytes(&bytes, hash)?);
        self.history.insert(ledger.clone());
        Ok(ledger)
    }

    /* ↓↓↓ Phases ↓↓↓ */

    fn phase_open(&mut self, now: Instant, net_time: NetClockTime) {
        let prev_ledger = self.round.prev_ledger_hash();
        let proposers_closed = self
            .proposals
            .positions_for(&prev_ledger, now, self.params.proposal_freshness)
            .len();

        if should_close_ledger(
            !self.open_ledger.is_empty(),
            self.previous_proposers,
            proposers_closed,
            self.previous_round_time,
            self.round.open_time(now),
            &self.params,
        ) {
            self.close_ledger(now, net_time);
        }
    }

    fn close_ledger(&mut self, now: Instant, net_time: NetClockTime) {
        self.round.advance(Phase::Establishing, now);

        let set = Arc::new(TxSet::new(
            self.open_ledger.transactions().values().cloned(),
        ));
        self.publish_tx_set(&set);
        let close_time = round_close_time(net_time, self.round.close_resolution());

        log::debug!(
            "Closing ledger after {} with {} transactions",
            self.round.prev_ledger_hash(),
            set.len()
        );
        Event::publish(
            &self.event_publisher,
            Event::CloseLedger(CloseLedgerEvent {
                timestamp: SystemTime::now(),
                round: self.round.id(),
                prev_ledger: self.round.prev_ledger_hash(),
                tx_count: set.len(),
                close_time,
            }),
        );

        self.round.take_position(set, close_time, now);
        if self.round.mode().is_proposing() {
            self.propose(now);
        }
        self.refresh_disputes(now);
    }

    fn phase_establish(&mut self, now: Instant) {
        // 1. Give peers time to close and propose.
        if self.round.establish_time(now) < self.params.ledger_min_consensus {
            return;
        }

        // 2. Vote on disputes and the close time.
        self.update_our_position(now);

        // 3. Check for consensus.
        if !self.round.is_stable(now, self.params.min_stable_time) {
            return;
        }
        let Some(support) = self.our_position_support(now) else {
            return;
        };
        if !self.quorum.accept(support, self.round.validators()) {
            return;
        }

        let close_agree = if self.round.have_close_time_consensus() {
            true
        } else {
            let age_percent = self.round.age_percent(
                now,
                self.previous_round_time,
                self.params.avalanche_min_round_time,
            );
            if age_percent < self.params.close_time_patience_percent {
                return;
            }
            log::debug!("No agreement on close time after {}% of the round", age_percent);
            false
        };

        self.finish(now, close_agree);
    }

    fn finish(&mut self, now: Instant, close_agree: bool) {
        let Some(position) = self.round.our_position().cloned() else {
            return;
        };
        self.round.advance(Phase::Finished, now);

        let prev_ledger = self.round.prev_ledger().clone();
        let close_time = if close_agree {
            effective_close_time(
                position.close_time,
                self.round.close_resolution(),
                prev_ledger.close_time(),
            )
        } else {
            prev_ledger.close_time() + 1
        };

        log::debug!(
            "Consensus on transaction set {} in round {}",
            position.set.hash(),
            self.round.id().int()
        );
        Event::publish(
            &self.event_publisher,
            Event::ReachConsensus(ReachConsensusEvent {
                timestamp: SystemTime::now(),
                round: self.round.id(),
                tx_set: position.set.hash(),
                close_time,
                close_agree,
            }),
        );

        self.previous_round_time = self.round.establish_time(now);
        self.previous_proposers = self
            .proposals
            .positions_for(
                &prev_ledger.hash(),
                now,
                self.params.proposal_freshness,
            )
            .len();

        self.worker.submit(Job::BuildLedger(BuildLedgerJob {
            round: self.round.id(),
            parent: prev_ledger,
            transactions: position.set.transactions().cloned().collect(),
            salt: position.set.hash(),
            close_time,
            close_resolution: self.round.close_resolution(),
            close_agree,
            max_passes: self.params.max_apply_passes,
            retry_passes: self.params.retry_passes,
        }));
    }

    fn accept_ledger(
        &mut self,
        now: Instant,
        net_time: NetClockTime,
        ledger: Arc<Ledger>,
        report: ApplyReport,
    ) {
        // 1. Make the ledger available to peers, and report it.
        self.history.insert(ledger.clone());
        self.fetcher.got(ledger.hash(), ledger.to_bytes());
        self.round.advance(Phase::Accepted, now);

        log::debug!(
            "Accepted ledger {} with sequence {} ({} applied, {} excluded)",
            ledger.hash(),
            ledger.seq(),
            report.applied.len(),
            report.excluded.len()
        );
        let accepted = AcceptedLedger::new(ledger.clone(), &mut self.address_book);
        Event::publish(
            &self.event_publisher,
            Event::AcceptLedger(AcceptLedgerEvent {
                timestamp: SystemTime::now(),
                ledger: accepted,
            }),
        );

        // 2. Validate it.
        if self.validating && self.round.mode().is_proposing() {
            let validation = Validation::new(&self.keypair, ledger.hash(), ledger.seq(), net_time);
            self.sender.broadcast(validation.clone());
            Event::publish(
                &self.event_publisher,
                Event::Validate(ValidateEvent {
                    timestamp: SystemTime::now(),
                    validation: validation.clone(),
                }),
            );
            self.tally_validation(validation);
        }

        // 3. Carry transactions that did not make it into the ledger over to the next open ledger.
        let applied: BTreeSet<TxID> = report.applied_ids().collect();
        let mut carried: BTreeMap<TxID, Transaction> = BTreeMap::new();
        let leftovers = self
            .open_ledger
            .transactions()
            .values()
            .chain(self.open_ledger.held())
            .chain(report.retriable.iter())
            .chain(
                self.round
                    .lost_disputes()
                    .map(|dispute| dispute.transaction()),
            );
        for transaction in leftovers {
            let tx_id = transaction.id();
            if !applied.contains(&tx_id) {
                carried.insert(tx_id, transaction.clone());
            }
        }

        // 4. Start the next round on the new ledger.
        let prev_ledger = self.round.prev_ledger_hash();
        self.last_closed = ledger.clone();
        self.open_ledger = OpenLedger::reopen(ledger, carried.into_values());
        self.proposals.retire(&prev_ledger);
        self.start_round(now, false);
    }

    fn start_round(&mut self, now: Instant, switched: bool) {
        let validators = match self.pending_validators.take() {
            Some(validators) => {
                log::debug!("Trusting {} validators from this round on", validators.len());
                self.proposals.retain_trusted(&validators);
                self.validations.retain_trusted(&validators);
                validators
            }
            None => self.round.validators().clone(),
        };

        let mode = if switched {
            Mode::SwitchedLedger
        } else {
            initial_mode(self.validating, &validators, &self.keypair.public())
        };
        self.acquirer.clear();
        self.round = ConsensusRound::new(
            self.round.id().next(),
            self.last_closed.clone(),
            mode,
            validators,
            now,
        );
        self.publish_start_round();
    }

    /* ↓↓↓ Positions and disputes ↓↓↓ */

    fn propose(&mut self, now: Instant) {
        let Some(position) = self.round.our_position() else {
            return;
        };
        let proposal = LedgerProposal::new(
            &self.keypair,
            self.round.prev_ledger_hash(),
            position.set.hash(),
            position.close_time,
            position.propose_seq,
        );
        self.sender.broadcast(proposal.clone());
        self.round.mark_broadcast(now);

        Event::publish(
            &self.event_publisher,
            Event::Propose(ProposeEvent {
                timestamp: SystemTime::now(),
                proposal,
            }),
        );
    }

    // Compare our position with every known peer set, and record every peer's votes on the disputes.
    fn refresh_disputes(&mut self, now: Instant) {
        if self.round.our_position().is_none() {
            return;
        }

        let prev_ledger = self.round.prev_ledger_hash();
        let peers: Vec<(VerifyingKey, CryptoHash)> = self
            .proposals
            .positions_for(&prev_ledger, now, self.params.proposal_freshness)
            .into_iter()
            .map(|position| (position.peer, position.proposal.position))
            .collect();

        // 1. Create disputes against sets we have not compared with yet.
        let mut known: Vec<(VerifyingKey, Arc<TxSet>)> = Vec::new();
        for (peer, set_hash) in peers {
            let Some(set) = self.tx_sets.peek(&set_hash).cloned() else {
                self.acquire_tx_set(set_hash);
                continue;
            };
            if !self.round.has_compared(&set_hash) {
                for tx_id in self.round.create_disputes(&set) {
                    let our_vote = self
                        .round
                        .disputes()
                        .get(&tx_id)
                        .map_or(false, |dispute| dispute.our_vote());
                    Event::publish(
                        &self.event_publisher,
                        Event::CreateDispute(CreateDisputeEvent {
                            timestamp: SystemTime::now(),
                            tx_id,
                            our_vote,
                        }),
                    );
                }
            }
            known.push((peer, set));
        }

        // 2. Record votes, forgetting those of peers without a current position.
        let voters: BTreeSet<[u8; 32]> = known.iter().map(|(peer, _)| peer.to_bytes()).collect();
        let silent: Vec<VerifyingKey> = self
            .round
            .validators()
            .validators()
            .filter(|validator| !voters.contains(&validator.to_bytes()))
            .copied()
            .collect();
        for peer in silent {
            self.round.forget_votes(&peer);
        }
        for (peer, set) in known {
            self.round.record_votes(peer, &set);
        }
    }

    fn update_our_position(&mut self, now: Instant) {
        self.refresh_disputes(now);
        let Some(position) = self.round.our_position().cloned() else {
            return;
        };

        // 1. Vote on disputed transactions, with a threshold that tightens as the round ages.
        let age_percent = self.round.age_percent(
            now,
            self.previous_round_time,
            self.params.avalanche_min_round_time,
        );
        let threshold = self.params.dispute_threshold(age_percent);
        let proposing = self.round.mode().is_proposing();
        let our_power = self.our_power();

        let mut flipped: Vec<(TxID, bool, Transaction)> = Vec::new();
        for (tx_id, dispute) in self.round.disputes_mut().iter_mut() {
            if dispute.update_vote(threshold, proposing, our_power) {
                flipped.push((*tx_id, dispute.our_vote(), dispute.transaction().clone()));
            }
        }

        let mut set = (*position.set).clone();
        for (tx_id, our_vote, transaction) in flipped {
            set = if our_vote {
                set.with(transaction)
            } else {
                set.without(&tx_id)
            };
            Event::publish(
                &self.event_publisher,
                Event::UpdateDisputeVote(UpdateDisputeVoteEvent {
                    timestamp: SystemTime::now(),
                    tx_id,
                    our_vote,
                }),
            );
        }

        // 2. Vote on the close time.
        let resolution = self.round.close_resolution();
        let mut votes = CloseTimeVotes::new();
        for peer_position in self.proposals.positions_for(
            &self.round.prev_ledger_hash(),
            now,
            self.params.proposal_freshness,
        ) {
            votes.add(peer_position.proposal.close_time, resolution);
        }
        if proposing {
            votes.add(position.close_time, resolution);
        }
        let close_time = match votes.winner(self.params.close_time_consensus_percent) {
            Some((winner, agreed)) => {
                self.round.set_close_time_consensus(agreed);
                winner
            }
            None => {
                self.round.set_close_time_consensus(true);
                position.close_time
            }
        };

        // 3. Take and announce the new position, or refresh the old one.
        if set.hash() != position.set.hash() || close_time != position.close_time {
            let set = Arc::new(set);
            self.publish_tx_set(&set);
            log::debug!(
                "Changing position from {} to {} in round {}",
                position.set.hash(),
                set.hash(),
                self.round.id().int()
            );
            self.round.take_position(set, close_time, now);
            if proposing {
                self.propose(now);
            }
        } else if proposing {
            let due = match position.last_broadcast {
                Some(last_broadcast) => {
                    now.saturating_duration_since(last_broadcast) >= self.params.propose_interval
                }
                None => true,
            };
            if due {
                self.round.refresh_position();
                self.propose(now);
            }
        }
    }

    // Get the power behind our position: peers whose fresh position is our set, plus ours if we propose.
    fn our_position_support(&self, now: Instant) -> Option<TotalPower> {
        let position = self.round.our_position()?;
        let validators = self.round.validators();
        let agreeing: Vec<VerifyingKey> = self
            .proposals
            .positions_for(
                &self.round.prev_ledger_hash(),
                now,
                self.params.proposal_freshness,
            )
            .into_iter()
            .filter(|peer_position| peer_position.proposal.position == position.set.hash())
            .map(|peer_position| peer_position.peer)
            .collect();

        let mut support = validators.power_of(agreeing.iter());
        if self.round.mode().is_proposing() {
            support += self.our_power();
        }
        Some(support)
    }

    fn our_power(&self) -> Power {
        self.round
            .validators()
            .power(&self.keypair.public())
            .copied()
            .unwrap_or(Power::new(0))
    }

    /* ↓↓↓ Fork recovery ↓↓↓ */

    fn check_ledger(&mut self, now: Instant) {
        let our_ledger = self.round.prev_ledger_hash();
        let validators = self.round.validators();

        // 1. Weigh the previous ledgers trusted peers build on.
        let mut support =
            self.proposals
                .prev_ledger_support(validators, now, self.params.proposal_freshness);
        if self.round.mode() != Mode::WrongLedger {
            if let Some(power) = validators.power(&self.keypair.public()) {
                *support.entry(our_ledger).or_default() += *power;
            }
        }

        // Peers still building on ledgers we have moved past are behind, not on a fork.
        let our_seq = self.last_closed.seq();
        support.retain(|hash, _| {
            *hash == our_ledger
                || !self
                    .history
                    .peek(hash)
                    .map_or(false, |ledger| ledger.seq() < our_seq)
        });

        let Some((network_ledger, network_support)) = support
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(b.0)))
            .map(|(hash, power)| (*hash, *power))
        else {
            return;
        };
        if network_ledger == our_ledger {
            // Peers came back to our ledger. We bowed out of this round, so follow it without proposing.
            if self.round.mode() == Mode::WrongLedger {
                self.round.set_mode(Mode::Observing);
            }
            return;
        }

        // 2. Stop proposing on our ledger.
        if self.round.mode() != Mode::WrongLedger {
            log::warn!(
                "Building on {}, but the network builds on {}",
                our_ledger,
                network_ledger
            );
            if self.round.mode().is_proposing() {
                self.bow_out();
            }
            self.round.set_mode(Mode::WrongLedger);
            Event::publish(
                &self.event_publisher,
                Event::WrongLedger(WrongLedgerEvent {
                    timestamp: SystemTime::now(),
                    our_ledger,
                    network_ledger,
                }),
            );
        }

        // 3. Switch once the network's ledger has quorum and we have it.
        if !self.quorum.accept(network_support, self.round.validators()) {
            return;
        }
        match self.ledger(&network_ledger) {
            Ok(ledger) => self.switch_ledger(now, ledger),
            Err(ConsensusError::LedgerNotFound) => {
                log::debug!("Waiting for ledger {}", network_ledger)
            }
            Err(error) => log::warn!("Cannot switch to ledger {}: {:?}", network_ledger, error),
        }
    }

    fn bow_out(&mut self) {
        let (position, close_time) = match self.round.our_position() {
            Some(position) => (position.set.hash(), position.close_time),
            None => (CryptoHash::zero(), NetClockTime::new(0)),
        };
        let proposal = LedgerProposal::bow_out(
            &self.keypair,
            self.round.prev_ledger_hash(),
            position,
            close_time,
        );
        self.sender.broadcast(proposal);
    }

    // Abandon the current round, and start a new one on `ledger`.
    fn switch_ledger(&mut self, now: Instant, ledger: Arc<Ledger>) {
        let from = self.round.prev_ledger_hash();
        log::warn!(
            "Switching from ledger {} to ledger {} with sequence {}",
            from,
            ledger.hash(),
            ledger.seq()
        );

        let carried: Vec<Transaction> = self
            .open_ledger
            .transactions()
            .values()
            .chain(self.open_ledger.held())
            .cloned()
            .collect();
        self.last_closed = ledger.clone();
        self.open_ledger = OpenLedger::reopen(ledger.clone(), carried);
        self.proposals.retire(&from);

        Event::publish(
            &self.event_publisher,
            Event::SwitchLedger(SwitchLedgerEvent {
                timestamp: SystemTime::now(),
                from,
                to: ledger.hash(),
                ledger_seq: ledger.seq(),
            }),
        );
        self.start_round(now, true);
    }

    /* ↓↓↓ Transaction sets, validations and worker results ↓↓↓ */

    fn acquire_tx_set(&mut self, hash: CryptoHash) {
        if self.acquirer.acquire(hash) {
            Event::publish(
                &self.event_publisher,
                Event::AcquireTxSet(AcquireTxSetEvent {
                    timestamp: SystemTime::now(),
                    tx_set: hash,
                }),
            );
        }
    }

    fn poll_acquisitions(&mut self) {
        for nodes in self.acquirer.poll(self.fetcher.as_mut()) {
            self.worker.submit(Job::AssembleTxSet(nodes));
        }
    }

    // Remember `set`, and make its nodes available to peers.
    fn publish_tx_set(&mut self, set: &Arc<TxSet>) {
        for (hash, bytes) in set.nodes() {
            self.fetcher.got(hash, bytes);
        }
        self.tx_sets.insert(set.hash(), set.clone());
    }

    fn tally_validation(&mut self, validation: Validation) {
        match self
            .validations
            .add(validation, self.round.validators(), self.quorum.as_ref())
        {
            Ok(Some((ledger_seq, ledger_hash))) => {
                log::debug!("Ledger {} with sequence {} is fully validated", ledger_hash, ledger_seq);
                Event::publish(
                    &self.event_publisher,
                    Event::FullyValidateLedger(FullyValidateLedgerEvent {
                        timestamp: SystemTime::now(),
                        ledger_seq,
                        ledger_hash,
                    }),
                )
            }
            Ok(None) => (),
            Err(rejection) => log::trace!("Ignoring validation: {:?}", rejection),
        }
    }

    fn drain_worker_results(&mut self, now: Instant, net_time: NetClockTime) {
        while let Some(result) = self.worker.try_recv_result() {
            match result {
                JobResult::LedgerBuilt {
                    round,
                    ledger,
                    report,
                } => {
                    if round != self.round.id() || self.round.phase() != Phase::Finished {
                        log::debug!(
                            "Discarding ledger {} built for round {}",
                            ledger.hash(),
                            round.int()
                        );
                        continue;
                    }
                    self.accept_ledger(now, net_time, Arc::new(ledger), report);
                }
                JobResult::TxSetAssembled { hash, result } => match result {
                    Ok(set) => {
                        log::debug!("Acquired transaction set {}", hash);
                        self.tx_sets.insert(hash, Arc::new(set));
                        if self.round.phase() == Phase::Establishing {
                            self.refresh_disputes(now);
                        }
                    }
                    Err(error) => {
                        log::warn!(
                            "Discarding transaction set {}: {:?}",
                            hash,
                            ConsensusError::from(error)
                        )
                    }
                },
            }
        }
    }

    fn publish_start_round(&self) {
        Event::publish(
            &self.event_publisher,
            Event::StartRound(StartRoundEvent {
                timestamp: SystemTime::now(),
                round: self.round.id(),
                prev_ledger: self.round.prev_ledger_hash(),
                ledger_seq: self.round.prev_ledger().seq() + 1,
                mode: self.round.mode(),
            }),
        );
    }
}

fn initial_mode(validating: bool, validators: &ValidatorSet, me: &VerifyingKey) -> Mode {
    if validating && validators.contains(me) {
        Mode::Proposing
    } else {
        Mode::Observing
    }
}
