/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! State of one consensus round.
//!
//! A [`ConsensusRound`] is created when a round starts and dropped when the round is retired or
//! abandoned. Only the [`ConsensusEngine`](super::engine::ConsensusEngine) that owns it ever touches it,
//! so every change to the round's phase, position and disputes is serialized by ownership.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::{Duration, Instant},
};

use ed25519_dalek::VerifyingKey;

use crate::{
    ledger::snapshot::Ledger,
    tx_set::TxSet,
    types::{
        data_types::{CloseResolution, CryptoHash, NetClockTime, ProposeSequence, RoundID, TxID},
        validator_set::ValidatorSet,
    },
};

use super::{
    close_time::next_resolution,
    disputes::DisputedTx,
    types::{Mode, Phase},
};

/// This node's current position in a round.
#[derive(Clone, Debug)]
pub struct OurPosition {
    pub set: Arc<TxSet>,
    /// Rounded to the round's close time resolution.
    pub close_time: NetClockTime,
    pub propose_seq: ProposeSequence,
    /// When the position last changed.
    pub changed_at: Instant,
    /// When the position was last broadcast, if it ever was.
    pub last_broadcast: Option<Instant>,
}

pub struct ConsensusRound {
    id: RoundID,
    prev_ledger: Arc<Ledger>,
    phase: Phase,
    mode: Mode,

    // Frozen at the start of the round. Updates wait for the next round.
    validators: ValidatorSet,

    round_start: Instant,
    establish_start: Option<Instant>,
    close_resolution: CloseResolution,
    have_close_time_consensus: bool,

    our_position: Option<OurPosition>,
    // Sets of peer positions that our disputes were computed against.
    compared: BTreeSet<CryptoHash>,
    disputes: BTreeMap<TxID, DisputedTx>,
}

impl ConsensusRound {
    pub(crate) fn new(
        id: RoundID,
        prev_ledger: Arc<Ledger>,
        mode: Mode,
        validators: ValidatorSet,
        now: Instant,
    ) -> Self {
        let close_resolution = next_resolution(
            prev_ledger.close_resolution(),
            prev_ledger.close_agree(),
            prev_ledger.seq() + 1,
        );

        Self {
            id,
            prev_ledger,
            phase: Phase::Open,
            mode,
            validators,
            round_start: now,
            establish_start: None,
            close_resolution,
            have_close_time_consensus: false,
            our_position: None,
            compared: BTreeSet::new(),
            disputes: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> RoundID {
        self.id
    }

    pub fn prev_ledger(&self) -> &Arc<Ledger> {
        &self.prev_ledger
    }

    pub fn prev_ledger_hash(&self) -> CryptoHash {
        self.prev_ledger.hash()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move the round to `phase`.
    ///
    /// # Panics
    ///
    /// Panics if `phase` is not strictly later than the current phase.
    pub(crate) fn advance(&mut self, phase: Phase, now: Instant) {
        if phase <= self.phase {
            panic!(
                "Round {} cannot move from phase {} to phase {}",
                self.id.int(),
                self.phase,
                phase
            );
        }
        if phase == Phase::Establishing {
            self.establish_start = Some(now);
        }
        self.phase = phase;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    /// Time since the round started, i.e., since the previous ledger was accepted.
    pub fn open_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.round_start)
    }

    /// Time since the round started establishing. Zero if it has not.
    pub fn establish_time(&self, now: Instant) -> Duration {
        match self.establish_start {
            Some(establish_start) => now.saturating_duration_since(establish_start),
            None => Duration::ZERO,
        }
    }

    /// How long the round has been establishing, in percent of `previous_round_time` (but of at least
    /// `min_round_time`).
    pub fn age_percent(
        &self,
        now: Instant,
        previous_round_time: Duration,
        min_round_time: Duration,
    ) -> u32 {
        let base = previous_round_time.max(min_round_time).as_millis().max(1);
        let percent = self.establish_time(now).as_millis() * 100 / base;
        percent.min(u32::MAX as u128) as u32
    }

    pub fn close_resolution(&self) -> CloseResolution {
        self.close_resolution
    }

    pub fn have_close_time_consensus(&self) -> bool {
        self.have_close_time_consensus
    }

    pub(crate) fn set_close_time_consensus(&mut self, agreed: bool) {
        self.have_close_time_consensus = agreed;
    }

    pub fn our_position(&self) -> Option<&OurPosition> {
        self.our_position.as_ref()
    }

    /// Take `set` and `close_time` as this node's position. Returns the new position.
    ///
    /// The first position of a round has the initial propose sequence, and each later position the next
    /// one.
    pub(crate) fn take_position(
        &mut self,
        set: Arc<TxSet>,
        close_time: NetClockTime,
        now: Instant,
    ) -> &OurPosition {
        let propose_seq = match &self.our_position {
            Some(current) => current.propose_seq.next(),
            None => ProposeSequence::init(),
        };
        let last_broadcast = self
            .our_position
            .as_ref()
            .and_then(|current| current.last_broadcast);

        self.our_position.insert(OurPosition {
            set,
            close_time,
            propose_seq,
            changed_at: now,
            last_broadcast,
        })
    }

    /// Give our unchanged position the next propose sequence, so that peers accept it again as fresh.
    /// Does not count as a change of position.
    pub(crate) fn refresh_position(&mut self) {
        if let Some(position) = &mut self.our_position {
            position.propose_seq = position.propose_seq.next();
        }
    }

    pub(crate) fn mark_broadcast(&mut self, now: Instant) {
        if let Some(position) = &mut self.our_position {
            position.last_broadcast = Some(now);
        }
    }

    /// Check whether our position has stayed unchanged for at least `min_stable_time`.
    pub fn is_stable(&self, now: Instant, min_stable_time: Duration) -> bool {
        match &self.our_position {
            Some(position) => now.saturating_duration_since(position.changed_at) >= min_stable_time,
            None => false,
        }
    }

    pub fn has_compared(&self, set_hash: &CryptoHash) -> bool {
        self.compared.contains(set_hash)
    }

    /// Create a dispute for every transaction that is in exactly one of our set and `other`. Returns the
    /// ids of the disputes created.
    pub(crate) fn create_disputes(&mut self, other: &TxSet) -> Vec<TxID> {
        self.compared.insert(other.hash());
        let Some(position) = &self.our_position else {
            return Vec::new();
        };
        if position.set.hash() == other.hash() {
            return Vec::new();
        }

        let mut created = Vec::new();
        for (tx_id, (transaction, in_ours)) in position.set.difference(other) {
            if self.disputes.contains_key(&tx_id) {
                continue;
            }
            self.disputes
                .insert(tx_id, DisputedTx::new(transaction, in_ours));
            created.push(tx_id);
        }
        created
    }

    pub fn disputes(&self) -> &BTreeMap<TxID, DisputedTx> {
        &self.disputes
    }

    pub(crate) fn disputes_mut(&mut self) -> &mut BTreeMap<TxID, DisputedTx> {
        &mut self.disputes
    }

    /// Record `peer`'s vote on every dispute, given the set its position proposes.
    pub(crate) fn record_votes(&mut self, peer: VerifyingKey, set: &TxSet) {
        let Some(power) = self.validators.power(&peer).copied() else {
            return;
        };
        for (tx_id, dispute) in self.disputes.iter_mut() {
            dispute.set_vote(peer, set.contains(tx_id), power);
        }
    }

    /// Forget `peer`'s votes on every dispute.
    pub(crate) fn forget_votes(&mut self, peer: &VerifyingKey) {
        for dispute in self.disputes.values_mut() {
            dispute.unvote(peer);
        }
    }

    /// Disputed transactions that this node finally voted to leave out.
    pub fn lost_disputes(&self) -> impl Iterator<Item = &DisputedTx> {
        self.disputes.values().filter(|dispute| !dispute.our_vote())
    }
}
