/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The latest position of each trusted peer.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    time::{Duration, Instant},
};

use ed25519_dalek::VerifyingKey;

use crate::types::{
    bounded_cache::BoundedCache,
    data_types::{CryptoHash, ProposeSequence, TotalPower, VerifyingKeyBytes},
    signed_messages::SignedMessage,
    validator_set::ValidatorSet,
};

use super::messages::LedgerProposal;

/// A peer's latest proposal, and when it was received.
#[derive(Clone, Debug)]
pub struct PeerPosition {
    pub peer: VerifyingKey,
    pub proposal: LedgerProposal,
    pub received: Instant,
}

/// How a proposal changed the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ingested {
    /// The proposal is now the peer's position.
    Position,
    /// The peer left the round it proposed in.
    BowOut,
}

/// Why a proposal was ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalRejection {
    /// The proposal is not signed by the validator it names.
    BadSignature,
    /// The proposer is not a trusted validator.
    Untrusted,
    /// The proposal is not newer than a proposal already accepted from the peer in the same round.
    StaleSequence,
    /// The peer has already left the round the proposal is in.
    DeadNode,
}

/// Tracks the current position of each trusted peer.
///
/// ## Superseding
///
/// A peer has at most one position. A new proposal from a peer replaces its position if its sequence is
/// strictly greater than that of every proposal accepted from the peer in the same round, i.e., on the
/// same previous ledger. A proposal that the peer has already superseded, even by a proposal on another
/// previous ledger, is therefore refused when it is received again. Positions are never merged.
///
/// The highest sequence accepted from each peer is remembered for the last [`RECENT_ROUNDS`] previous
/// ledgers, including those of retired rounds.
pub struct ProposalStore {
    positions: HashMap<VerifyingKey, PeerPosition>,
    // Peers that bowed out of the round building on a given previous ledger.
    dead_nodes: BTreeSet<(CryptoHash, VerifyingKeyBytes)>,
    // Highest sequence accepted from each peer, per previous ledger.
    highest_seqs: BoundedCache<CryptoHash, HashMap<VerifyingKeyBytes, ProposeSequence>>,
}

/// Number of previous ledgers for which the highest accepted sequence of each peer is remembered.
pub const RECENT_ROUNDS: usize = 256;

impl Default for ProposalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProposalStore {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            dead_nodes: BTreeSet::new(),
            highest_seqs: BoundedCache::new(RECENT_ROUNDS),
        }
    }

    /// Check `proposal` and, if it is acceptable, make it its peer's position.
    pub fn ingest(
        &mut self,
        proposal: LedgerProposal,
        validators: &ValidatorSet,
        now: Instant,
    ) -> Result<Ingested, ProposalRejection> {
        // 1. Check the signature and the proposer's trust.
        let peer = proposal
            .verifying_key()
            .map_err(|_| ProposalRejection::BadSignature)?;
        if !proposal.is_correct(&peer) {
            return Err(ProposalRejection::BadSignature);
        }
        if !validators.contains(&peer) {
            return Err(ProposalRejection::Untrusted);
        }
        if self
            .dead_nodes
            .contains(&(proposal.prev_ledger, proposal.peer))
        {
            return Err(ProposalRejection::DeadNode);
        }

        // 2. Check that the proposal is newer than anything the peer has proposed in its round.
        let highest = self
            .highest_seqs
            .peek(&proposal.prev_ledger)
            .and_then(|seqs| seqs.get(&proposal.peer));
        if highest.is_some_and(|highest| proposal.propose_seq <= *highest) {
            return Err(ProposalRejection::StaleSequence);
        }
        let mut seqs = self
            .highest_seqs
            .remove(&proposal.prev_ledger)
            .unwrap_or_default();
        seqs.insert(proposal.peer, proposal.propose_seq);
        self.highest_seqs.insert(proposal.prev_ledger, seqs);

        // 3. A bow out removes the peer from the round for good.
        if proposal.is_bow_out() {
            log::debug!(
                "Peer {} bowed out of the round after {}",
                hex_prefix(&proposal.peer),
                proposal.prev_ledger
            );
            self.dead_nodes.insert((proposal.prev_ledger, proposal.peer));
            self.positions.remove(&peer);
            return Ok(Ingested::BowOut);
        }

        self.positions.insert(
            peer,
            PeerPosition {
                peer,
                proposal,
                received: now,
            },
        );
        Ok(Ingested::Position)
    }

    pub fn position(&self, peer: &VerifyingKey) -> Option<&PeerPosition> {
        self.positions.get(peer)
    }

    /// Get the positions of peers in the round that builds on `prev_ledger`, leaving out positions
    /// received more than `freshness` before `now`.
    pub fn positions_for(
        &self,
        prev_ledger: &CryptoHash,
        now: Instant,
        freshness: Duration,
    ) -> Vec<&PeerPosition> {
        self.positions
            .values()
            .filter(|position| {
                position.proposal.prev_ledger == *prev_ledger
                    && is_fresh(position.received, now, freshness)
            })
            .collect()
    }

    /// Sum up, per previous ledger, the power of the trusted peers whose fresh positions build on it.
    pub fn prev_ledger_support(
        &self,
        validators: &ValidatorSet,
        now: Instant,
        freshness: Duration,
    ) -> BTreeMap<CryptoHash, TotalPower> {
        let mut support: BTreeMap<CryptoHash, TotalPower> = BTreeMap::new();
        for position in self.positions.values() {
            if !is_fresh(position.received, now, freshness) {
                continue;
            }
            if let Some(power) = validators.power(&position.peer) {
                *support.entry(position.proposal.prev_ledger).or_default() += *power;
            }
        }
        support
    }

    /// Check whether `peer` has bowed out of the round that builds on `prev_ledger`.
    pub fn is_dead(&self, prev_ledger: &CryptoHash, peer: &VerifyingKey) -> bool {
        self.dead_nodes.contains(&(*prev_ledger, peer.to_bytes()))
    }

    /// Drop positions received more than `freshness` before `now`.
    pub fn expire(&mut self, now: Instant, freshness: Duration) {
        self.positions
            .retain(|_, position| is_fresh(position.received, now, freshness));
    }

    /// Drop every position in, and every record of peers leaving, the round that built on `prev_ledger`.
    /// The sequences accepted in the round are still remembered, so its proposals cannot be replayed.
    pub fn retire(&mut self, prev_ledger: &CryptoHash) {
        self.positions
            .retain(|_, position| position.proposal.prev_ledger != *prev_ledger);
        self.dead_nodes
            .retain(|(dead_in, _)| dead_in != prev_ledger);
    }

    /// Drop the positions of peers that are no longer trusted.
    pub fn retain_trusted(&mut self, validators: &ValidatorSet) {
        self.positions.retain(|peer, _| validators.contains(peer));
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn is_fresh(received: Instant, now: Instant, freshness: Duration) -> bool {
    now.saturating_duration_since(received) <= freshness
}

fn hex_prefix(bytes: &VerifyingKeyBytes) -> String {
    bytes[0..4].iter().map(|byte| format!("{:02x}", byte)).collect()
}
