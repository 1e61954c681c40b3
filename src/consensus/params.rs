/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Timing and threshold policy of the consensus state machine.
//!
//! Every value here is a policy parameter: the defaults are suited to a network of validators with
//! round trip times well under a second, and may be tuned freely as long as every validator uses the
//! same values.

use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::types::data_types::CloseResolution;

/// Policy parameters of the [`ConsensusEngine`](super::engine::ConsensusEngine).
///
/// ## Dispute thresholds
///
/// `dispute_thresholds` is a list of `(round age percent, support percent)` steps, in ascending order
/// of age. The round's age is expressed as a percentage of the previous round's duration (but of at
/// least `avalanche_min_round_time`). A proposing node votes to include a disputed transaction if the
/// percentage of trusted peers that include it exceeds the support percent of the last step whose age
/// has been reached. The required support therefore tightens as the round ages, which pushes validators
/// to converge.
///
/// ## Close time
///
/// A close time is agreed on when at least `close_time_consensus_percent` percent of the participants'
/// close times round to the same value. Once the round's age passes `close_time_patience_percent`,
/// consensus may be declared without close time agreement, in which case the ledger takes its parent's
/// close time plus one second.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building [ConsensusParameters]. Every parameter is optional, and defaults to the
    value documented on its setter.
"))]
pub struct ConsensusParameters {
    #[builder(default = Duration::from_secs(2), setter(doc = "Set the minimum time a ledger stays open before closing with transactions. Default: 2 s."))]
    pub ledger_min_close: Duration,

    #[builder(default = Duration::from_secs(15), setter(doc = "Set the time after which a ledger closes even with no transactions. Default: 15 s."))]
    pub ledger_idle_interval: Duration,

    #[builder(default = Duration::from_millis(1950), setter(doc = "Set the minimum time spent establishing before consensus can be declared. Default: 1950 ms."))]
    pub ledger_min_consensus: Duration,

    #[builder(default = Duration::from_secs(1), setter(doc = "Set how long this node's position must stay unchanged before consensus can be declared. Default: 1 s."))]
    pub min_stable_time: Duration,

    #[builder(default = Duration::from_secs(5), setter(doc = "Set the floor of the round duration that round age percentages are relative to. Default: 5 s."))]
    pub avalanche_min_round_time: Duration,

    #[builder(default = vec![(0, 50), (50, 65), (85, 70), (200, 95)], setter(doc = "Set the dispute threshold schedule, as (round age percent, support percent) steps. Default: [(0, 50), (50, 65), (85, 70), (200, 95)]."))]
    pub dispute_thresholds: Vec<(u32, u32)>,

    #[builder(default = 75, setter(doc = "Set the percentage of participants that must agree on a rounded close time. Default: 75."))]
    pub close_time_consensus_percent: u32,

    #[builder(default = 200, setter(doc = "Set the round age percent after which consensus may be declared without close time agreement. Default: 200."))]
    pub close_time_patience_percent: u32,

    #[builder(default = 80, setter(doc = "Set the threshold of the default quorum policy, in percent of the total power of trusted validators. Default: 80."))]
    pub quorum_percent: u32,

    #[builder(default = Duration::from_secs(20), setter(doc = "Set the age after which a peer's position is no longer counted. Default: 20 s."))]
    pub proposal_freshness: Duration,

    #[builder(default = Duration::from_secs(12), setter(doc = "Set how often an unchanged position is broadcast again, so that peers do not consider it stale. Default: 12 s."))]
    pub propose_interval: Duration,

    #[builder(default = 3, setter(doc = "Set the maximum number of passes over an agreed set when applying it. Default: 3."))]
    pub max_apply_passes: u32,

    #[builder(default = 1, setter(doc = "Set the number of passes during which transactions that could only claim their fee are retried. Default: 1."))]
    pub retry_passes: u32,

    #[builder(default = CloseResolution::new(30), setter(doc = "Set the close time resolution of the first round. Default: 30 s."))]
    pub initial_close_resolution: CloseResolution,

    #[builder(default = 256, setter(doc = "Set the number of recent ledgers kept in memory. Default: 256."))]
    pub ledger_history_capacity: usize,

    #[builder(default = 1024, setter(doc = "Set the number of human-readable addresses memoised. Default: 1024."))]
    pub address_book_capacity: usize,
}

impl Default for ConsensusParameters {
    fn default() -> Self {
        ConsensusParameters::builder().build()
    }
}

impl ConsensusParameters {
    /// Get the support percent a disputed transaction needs in a round that is `age_percent` old.
    pub fn dispute_threshold(&self, age_percent: u32) -> u32 {
        self.dispute_thresholds
            .iter()
            .take_while(|(age, _)| *age <= age_percent)
            .last()
            .map(|(_, support)| *support)
            .unwrap_or(50)
    }
}
