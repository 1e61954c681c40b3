/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Close time rounding, agreement and resolution adaptation.
//!
//! Validators' clocks differ, so close times are only compared after being rounded to the round's close
//! time resolution. The resolution adapts to how well validators agreed on close times recently: it gets
//! coarser after a ledger whose close time was not agreed, and finer (but only every
//! [`INCREASE_RESOLUTION_EVERY`] ledgers) after agreed ones.

use std::collections::BTreeMap;

use crate::types::data_types::{CloseResolution, LedgerSequence, NetClockTime};

/// Possible close time resolutions, in seconds, from finest to coarsest.
pub const CLOSE_RESOLUTIONS: [u32; 6] = [10, 20, 30, 60, 90, 120];

/// After agreed ledgers, the resolution gets finer when the sequence of the new ledger is a multiple of
/// this.
pub const INCREASE_RESOLUTION_EVERY: u32 = 8;

/// After ledgers without agreement, the resolution gets coarser when the sequence of the new ledger is a
/// multiple of this.
pub const DECREASE_RESOLUTION_EVERY: u32 = 1;

/// Round `close_time` to the nearest multiple of `resolution`, rounding halves up. The zero close time
/// stays zero.
pub fn round_close_time(close_time: NetClockTime, resolution: CloseResolution) -> NetClockTime {
    if close_time.secs() == 0 {
        return close_time;
    }
    let resolution = resolution.secs().max(1) as u64;
    let shifted = close_time.secs() + resolution / 2;
    NetClockTime::new(shifted - (shifted % resolution))
}

/// The close time a ledger actually records: `close_time` rounded to `resolution`, but always strictly
/// after its parent's close time.
pub fn effective_close_time(
    close_time: NetClockTime,
    resolution: CloseResolution,
    parent_close_time: NetClockTime,
) -> NetClockTime {
    if close_time.secs() == 0 {
        return close_time;
    }
    round_close_time(close_time, resolution).max(parent_close_time + 1)
}

/// The close time resolution of ledger `ledger_seq`, given the resolution of its parent and whether its
/// parent's close time was agreed on.
pub fn next_resolution(
    previous: CloseResolution,
    previous_agree: bool,
    ledger_seq: LedgerSequence,
) -> CloseResolution {
    let Some(index) = CLOSE_RESOLUTIONS
        .iter()
        .position(|secs| *secs == previous.secs())
    else {
        return previous;
    };

    if !previous_agree && ledger_seq.int() % DECREASE_RESOLUTION_EVERY == 0 {
        if let Some(coarser) = CLOSE_RESOLUTIONS.get(index + 1) {
            return CloseResolution::new(*coarser);
        }
    }

    if previous_agree && ledger_seq.int() % INCREASE_RESOLUTION_EVERY == 0 && index > 0 {
        return CloseResolution::new(CLOSE_RESOLUTIONS[index - 1]);
    }

    previous
}

/// Votes on the close time of a round: the number of participants whose close time rounds to each value.
#[derive(Clone, Debug, Default)]
pub struct CloseTimeVotes {
    votes: BTreeMap<NetClockTime, u32>,
    participants: u32,
}

impl CloseTimeVotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, close_time: NetClockTime, resolution: CloseResolution) {
        *self
            .votes
            .entry(round_close_time(close_time, resolution))
            .or_default() += 1;
        self.participants += 1;
    }

    pub fn participants(&self) -> u32 {
        self.participants
    }

    pub fn count(&self, rounded: &NetClockTime) -> u32 {
        self.votes.get(rounded).copied().unwrap_or(0)
    }

    /// Get the most common rounded close time, choosing the largest one between equally common values, and
    /// whether at least `consensus_percent` percent of participants voted for it.
    ///
    /// Returns `None` if there are no votes.
    pub fn winner(&self, consensus_percent: u32) -> Option<(NetClockTime, bool)> {
        let mut winner: Option<(NetClockTime, u32)> = None;
        for (close_time, count) in &self.votes {
            match winner {
                Some((_, best)) if *count < best => (),
                _ => winner = Some((*close_time, *count)),
            }
        }

        winner.map(|(close_time, count)| {
            let agreed = count as u64 * 100 >= self.participants as u64 * consensus_percent as u64;
            (close_time, agreed)
        })
    }
}
