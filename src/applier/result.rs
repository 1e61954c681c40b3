/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Results of applying a transaction.
//!
//! Every [`TxResultCode`] falls into one [`ResultCategory`], which decides what happens to the
//! transaction:
//!
//! |Category|Included in the ledger?|Fee charged?|Retried?|
//! |---|---|---|---|
//! |[`Success`](ResultCategory::Success)|Yes|Yes|No|
//! |[`ClaimedFee`](ResultCategory::ClaimedFee)|Yes|Yes|Only while retry passes remain|
//! |[`Retry`](ResultCategory::Retry)|No|No|Yes, until passes are exhausted|
//! |[`Failure`](ResultCategory::Failure)|No|No|No|
//! |[`Malformed`](ResultCategory::Malformed)|No|No|No|

use borsh::{BorshDeserialize, BorshSerialize};

use crate::entry_cache::metadata::RawMetadata;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum TxResultCode {
    Success,

    // Claimed fee.
    /// The sender cannot fund the payment after its fee.
    UnfundedPayment,
    /// The destination does not exist, and the payment is too small to create it.
    NoDestinationInsufficient,
    /// The owner cannot fund the reserve of one more owned entry.
    InsufficientReserveOffer,
    /// A new trust line would exceed the owner's reserve.
    NoLineInsufficientReserve,
    /// The trust line's counterparty does not exist.
    NoDestination,
    /// The owner's directory cannot grow any further.
    DirFull,
    /// The offer to cancel does not exist.
    NoEntry,
    /// The trust line to clear does not exist.
    NoLineRedundant,

    // Retry.
    /// The sending account does not exist (yet).
    NoAccount,
    /// The transaction's sequence is ahead of the account's.
    PreSequence,
    /// The account cannot pay the fee (yet).
    InsufficientFeeBalance,

    // Failure.
    /// The transaction's sequence is behind the account's: it, or another with the same sequence, has
    /// already been applied.
    PastSequence,
    /// The ledger is corrupt.
    BadLedger,
    /// The transaction could still not be applied after the last retry pass.
    RetriesExhausted,

    // Malformed.
    BadFee,
    BadAmount,
    BadOffer,
    DestinationIsSource,
    BadLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultCategory {
    /// Included in the ledger with its effects.
    Success,
    /// Included in the ledger, but only its fee was charged.
    ClaimedFee,
    /// Might succeed if applied later, e.g., after another transaction.
    Retry,
    /// Cannot succeed against this ledger.
    Failure,
    /// Can never succeed against any ledger.
    Malformed,
}

impl TxResultCode {
    pub fn category(&self) -> ResultCategory {
        use TxResultCode::*;
        match self {
            Success => ResultCategory::Success,
            UnfundedPayment
            | NoDestinationInsufficient
            | InsufficientReserveOffer
            | NoLineInsufficientReserve
            | NoDestination
            | DirFull
            | NoEntry
            | NoLineRedundant => ResultCategory::ClaimedFee,
            NoAccount | PreSequence | InsufficientFeeBalance => ResultCategory::Retry,
            PastSequence | BadLedger | RetriesExhausted => ResultCategory::Failure,
            BadFee | BadAmount | BadOffer | DestinationIsSource | BadLimit => {
                ResultCategory::Malformed
            }
        }
    }

    /// Whether transactions with this result are included in the ledger.
    pub fn is_included(&self) -> bool {
        matches!(
            self.category(),
            ResultCategory::Success | ResultCategory::ClaimedFee
        )
    }
}

/// What applying one transaction to a cache did.
#[derive(Clone, Debug)]
pub enum ApplyOutcome {
    /// The transaction was included; the cache holds its effects.
    Applied {
        code: TxResultCode,
        metadata: RawMetadata,
    },

    /// The transaction was not applied, but might be in a later pass. The cache is unchanged.
    Retry(TxResultCode),

    /// The transaction was not applied, and never will be against this ledger. The cache is unchanged.
    Excluded(TxResultCode),
}

impl ApplyOutcome {
    pub fn code(&self) -> TxResultCode {
        match self {
            ApplyOutcome::Applied { code, .. } => *code,
            ApplyOutcome::Retry(code) | ApplyOutcome::Excluded(code) => *code,
        }
    }
}
