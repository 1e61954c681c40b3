/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Applying single transactions, and whole transaction sets in canonical order with retry passes.

use std::sync::Arc;

use crate::{
    canonical_set::CanonicalTxSet,
    entry_cache::LedgerEntryCache,
    ledger::snapshot::{AppliedTransaction, Ledger},
    types::{
        data_types::{CloseResolution, CryptoHash, NetClockTime, TxID},
        transaction::Transaction,
    },
};

use super::{
    result::{ApplyOutcome, ResultCategory, TxResultCode},
    transactors,
};

/// Apply `transaction` to `cache` as the transaction at position `tx_index` of the ledger being built.
///
/// The transaction is applied on a duplicate of `cache`, which replaces `cache` only if the transaction
/// is included. If `retry_assured` is set, a transaction that could only claim its fee is not included,
/// and is reported as [`Retry`](ApplyOutcome::Retry) instead: it may fully succeed in a later pass.
pub fn apply_transaction(
    cache: &mut LedgerEntryCache,
    transaction: &Transaction,
    tx_index: u32,
    retry_assured: bool,
) -> ApplyOutcome {
    let tx_id = transaction.id();

    // 1. Attempt the transaction in isolation.
    let mut attempt = cache.duplicate();
    let code = transactors::apply(&mut attempt, transaction);
    log::trace!(
        "Applied {} {} at index {}: {:?}",
        transaction.kind_name(),
        tx_id,
        tx_index,
        code
    );

    match code.category() {
        ResultCategory::Success => {
            let metadata = attempt.compute_metadata(tx_id, code, tx_index);
            *cache = attempt;
            ApplyOutcome::Applied { code, metadata }
        }

        ResultCategory::ClaimedFee if retry_assured => ApplyOutcome::Retry(code),

        // 2. Throw the partial effects away, and only charge the fee.
        ResultCategory::ClaimedFee => {
            let mut claim = cache.duplicate();
            if let Err(claim_code) = transactors::claim_fee(&mut claim, transaction) {
                // The transaction got as far as the transactor, so the fee is always claimable.
                log::error!(
                    "Failed to claim the fee of {} after {:?}: {:?}",
                    tx_id,
                    code,
                    claim_code
                );
                return ApplyOutcome::Excluded(TxResultCode::BadLedger);
            }
            let metadata = claim.compute_metadata(tx_id, code, tx_index);
            *cache = claim;
            ApplyOutcome::Applied { code, metadata }
        }

        ResultCategory::Retry => ApplyOutcome::Retry(code),

        ResultCategory::Failure | ResultCategory::Malformed => ApplyOutcome::Excluded(code),
    }
}

/// A transaction that did not make it into a ledger, and why.
#[derive(Clone, Debug)]
pub struct ExcludedTransaction {
    pub tx_id: TxID,
    pub transaction: Transaction,
    pub result: TxResultCode,
}

/// The outcome of applying a set of transactions.
#[derive(Clone, Debug, Default)]
pub struct ApplyReport {
    /// Included transactions, in the order they were applied.
    pub applied: Vec<AppliedTransaction>,
    /// Transactions that were dropped, including those still waiting to be retried when passes ran out,
    /// which are recorded with [`TxResultCode::RetriesExhausted`].
    pub excluded: Vec<ExcludedTransaction>,
    /// Transactions still waiting to be retried when passes ran out. They may apply to a later ledger.
    pub retriable: Vec<Transaction>,
}

impl ApplyReport {
    pub fn applied_ids(&self) -> impl Iterator<Item = TxID> + '_ {
        self.applied.iter().map(|applied| applied.metadata.tx_id)
    }

    pub fn excluded_result(&self, tx_id: &TxID) -> Option<TxResultCode> {
        self.excluded
            .iter()
            .find(|excluded| excluded.tx_id == *tx_id)
            .map(|excluded| excluded.result)
    }
}

/// Apply the transactions of `set` to `cache` in canonical order.
///
/// ## Passes
///
/// Transactions that ask to be retried are kept in `set` and attempted again in the next pass, up to
/// `max_passes` passes. During the first `retry_passes + 1` passes, transactions that could only claim
/// their fee are retried too, since a transaction later in the order may fund them. Applying stops early
/// once a pass that does not retry claimed-fee results changes nothing.
///
/// When this returns, `set` holds the transactions that were still waiting to be retried.
pub fn apply_canonical(
    cache: &mut LedgerEntryCache,
    set: &mut CanonicalTxSet,
    max_passes: u32,
    retry_passes: u32,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    let mut certain_retry = true;

    for pass in 0..max_passes {
        let mut changes = 0;

        for key in set.keys() {
            let Some(transaction) = set.get(&key) else {
                continue;
            };
            let tx_index = report.applied.len() as u32;
            match apply_transaction(cache, transaction, tx_index, certain_retry) {
                ApplyOutcome::Applied { metadata, .. } => {
                    if let Some(transaction) = set.remove(&key) {
                        report.applied.push(AppliedTransaction {
                            transaction,
                            metadata,
                        });
                    }
                    changes += 1;
                }
                ApplyOutcome::Excluded(result) => {
                    if let Some(transaction) = set.remove(&key) {
                        report.excluded.push(ExcludedTransaction {
                            tx_id: transaction.id(),
                            transaction,
                            result,
                        });
                    }
                }
                ApplyOutcome::Retry(_) => (),
            }
        }

        log::debug!(
            "Apply pass {}: {} applied, {} waiting",
            pass,
            changes,
            set.len()
        );

        if changes == 0 && !certain_retry {
            break;
        }
        if !certain_retry || pass >= retry_passes {
            certain_retry = false;
        }
    }

    for (_, tx_id, transaction) in set.iter() {
        report.excluded.push(ExcludedTransaction {
            tx_id: *tx_id,
            transaction: transaction.clone(),
            result: TxResultCode::RetriesExhausted,
        });
        report.retriable.push(transaction.clone());
    }

    report
}

/// Build the ledger that follows `parent` by applying `transactions` in the canonical order salted by
/// `salt`.
#[allow(clippy::too_many_arguments)]
pub fn build_ledger(
    parent: &Arc<Ledger>,
    transactions: impl IntoIterator<Item = Transaction>,
    salt: CryptoHash,
    close_time: NetClockTime,
    close_resolution: CloseResolution,
    close_agree: bool,
    max_passes: u32,
    retry_passes: u32,
) -> (Ledger, ApplyReport) {
    let mut set = CanonicalTxSet::new(salt);
    set.extend(transactions);

    let mut cache = LedgerEntryCache::new(parent.clone());
    let report = apply_canonical(&mut cache, &mut set, max_passes, retry_passes);

    let ledger = Ledger::derive(
        parent,
        cache.into_updates(),
        report.applied.clone(),
        close_time,
        close_resolution,
        close_agree,
    );
    (ledger, report)
}
