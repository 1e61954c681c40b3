/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The open ledger: transactions submitted since the last ledger closed, speculatively applied on top of
//! it.
//!
//! The transactions the open ledger includes form this node's initial position in the next round.
//! Transactions that ask to be retried are held, and attempted again whenever another transaction
//! applies.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    entry_cache::LedgerEntryCache,
    ledger::snapshot::Ledger,
    types::{data_types::TxID, transaction::Transaction},
};

use super::{implementation::apply_transaction, result::ApplyOutcome};

pub struct OpenLedger {
    cache: LedgerEntryCache,
    included: BTreeMap<TxID, Transaction>,
    held: BTreeMap<TxID, Transaction>,
}

impl OpenLedger {
    /// Open a new ledger on top of `last_closed`.
    pub fn new(last_closed: Arc<Ledger>) -> Self {
        Self {
            cache: LedgerEntryCache::new(last_closed),
            included: BTreeMap::new(),
            held: BTreeMap::new(),
        }
    }

    /// Open a new ledger on top of `last_closed`, and apply `carried` to it.
    pub fn reopen(last_closed: Arc<Ledger>, carried: impl IntoIterator<Item = Transaction>) -> Self {
        let mut open_ledger = OpenLedger::new(last_closed);
        let mut carried: Vec<Transaction> = carried.into_iter().collect();
        carried.sort_by_key(|transaction| (transaction.account, transaction.sequence));
        for transaction in carried {
            open_ledger.apply(transaction);
        }
        open_ledger
    }

    pub fn base(&self) -> &Arc<Ledger> {
        self.cache.base()
    }

    /// Speculatively apply `transaction`. Returns `None` if the open ledger already includes it.
    pub fn apply(&mut self, transaction: Transaction) -> Option<ApplyOutcome> {
        let tx_id = transaction.id();
        if self.included.contains_key(&tx_id) {
            log::trace!("Transaction {} is already in the open ledger", tx_id);
            return None;
        }

        let outcome = apply_transaction(
            &mut self.cache,
            &transaction,
            self.included.len() as u32,
            false,
        );
        match &outcome {
            ApplyOutcome::Applied { .. } => {
                self.held.remove(&tx_id);
                self.included.insert(tx_id, transaction);
                self.retry_held();
            }
            ApplyOutcome::Retry(code) => {
                log::trace!("Holding transaction {}: {:?}", tx_id, code);
                self.held.insert(tx_id, transaction);
            }
            ApplyOutcome::Excluded(code) => {
                log::debug!("Rejected transaction {}: {:?}", tx_id, code);
                self.held.remove(&tx_id);
            }
        }
        Some(outcome)
    }

    // Attempt every held transaction again, until a round of attempts applies none.
    fn retry_held(&mut self) {
        loop {
            let mut progress = false;
            let held: Vec<(TxID, Transaction)> = self
                .held
                .iter()
                .map(|(tx_id, transaction)| (*tx_id, transaction.clone()))
                .collect();
            for (tx_id, transaction) in held {
                let outcome = apply_transaction(
                    &mut self.cache,
                    &transaction,
                    self.included.len() as u32,
                    false,
                );
                match outcome {
                    ApplyOutcome::Applied { .. } => {
                        self.held.remove(&tx_id);
                        self.included.insert(tx_id, transaction);
                        progress = true;
                    }
                    ApplyOutcome::Excluded(_) => {
                        self.held.remove(&tx_id);
                    }
                    ApplyOutcome::Retry(_) => (),
                }
            }
            if !progress {
                return;
            }
        }
    }

    /// Transactions the open ledger includes, by id.
    pub fn transactions(&self) -> &BTreeMap<TxID, Transaction> {
        &self.included
    }

    /// Transactions that could not apply yet.
    pub fn held(&self) -> impl Iterator<Item = &Transaction> {
        self.held.values()
    }

    pub fn contains(&self, tx_id: &TxID) -> bool {
        self.included.contains_key(tx_id) || self.held.contains_key(tx_id)
    }

    pub fn len(&self) -> usize {
        self.included.len()
    }

    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }
}
