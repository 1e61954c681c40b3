/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Recently closed ledgers, by hash.

use std::sync::Arc;

use crate::types::{bounded_cache::BoundedCache, data_types::CryptoHash};

use super::snapshot::Ledger;

/// A size-bounded store of recently closed ledgers.
///
/// Older ledgers are evicted least-recently-used first. Callers that need a ledger that has been evicted
/// must acquire it again (e.g., from the node store).
pub struct LedgerHistory {
    ledgers: BoundedCache<CryptoHash, Arc<Ledger>>,
}

impl LedgerHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            ledgers: BoundedCache::new(capacity),
        }
    }

    pub fn insert(&mut self, ledger: Arc<Ledger>) {
        if let Some((evicted, _)) = self.ledgers.insert(ledger.hash(), ledger) {
            log::trace!("Evicted ledger {} from history", evicted);
        }
    }

    pub fn get(&mut self, hash: &CryptoHash) -> Option<Arc<Ledger>> {
        self.ledgers.get(hash).cloned()
    }

    pub fn contains(&self, hash: &CryptoHash) -> bool {
        self.ledgers.contains(hash)
    }

    /// Get a ledger in history without affecting eviction order.
    pub fn peek(&self, hash: &CryptoHash) -> Option<&Arc<Ledger>> {
        self.ledgers.peek(hash)
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}
