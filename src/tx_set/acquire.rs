/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Acquisition of transaction sets proposed by peers.
//!
//! [`TxSetAcquirer`] pulls the nodes of every set it is acquiring through a [`NodeFetcher`]. A node the
//! fetcher does not have yet leaves its set pending, and is asked for again on the next
//! [`poll`](TxSetAcquirer::poll). Polling never blocks.
//!
//! Once every node of a set has been pulled, the acquirer hands the raw nodes out as [`FetchedNodes`].
//! Decoding and checking the leaves ([`FetchedNodes::assemble`]) is left to the caller, which may do it
//! off the consensus thread.

use std::collections::BTreeMap;

use crate::types::data_types::{CryptoHash, TxID};

use super::types::{NodeFetcher, TxSet, TxSetError};

/// The nodes of one transaction set, fetched but not yet decoded.
#[derive(Clone, Debug)]
pub struct FetchedNodes {
    pub hash: CryptoHash,
    pub leaves: Vec<(TxID, Vec<u8>)>,
}

impl FetchedNodes {
    /// Decode every leaf, checking that each decodes into the transaction its root node names.
    pub fn assemble(self) -> Result<TxSet, TxSetError> {
        let mut transactions = Vec::with_capacity(self.leaves.len());
        for (tx_id, bytes) in &self.leaves {
            transactions.push(TxSet::decode_leaf(bytes, tx_id)?);
        }
        let set = TxSet::new(transactions);
        if set.hash() != self.hash {
            return Err(TxSetError::HashMismatch);
        }
        Ok(set)
    }
}

#[derive(Default)]
struct PendingSet {
    // `None` until the root node has been fetched.
    ids: Option<Vec<TxID>>,
    leaves: BTreeMap<TxID, Vec<u8>>,
    polls: u32,
}

#[derive(Default)]
pub struct TxSetAcquirer {
    pending: BTreeMap<CryptoHash, PendingSet>,
}

impl TxSetAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start acquiring the set `hash`. Returns whether acquisition was not already underway.
    pub fn acquire(&mut self, hash: CryptoHash) -> bool {
        if self.pending.contains_key(&hash) {
            return false;
        }
        log::debug!("Acquiring transaction set {}", hash);
        self.pending.insert(hash, PendingSet::default());
        true
    }

    pub fn is_acquiring(&self, hash: &CryptoHash) -> bool {
        self.pending.contains_key(hash)
    }

    pub fn pending(&self) -> impl Iterator<Item = &CryptoHash> {
        self.pending.keys()
    }

    pub fn abandon(&mut self, hash: &CryptoHash) {
        self.pending.remove(hash);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Pull every missing node of every pending set through `fetcher`, and return the sets whose nodes
    /// are now complete. Returned sets are no longer pending.
    pub fn poll(&mut self, fetcher: &mut dyn NodeFetcher) -> Vec<FetchedNodes> {
        let mut complete = Vec::new();

        for (hash, pending) in self.pending.iter_mut() {
            pending.polls += 1;

            // 1. Pull the root node, which names the leaves.
            if pending.ids.is_none() {
                let Some(bytes) = fetcher.have(hash) else {
                    continue;
                };
                match TxSet::decode_root(&bytes, hash) {
                    Ok(ids) => pending.ids = Some(ids),
                    Err(error) => {
                        log::warn!("Bad root node for transaction set {}: {:?}", hash, error);
                        continue;
                    }
                }
            }

            // 2. Pull the leaves that are still missing.
            let Some(ids) = &pending.ids else {
                continue;
            };
            for tx_id in ids {
                if pending.leaves.contains_key(tx_id) {
                    continue;
                }
                if let Some(bytes) = fetcher.have(tx_id) {
                    pending.leaves.insert(*tx_id, bytes);
                }
            }

            if pending.leaves.len() == ids.len() {
                log::debug!(
                    "Fetched transaction set {} after {} polls",
                    hash,
                    pending.polls
                );
                complete.push(FetchedNodes {
                    hash: *hash,
                    leaves: ids
                        .iter()
                        .filter_map(|tx_id| {
                            pending
                                .leaves
                                .get(tx_id)
                                .map(|bytes| (*tx_id, bytes.clone()))
                        })
                        .collect(),
                });
            }
        }

        for fetched in &complete {
            self.pending.remove(&fetched.hash);
        }
        complete
    }
}
