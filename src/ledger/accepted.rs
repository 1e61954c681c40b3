/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Reports on accepted ledgers for downstream subscribers.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use std::{collections::BTreeSet, sync::Arc};

use crate::{
    applier::result::TxResultCode,
    entry_cache::metadata::AffectedNode,
    types::{
        bounded_cache::BoundedCache,
        crypto_primitives::{hash_prefix, prefixed_hash},
        data_types::{AccountID, TxID},
    },
};

use super::{entry::FieldValue, snapshot::Ledger};

/// Memoised human-readable renderings of account ids.
///
/// An address is the character `b` followed by the URL-safe base64 encoding of the account id and a
/// 4-byte checksum.
pub struct AddressBook {
    cache: BoundedCache<AccountID, String>,
}

impl AddressBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::new(capacity),
        }
    }

    pub fn human_address(&mut self, account: &AccountID) -> String {
        self.cache
            .get_or_insert_with(*account, render_address)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn render_address(account: &AccountID) -> String {
    let checksum = prefixed_hash(hash_prefix::ADDRESS_CHECKSUM, &[&account.bytes()]).bytes();
    let mut payload = account.bytes().to_vec();
    payload.extend_from_slice(&checksum[0..4]);
    format!("b{}", URL_SAFE_NO_PAD.encode(payload))
}

#[derive(Clone, Debug)]
pub struct AcceptedTransaction {
    pub tx_id: TxID,
    pub tx_index: u32,
    pub result: TxResultCode,
    /// Human-readable addresses of every account named in the transaction's affected nodes.
    pub affected_accounts: Vec<String>,
}

/// A ledger that has been accepted by consensus, with a summary of each transaction it includes.
#[derive(Clone, Debug)]
pub struct AcceptedLedger {
    pub ledger: Arc<Ledger>,
    pub transactions: Vec<AcceptedTransaction>,
}

impl AcceptedLedger {
    pub fn new(ledger: Arc<Ledger>, address_book: &mut AddressBook) -> Self {
        let transactions = ledger
            .transactions()
            .iter()
            .map(|applied| {
                let accounts = affected_accounts(&applied.metadata.affected_nodes);
                AcceptedTransaction {
                    tx_id: applied.metadata.tx_id,
                    tx_index: applied.metadata.tx_index,
                    result: applied.metadata.result,
                    affected_accounts: accounts
                        .iter()
                        .map(|account| address_book.human_address(account))
                        .collect(),
                }
            })
            .collect();

        Self {
            ledger,
            transactions,
        }
    }

    pub fn applied_tx_count(&self) -> usize {
        self.transactions.len()
    }
}

fn affected_accounts(nodes: &[AffectedNode]) -> BTreeSet<AccountID> {
    let mut accounts = BTreeSet::new();
    for node in nodes {
        for (_, value) in node
            .previous_fields
            .iter()
            .chain(node.final_fields.iter())
            .chain(node.new_fields.iter())
        {
            if let FieldValue::Account(account) = value {
                accounts.insert(*account);
            }
        }
    }
    accounts
}
