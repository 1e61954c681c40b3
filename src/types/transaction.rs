/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transactions that can be applied to a ledger.
//!
//! A transaction is identified by the hash of its Borsh encoding (see [`Transaction::id`]). Signing of
//! transactions happens outside of this crate: transactions that reach the consensus core are assumed to
//! carry valid authorization.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{hash_prefix, prefixed_hash},
    data_types::{AccountID, TxID},
};

/// A transaction submitted by `account`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub account: AccountID,
    /// Must equal the account's current sequence number for the transaction to apply.
    pub sequence: u32,
    /// Native units destroyed by applying the transaction.
    pub fee: i64,
    pub kind: TransactionKind,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TransactionKind {
    /// Transfer native units, creating the destination account if it does not exist yet.
    Payment { destination: AccountID, amount: i64 },

    /// Place an offer to exchange `taker_gets` for `taker_pays`.
    OfferCreate { taker_pays: i64, taker_gets: i64 },

    /// Remove the offer placed by this account with sequence number `offer_sequence`.
    OfferCancel { offer_sequence: u32 },

    /// Set the limit this account extends to `counterparty` on their shared trust line.
    TrustSet { counterparty: AccountID, limit: i64 },
}

impl Transaction {
    pub fn new(account: AccountID, sequence: u32, fee: i64, kind: TransactionKind) -> Self {
        Self {
            account,
            sequence,
            fee,
            kind,
        }
    }

    /// Compute the identity of this transaction.
    pub fn id(&self) -> TxID {
        prefixed_hash(hash_prefix::TRANSACTION_ID, &[&self.try_to_vec().unwrap()])
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.try_to_vec().unwrap()
    }

    pub fn from_bytes(bytes: &[u8]) -> std::io::Result<Self> {
        Transaction::try_from_slice(bytes)
    }

    /// Name of the kind of transaction, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            TransactionKind::Payment { .. } => "Payment",
            TransactionKind::OfferCreate { .. } => "OfferCreate",
            TransactionKind::OfferCancel { .. } => "OfferCancel",
            TransactionKind::TrustSet { .. } => "TrustSet",
        }
    }
}
