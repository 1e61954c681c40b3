/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumeration of the messages validators exchange.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    consensus::validations::Validation, proposal_store::LedgerProposal,
    types::transaction::Transaction,
};

/// All message variants exchanged between nodes.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// A validator's position in a round. See [`LedgerProposal`].
    Proposal(LedgerProposal),

    /// A validator's statement that it built a ledger. See [`Validation`].
    Validation(Validation),

    /// A transaction relayed for inclusion in the open ledger.
    Transaction(Transaction),
}

impl Message {
    /// Get the size of the message's Borsh encoding.
    pub fn size(&self) -> u64 {
        self.try_to_vec().map_or(0, |bytes| bytes.len() as u64)
    }
}

impl From<LedgerProposal> for Message {
    fn from(value: LedgerProposal) -> Self {
        Message::Proposal(value)
    }
}

impl From<Validation> for Message {
    fn from(value: Validation) -> Self {
        Message::Validation(value)
    }
}

impl From<Transaction> for Message {
    fn from(value: Transaction) -> Self {
        Message::Transaction(value)
    }
}
