/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the proposals that validators broadcast to announce their positions.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{SignatureError, VerifyingKey};

use crate::types::{
    crypto_primitives::{hash_prefix, Keypair},
    data_types::{CryptoHash, NetClockTime, ProposeSequence, SignatureBytes, VerifyingKeyBytes},
    signed_messages::SignedMessage,
};

/// A validator's signed position in the round that builds on `prev_ledger`: the transaction set
/// `position` should become the next ledger, closed at `close_time`.
///
/// Each time a validator changes its position within a round it proposes again with the next
/// `propose_seq`. A proposal with [`ProposeSequence::BOW_OUT`] announces that the validator is leaving
/// the round, and that its earlier positions should no longer be counted.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LedgerProposal {
    pub peer: VerifyingKeyBytes,
    pub prev_ledger: CryptoHash,
    pub position: CryptoHash,
    pub close_time: NetClockTime,
    pub propose_seq: ProposeSequence,
    pub signature: SignatureBytes,
}

impl LedgerProposal {
    pub(crate) fn new(
        me: &Keypair,
        prev_ledger: CryptoHash,
        position: CryptoHash,
        close_time: NetClockTime,
        propose_seq: ProposeSequence,
    ) -> LedgerProposal {
        let peer = me.public().to_bytes();
        let message = proposal_bytes(&peer, &prev_ledger, &position, &close_time, &propose_seq);
        let signature = me.sign(&message);

        LedgerProposal {
            peer,
            prev_ledger,
            position,
            close_time,
            propose_seq,
            signature,
        }
    }

    /// Create a proposal that announces that `me` is leaving the round that builds on `prev_ledger`.
    pub(crate) fn bow_out(
        me: &Keypair,
        prev_ledger: CryptoHash,
        position: CryptoHash,
        close_time: NetClockTime,
    ) -> LedgerProposal {
        LedgerProposal::new(
            me,
            prev_ledger,
            position,
            close_time,
            ProposeSequence::BOW_OUT,
        )
    }

    pub fn is_bow_out(&self) -> bool {
        self.propose_seq.is_bow_out()
    }

    /// Get the key of the validator that claims to have signed this proposal.
    pub fn verifying_key(&self) -> Result<VerifyingKey, SignatureError> {
        VerifyingKey::from_bytes(&self.peer)
    }
}

impl SignedMessage for LedgerProposal {
    fn message_bytes(&self) -> Vec<u8> {
        proposal_bytes(
            &self.peer,
            &self.prev_ledger,
            &self.position,
            &self.close_time,
            &self.propose_seq,
        )
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

fn proposal_bytes(
    peer: &VerifyingKeyBytes,
    prev_ledger: &CryptoHash,
    position: &CryptoHash,
    close_time: &NetClockTime,
    propose_seq: &ProposeSequence,
) -> Vec<u8> {
    (
        hash_prefix::PROPOSAL,
        *peer,
        *prev_ledger,
        *position,
        *close_time,
        *propose_seq,
    )
        .try_to_vec()
        .unwrap()
}
