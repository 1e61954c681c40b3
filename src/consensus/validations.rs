/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Validations: signed statements by validators that they built a given ledger, and the tally that
//! decides when a ledger is fully validated.

use std::collections::HashMap;

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{SignatureError, VerifyingKey};

use crate::types::{
    crypto_primitives::{hash_prefix, Keypair},
    data_types::{
        CryptoHash, LedgerSequence, NetClockTime, SignatureBytes, TotalPower, VerifyingKeyBytes,
    },
    signed_messages::SignedMessage,
    validator_set::ValidatorSet,
};

use super::quorum::QuorumPolicy;

/// A validator's signed statement that it built the ledger with hash `ledger_hash` and sequence
/// `ledger_seq`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Validation {
    pub validator: VerifyingKeyBytes,
    pub ledger_hash: CryptoHash,
    pub ledger_seq: LedgerSequence,
    pub sign_time: NetClockTime,
    pub signature: SignatureBytes,
}

impl Validation {
    pub(crate) fn new(
        me: &Keypair,
        ledger_hash: CryptoHash,
        ledger_seq: LedgerSequence,
        sign_time: NetClockTime,
    ) -> Validation {
        let validator = me.public().to_bytes();
        let signature = me.sign(&validation_bytes(
            &validator,
            &ledger_hash,
            &ledger_seq,
            &sign_time,
        ));

        Validation {
            validator,
            ledger_hash,
            ledger_seq,
            sign_time,
            signature,
        }
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, SignatureError> {
        VerifyingKey::from_bytes(&self.validator)
    }
}

impl SignedMessage for Validation {
    fn message_bytes(&self) -> Vec<u8> {
        validation_bytes(
            &self.validator,
            &self.ledger_hash,
            &self.ledger_seq,
            &self.sign_time,
        )
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

fn validation_bytes(
    validator: &VerifyingKeyBytes,
    ledger_hash: &CryptoHash,
    ledger_seq: &LedgerSequence,
    sign_time: &NetClockTime,
) -> Vec<u8> {
    (
        hash_prefix::VALIDATION,
        *validator,
        *ledger_hash,
        *ledger_seq,
        *sign_time,
    )
        .try_to_vec()
        .unwrap()
}

/// Why a validation was ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationRejection {
    BadSignature,
    Untrusted,
    /// The validator already validated a ledger with the same or a greater sequence.
    Stale,
}

/// The latest validation of each trusted validator.
///
/// A ledger is fully validated when the validators whose latest validation is of it form a quorum.
/// Fully validated ledgers only ever move forward in sequence.
#[derive(Default)]
pub struct ValidationTally {
    latest: HashMap<VerifyingKey, Validation>,
    last_fully_validated: Option<(LedgerSequence, CryptoHash)>,
}

impl ValidationTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `validation` and check whether it makes its ledger fully validated.
    ///
    /// Returns `Ok(Some((seq, hash)))` the first time the ledger reaches a quorum of validations, if it is
    /// more recent than the last fully validated ledger.
    pub fn add(
        &mut self,
        validation: Validation,
        validators: &ValidatorSet,
        quorum: &dyn QuorumPolicy,
    ) -> Result<Option<(LedgerSequence, CryptoHash)>, ValidationRejection> {
        let validator = validation
            .verifying_key()
            .map_err(|_| ValidationRejection::BadSignature)?;
        if !validation.is_correct(&validator) {
            return Err(ValidationRejection::BadSignature);
        }
        if !validators.contains(&validator) {
            return Err(ValidationRejection::Untrusted);
        }
        if let Some(current) = self.latest.get(&validator) {
            if validation.ledger_seq <= current.ledger_seq {
                return Err(ValidationRejection::Stale);
            }
        }

        let (ledger_seq, ledger_hash) = (validation.ledger_seq, validation.ledger_hash);
        self.latest.insert(validator, validation);

        if let Some((validated_seq, _)) = self.last_fully_validated {
            if ledger_seq <= validated_seq {
                return Ok(None);
            }
        }

        if quorum.accept(self.support(&ledger_hash, validators), validators) {
            self.last_fully_validated = Some((ledger_seq, ledger_hash));
            return Ok(Some((ledger_seq, ledger_hash)));
        }
        Ok(None)
    }

    /// Get the total power of trusted validators whose latest validation is of `ledger_hash`.
    pub fn support(&self, ledger_hash: &CryptoHash, validators: &ValidatorSet) -> TotalPower {
        validators.power_of(
            self.latest
                .iter()
                .filter(|(_, validation)| validation.ledger_hash == *ledger_hash)
                .map(|(validator, _)| validator),
        )
    }

    pub fn latest(&self, validator: &VerifyingKey) -> Option<&Validation> {
        self.latest.get(validator)
    }

    pub fn last_fully_validated(&self) -> Option<(LedgerSequence, CryptoHash)> {
        self.last_fully_validated
    }

    /// Drop the validations of validators that are no longer trusted.
    pub fn retain_trusted(&mut self, validators: &ValidatorSet) {
        self.latest
            .retain(|validator, _| validators.contains(validator));
    }
}
