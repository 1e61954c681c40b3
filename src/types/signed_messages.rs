/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Signed messages exchanged between validators.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use super::data_types::SignatureBytes;

/// Data types that contain: 1. A message, and 2. A digital signature over said message whose
/// correctness can be verified against a `VerifyingKey`.
pub trait SignedMessage: Clone {
    /// Get the bytes that are passed as input into the signing function to form the signature
    /// of the `SignedMessage`.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signature of the `SignedMessage`.
    fn signature_bytes(&self) -> SignatureBytes;

    /// Verify that `signature_bytes` is a signature created by `verifying_key` over `message_bytes`.
    fn is_correct(&self, verifying_key: &VerifyingKey) -> bool {
        let signature = Signature::from_bytes(&self.signature_bytes().bytes());
        verifying_key
            .verify(&self.message_bytes(), &signature)
            .is_ok()
    }
}
