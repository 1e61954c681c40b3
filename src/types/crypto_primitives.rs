/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Hashing and signing.
//!
//! Content hashes are SHA-256 ([`sha2`]) over a four-byte prefix naming the kind of object hashed.
//! Validators sign proposals and validations with Ed25519 keys ([`ed25519_dalek`]).

use super::data_types::{CryptoHash, SignatureBytes};

pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// Domain separation prefixes. Every hashed object starts with one of these so that, e.g., a transaction
/// can never hash to the same value as a ledger header.
pub mod hash_prefix {
    pub const TRANSACTION_ID: [u8; 4] = *b"TXN\0";
    pub const TX_SET: [u8; 4] = *b"TXS\0";
    pub const LEDGER_HEADER: [u8; 4] = *b"LWR\0";
    pub const STATE_ROOT: [u8; 4] = *b"MLN\0";
    pub const PROPOSAL: [u8; 4] = *b"PRP\0";
    pub const VALIDATION: [u8; 4] = *b"VAL\0";
    pub const ACCOUNT_ROOT: [u8; 4] = *b"ACT\0";
    pub const OWNER_DIR: [u8; 4] = *b"OWN\0";
    pub const DIR_NODE: [u8; 4] = *b"DIR\0";
    pub const OFFER: [u8; 4] = *b"OFR\0";
    pub const TRUST_LINE: [u8; 4] = *b"RST\0";
    pub const ADDRESS_CHECKSUM: [u8; 4] = *b"ADR\0";
}

/// Hash `parts` in order, after the 4-byte domain `prefix`.
pub fn prefixed_hash(prefix: [u8; 4], parts: &[&[u8]]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update(prefix);
    for part in parts {
        hasher.update(part);
    }
    CryptoHash::new(hasher.finalize().into())
}

/// The node's own signing key. Proposals and validations are [signed](Self::sign) with it, and its
/// [public](Self::public) half identifies the node to its peers.
#[derive(Clone)]
pub(crate) struct Keypair(pub(crate) SigningKey);

impl Keypair {
    pub(crate) fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign `message`, which is usually the borsh encoding of a signed message's fields.
    pub(crate) fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    pub(crate) fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }
}
