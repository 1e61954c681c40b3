/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Inert data types that are sent around and inspected, but have no active behavior. These types follow
//! the newtype pattern and the API for using them is defined in this module.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign, BitXor, Sub},
    time::SystemTime,
};

/// A 256-bit content hash. Used as the identity of ledgers, transaction sets, transactions and as the key of
/// every ledger entry.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl BitXor for CryptoHash {
    type Output = CryptoHash;

    fn bitxor(self, rhs: CryptoHash) -> Self::Output {
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ rhs.0[i];
        }
        CryptoHash(out)
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0[0..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Key of a ledger entry.
pub type EntryKey = CryptoHash;

/// Identity of a transaction: the hash of its encoding.
pub type TxID = CryptoHash;

/// 160-bit identifier of an account.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct AccountID([u8; 20]);

impl AccountID {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 20] {
        self.0
    }

    /// Widen the account id into 256 bits (right-aligned), so that it can be mixed with hashes.
    pub fn widened(&self) -> CryptoHash {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(&self.0);
        CryptoHash::new(bytes)
    }
}

impl Debug for AccountID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Sequence number of a ledger.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct LedgerSequence(u32);

impl LedgerSequence {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for LedgerSequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u32> for LedgerSequence {
    type Output = LedgerSequence;

    fn add(self, rhs: u32) -> Self::Output {
        LedgerSequence(self.0 + rhs)
    }
}

/// Network time: whole seconds since the Unix Epoch. All close times are expressed in this clock.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct NetClockTime(u64);

impl NetClockTime {
    pub const fn new(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn secs(&self) -> u64 {
        self.0
    }

    /// Read the local system clock.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }
}

impl Display for NetClockTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for NetClockTime {
    type Output = NetClockTime;

    fn add(self, rhs: u64) -> Self::Output {
        NetClockTime(self.0 + rhs)
    }
}

/// Granularity (in seconds) to which close times are rounded before they are compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CloseResolution(u32);

impl CloseResolution {
    pub const fn new(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn secs(&self) -> u32 {
        self.0
    }
}

/// Sequence of a proposer's position within one round. Starts at zero and increases each time the
/// proposer changes its position.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct ProposeSequence(u32);

impl ProposeSequence {
    /// Sequence number a proposer uses to announce that it is leaving the round.
    pub const BOW_OUT: ProposeSequence = ProposeSequence(u32::MAX);

    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }

    pub fn is_bow_out(&self) -> bool {
        *self == Self::BOW_OUT
    }

    /// The sequence of the next position in the round. Saturates just below [`BOW_OUT`](Self::BOW_OUT).
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1).min(u32::MAX - 1))
    }
}

/// Voting weight of a validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Power(u64);

impl Power {
    pub fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Total power obtained via summing up the [`Power`]s of a set of validators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct TotalPower(u128);

impl TotalPower {
    pub fn new(int: u128) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Power> for TotalPower {
    fn add_assign(&mut self, rhs: Power) {
        self.0.add_assign(rhs.0 as u128)
    }
}

impl AddAssign<TotalPower> for TotalPower {
    fn add_assign(&mut self, rhs: TotalPower) {
        self.0.add_assign(rhs.0)
    }
}

impl Sub<TotalPower> for TotalPower {
    type Output = TotalPower;

    fn sub(self, rhs: TotalPower) -> Self::Output {
        TotalPower(self.0.saturating_sub(rhs.0))
    }
}

/// Signature represented in bytes.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes(..)")
    }
}

/// Verifying key of a validator, represented in bytes so that it can be serialized with Borsh.
pub type VerifyingKeyBytes = [u8; 32];

/// Identifier of one execution of the consensus state machine. Results that arrive for a round that is
/// not the current one are stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoundID(u64);

impl RoundID {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}
