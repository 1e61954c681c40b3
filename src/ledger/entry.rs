/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Ledger entries: keyed records of typed fields.
//!
//! Every entry is a [`LedgerEntry`] holding a map from [`Field`] to [`FieldValue`]. Which fields appear in
//! transaction metadata, and when, is decided by each field's [`MetaFlags`].

use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::BTreeMap;

use crate::types::data_types::{AccountID, CryptoHash, EntryKey, LedgerSequence, TxID};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum LedgerEntryType {
    AccountRoot,
    TrustLine,
    DirectoryNode,
    Offer,
}

impl LedgerEntryType {
    /// Whether entries of this type record the last transaction that touched them.
    pub fn is_threaded(&self) -> bool {
        match self {
            LedgerEntryType::AccountRoot | LedgerEntryType::TrustLine | LedgerEntryType::Offer => {
                true
            }
            LedgerEntryType::DirectoryNode => false,
        }
    }
}

/// Names of the fields an entry may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum Field {
    // Common.
    Flags,
    PreviousTxnID,
    PreviousTxnLgrSeq,

    // Account roots and offers.
    Account,
    Balance,
    Sequence,
    OwnerCount,

    // Trust lines.
    LowAccount,
    HighAccount,
    LowLimit,
    HighLimit,
    LowNode,
    HighNode,

    // Directory pages.
    Owner,
    RootIndex,
    Indexes,
    IndexNext,
    IndexPrevious,

    // Offers.
    TakerPays,
    TakerGets,
    OwnerNode,
}

/// Bit set deciding in which metadata sections a field is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetaFlags(u8);

impl MetaFlags {
    pub const NEVER: MetaFlags = MetaFlags(0x00);
    /// Original value when it changes.
    pub const CHANGE_ORIG: MetaFlags = MetaFlags(0x01);
    /// New value when it changes.
    pub const CHANGE_NEW: MetaFlags = MetaFlags(0x02);
    /// Final value when the entry is deleted.
    pub const DELETE_FINAL: MetaFlags = MetaFlags(0x04);
    /// Value when the entry is created.
    pub const CREATE: MetaFlags = MetaFlags(0x08);
    /// Value whenever the entry is affected.
    pub const ALWAYS: MetaFlags = MetaFlags(0x10);
    pub const DEFAULT: MetaFlags = MetaFlags(0x01 | 0x02 | 0x04 | 0x08);

    pub const fn union(self, other: MetaFlags) -> MetaFlags {
        MetaFlags(self.0 | other.0)
    }

    pub const fn intersects(&self, other: MetaFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl Field {
    pub fn meta_flags(&self) -> MetaFlags {
        match self {
            Field::PreviousTxnID | Field::PreviousTxnLgrSeq => MetaFlags::DELETE_FINAL,
            Field::Indexes => MetaFlags::NEVER,
            Field::RootIndex => MetaFlags::ALWAYS,
            _ => MetaFlags::DEFAULT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum FieldValue {
    U32(u32),
    U64(u64),
    Amount(i64),
    Hash(CryptoHash),
    Account(AccountID),
    Hashes(Vec<CryptoHash>),
}

impl FieldValue {
    /// Whether the value equals the zero value of its type.
    pub fn is_default(&self) -> bool {
        match self {
            FieldValue::U32(v) => *v == 0,
            FieldValue::U64(v) => *v == 0,
            FieldValue::Amount(v) => *v == 0,
            FieldValue::Hash(v) => v.is_zero(),
            FieldValue::Account(v) => *v == AccountID::default(),
            FieldValue::Hashes(v) => v.is_empty(),
        }
    }
}

/// A keyed record of typed fields.
///
/// Absent numeric fields read as zero, which lets directory and threading code treat "unset" and "zero"
/// alike.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LedgerEntry {
    entry_type: LedgerEntryType,
    key: EntryKey,
    fields: BTreeMap<Field, FieldValue>,
}

impl LedgerEntry {
    pub fn new(entry_type: LedgerEntryType, key: EntryKey) -> Self {
        Self {
            entry_type,
            key,
            fields: BTreeMap::new(),
        }
    }

    pub fn entry_type(&self) -> LedgerEntryType {
        self.entry_type
    }

    pub fn key(&self) -> EntryKey {
        self.key
    }

    pub fn fields(&self) -> impl Iterator<Item = (&Field, &FieldValue)> {
        self.fields.iter()
    }

    pub fn field(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn has_matching_field(&self, field: Field, value: &FieldValue) -> bool {
        self.fields.get(&field) == Some(value)
    }

    pub fn set(&mut self, field: Field, value: FieldValue) {
        self.fields.insert(field, value);
    }

    pub fn clear(&mut self, field: Field) {
        self.fields.remove(&field);
    }

    pub fn u32(&self, field: Field) -> u32 {
        match self.fields.get(&field) {
            Some(FieldValue::U32(v)) => *v,
            _ => 0,
        }
    }

    pub fn set_u32(&mut self, field: Field, value: u32) {
        self.set(field, FieldValue::U32(value))
    }

    pub fn u64(&self, field: Field) -> u64 {
        match self.fields.get(&field) {
            Some(FieldValue::U64(v)) => *v,
            _ => 0,
        }
    }

    pub fn set_u64(&mut self, field: Field, value: u64) {
        self.set(field, FieldValue::U64(value))
    }

    pub fn amount(&self, field: Field) -> i64 {
        match self.fields.get(&field) {
            Some(FieldValue::Amount(v)) => *v,
            _ => 0,
        }
    }

    pub fn set_amount(&mut self, field: Field, value: i64) {
        self.set(field, FieldValue::Amount(value))
    }

    pub fn hash(&self, field: Field) -> CryptoHash {
        match self.fields.get(&field) {
            Some(FieldValue::Hash(v)) => *v,
            _ => CryptoHash::zero(),
        }
    }

    pub fn set_hash(&mut self, field: Field, value: CryptoHash) {
        self.set(field, FieldValue::Hash(value))
    }

    pub fn account(&self, field: Field) -> Option<AccountID> {
        match self.fields.get(&field) {
            Some(FieldValue::Account(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn set_account(&mut self, field: Field, value: AccountID) {
        self.set(field, FieldValue::Account(value))
    }

    pub fn hashes(&self, field: Field) -> &[CryptoHash] {
        match self.fields.get(&field) {
            Some(FieldValue::Hashes(v)) => v,
            _ => &[],
        }
    }

    pub fn set_hashes(&mut self, field: Field, value: Vec<CryptoHash>) {
        self.set(field, FieldValue::Hashes(value))
    }

    /// The accounts whose transaction history chain should record changes to this entry: the `Account` of
    /// a single-owner entry, or both sides of a trust line.
    pub fn owners(&self) -> Vec<AccountID> {
        match self.entry_type {
            LedgerEntryType::AccountRoot | LedgerEntryType::DirectoryNode => Vec::new(),
            LedgerEntryType::Offer => self.account(Field::Account).into_iter().collect(),
            LedgerEntryType::TrustLine => self
                .account(Field::LowAccount)
                .into_iter()
                .chain(self.account(Field::HighAccount))
                .collect(),
        }
    }

    /// Record that transaction `tx_id` in ledger `ledger_seq` touched this entry.
    ///
    /// Returns the previously recorded transaction and ledger, or `None` if this entry was already
    /// threaded to `tx_id`.
    pub fn thread(
        &mut self,
        tx_id: TxID,
        ledger_seq: LedgerSequence,
    ) -> Option<(TxID, LedgerSequence)> {
        let prev_tx_id = self.hash(Field::PreviousTxnID);
        if prev_tx_id == tx_id {
            return None;
        }
        let prev_ledger_seq = LedgerSequence::new(self.u32(Field::PreviousTxnLgrSeq));
        self.set_hash(Field::PreviousTxnID, tx_id);
        self.set_u32(Field::PreviousTxnLgrSeq, ledger_seq.int());
        Some((prev_tx_id, prev_ledger_seq))
    }
}
