use ed25519_dalek::{Signer, SigningKey};
use ledger_consensus::{
    consensus::validations::Validation,
    ledger::{
        entry::{Field, LedgerEntry, LedgerEntryType},
        keys,
        snapshot::Ledger,
    },
    proposal_store::LedgerProposal,
    types::{
        data_types::{
            AccountID, CloseResolution, CryptoHash, LedgerSequence, NetClockTime, Power,
            ProposeSequence, SignatureBytes,
        },
        signed_messages::SignedMessage,
        transaction::{Transaction, TransactionKind},
        validator_set::ValidatorSet,
    },
};
use rand_core::OsRng;

pub(crate) const GENESIS_CLOSE_TIME: u64 = 1_000_000;

pub(crate) const STARTING_BALANCE: i64 = 100_000;

pub(crate) const FEE: i64 = 10;

pub(crate) fn account(n: u8) -> AccountID {
    AccountID::new([n; 20])
}

pub(crate) fn account_root(account: AccountID, balance: i64) -> LedgerEntry {
    let mut entry = LedgerEntry::new(LedgerEntryType::AccountRoot, keys::account_root(&account));
    entry.set_account(Field::Account, account);
    entry.set_amount(Field::Balance, balance);
    entry.set_u32(Field::Sequence, 1);
    entry
}

/// A genesis ledger in which each of `accounts` holds [`STARTING_BALANCE`].
pub(crate) fn genesis(accounts: &[AccountID]) -> Ledger {
    genesis_at(accounts, GENESIS_CLOSE_TIME)
}

pub(crate) fn genesis_at(accounts: &[AccountID], close_time: u64) -> Ledger {
    Ledger::genesis(
        accounts
            .iter()
            .map(|account| account_root(*account, STARTING_BALANCE)),
        NetClockTime::new(close_time),
        CloseResolution::new(30),
    )
}

pub(crate) fn payment(from: AccountID, sequence: u32, to: AccountID, amount: i64) -> Transaction {
    Transaction::new(
        from,
        sequence,
        FEE,
        TransactionKind::Payment {
            destination: to,
            amount,
        },
    )
}

pub(crate) fn balance(ledger: &Ledger, account: &AccountID) -> Option<i64> {
    ledger
        .entry(&keys::account_root(account))
        .map(|entry| entry.amount(Field::Balance))
}

pub(crate) fn signing_keys(n: usize) -> Vec<SigningKey> {
    let mut csprg = OsRng {};
    (0..n).map(|_| SigningKey::generate(&mut csprg)).collect()
}

/// A validator set in which every key has a power of 1.
pub(crate) fn validator_set<'a>(keys: impl IntoIterator<Item = &'a SigningKey>) -> ValidatorSet {
    let mut validators = ValidatorSet::new();
    for key in keys {
        validators.put(&key.verifying_key(), Power::new(1));
    }
    validators
}

pub(crate) fn signed_proposal(
    key: &SigningKey,
    prev_ledger: CryptoHash,
    position: CryptoHash,
    close_time: NetClockTime,
    propose_seq: ProposeSequence,
) -> LedgerProposal {
    let mut proposal = LedgerProposal {
        peer: key.verifying_key().to_bytes(),
        prev_ledger,
        position,
        close_time,
        propose_seq,
        signature: SignatureBytes::new([0u8; 64]),
    };
    proposal.signature = SignatureBytes::new(key.sign(&proposal.message_bytes()).to_bytes());
    proposal
}

pub(crate) fn signed_validation(
    key: &SigningKey,
    ledger_hash: CryptoHash,
    ledger_seq: LedgerSequence,
) -> Validation {
    let mut validation = Validation {
        validator: key.verifying_key().to_bytes(),
        ledger_hash,
        ledger_seq,
        sign_time: NetClockTime::new(GENESIS_CLOSE_TIME),
        signature: SignatureBytes::new([0u8; 64]),
    };
    validation.signature = SignatureBytes::new(key.sign(&validation.message_bytes()).to_bytes());
    validation
}
