/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The effects of each kind of transaction on a [`LedgerEntryCache`].
//!
//! Applying a transaction goes through three stages:
//! 1. [`preflight`]: checks that only depend on the transaction itself.
//! 2. [`claim_fee`]: checks against the sending account, then charging the fee and consuming the
//!    sequence number.
//! 3. The transactor of the transaction's kind.
//!
//! A transactor that returns anything but [`TxResultCode::Success`] may have left partial effects in the
//! cache. Callers are expected to apply transactions on a
//! [duplicate](crate::entry_cache::LedgerEntryCache::duplicate) and throw it away on failure.

use crate::{
    directory::{self, DirectoryError},
    entry_cache::{EntryHandle, LedgerEntryCache},
    ledger::{
        entry::{Field, LedgerEntryType},
        keys,
    },
    types::{
        data_types::AccountID,
        transaction::{Transaction, TransactionKind},
    },
};

use super::result::TxResultCode;

/// Balance an account must hold to exist.
pub const ACCOUNT_RESERVE: i64 = 200;

/// Additional balance an account must hold for every entry it owns.
pub const OWNER_RESERVE: i64 = 50;

/// `Flags` bit of a trust line whose low account holds a reserve for it.
pub const LOW_RESERVE: u32 = 0x0001;

/// `Flags` bit of a trust line whose high account holds a reserve for it.
pub const HIGH_RESERVE: u32 = 0x0002;

/// Apply every stage of `transaction` to `cache`.
pub(crate) fn apply(cache: &mut LedgerEntryCache, transaction: &Transaction) -> TxResultCode {
    if let Err(code) = preflight(transaction) {
        return code;
    }
    if let Err(code) = claim_fee(cache, transaction) {
        return code;
    }

    match &transaction.kind {
        TransactionKind::Payment {
            destination,
            amount,
        } => payment(cache, &transaction.account, destination, *amount),
        TransactionKind::OfferCreate {
            taker_pays,
            taker_gets,
        } => offer_create(cache, transaction, *taker_pays, *taker_gets),
        TransactionKind::OfferCancel { offer_sequence } => {
            offer_cancel(cache, &transaction.account, *offer_sequence)
        }
        TransactionKind::TrustSet {
            counterparty,
            limit,
        } => trust_set(cache, &transaction.account, counterparty, *limit),
    }
}

/// Check the parts of `transaction` that do not depend on any ledger.
pub(crate) fn preflight(transaction: &Transaction) -> Result<(), TxResultCode> {
    if transaction.fee < 0 {
        return Err(TxResultCode::BadFee);
    }

    match &transaction.kind {
        TransactionKind::Payment {
            destination,
            amount,
        } => {
            if *amount <= 0 {
                return Err(TxResultCode::BadAmount);
            }
            if *destination == transaction.account {
                return Err(TxResultCode::DestinationIsSource);
            }
        }
        TransactionKind::OfferCreate {
            taker_pays,
            taker_gets,
        } => {
            if *taker_pays <= 0 || *taker_gets <= 0 {
                return Err(TxResultCode::BadOffer);
            }
        }
        TransactionKind::OfferCancel { offer_sequence } => {
            if *offer_sequence == 0 || *offer_sequence >= transaction.sequence {
                return Err(TxResultCode::BadOffer);
            }
        }
        TransactionKind::TrustSet {
            counterparty,
            limit,
        } => {
            if *limit < 0 {
                return Err(TxResultCode::BadLimit);
            }
            if *counterparty == transaction.account {
                return Err(TxResultCode::DestinationIsSource);
            }
        }
    }

    Ok(())
}

/// Check that the sending account exists, is at the transaction's sequence number, and can pay the fee.
/// If so, charge the fee and advance the account's sequence number.
pub(crate) fn claim_fee(
    cache: &mut LedgerEntryCache,
    transaction: &Transaction,
) -> Result<(), TxResultCode> {
    let Some(account) = cache.load(
        LedgerEntryType::AccountRoot,
        &keys::account_root(&transaction.account),
    ) else {
        return Err(TxResultCode::NoAccount);
    };

    let sequence = cache.entry(&account).u32(Field::Sequence);
    if transaction.sequence > sequence {
        return Err(TxResultCode::PreSequence);
    }
    if transaction.sequence < sequence {
        return Err(TxResultCode::PastSequence);
    }

    let balance = cache.entry(&account).amount(Field::Balance);
    if balance < transaction.fee {
        return Err(TxResultCode::InsufficientFeeBalance);
    }

    cache.update(&account, |entry| {
        entry.set_amount(Field::Balance, balance - transaction.fee);
        entry.set_u32(Field::Sequence, sequence + 1);
    });
    Ok(())
}

fn payment(
    cache: &mut LedgerEntryCache,
    source: &AccountID,
    destination: &AccountID,
    amount: i64,
) -> TxResultCode {
    let Some(sender) = load_account(cache, source) else {
        return TxResultCode::BadLedger;
    };

    // 1. The sender must keep its reserve after paying.
    let balance = cache.entry(&sender).amount(Field::Balance);
    let reserve = reserve(cache.entry(&sender).u32(Field::OwnerCount));
    if balance.saturating_sub(amount) < reserve {
        return TxResultCode::UnfundedPayment;
    }

    // 2. Credit the destination, creating it if the payment funds its reserve.
    match load_account(cache, destination) {
        Some(receiver) => cache.update(&receiver, |entry| {
            let balance = entry.amount(Field::Balance);
            entry.set_amount(Field::Balance, balance.saturating_add(amount));
        }),
        None => {
            if amount < ACCOUNT_RESERVE {
                return TxResultCode::NoDestinationInsufficient;
            }
            let receiver = cache.create(
                LedgerEntryType::AccountRoot,
                keys::account_root(destination),
            );
            let entry = cache.entry_mut(&receiver);
            entry.set_account(Field::Account, *destination);
            entry.set_amount(Field::Balance, amount);
            entry.set_u32(Field::Sequence, 1);
        }
    }

    // 3. Debit the sender.
    cache.update(&sender, |entry| {
        entry.set_amount(Field::Balance, balance - amount)
    });

    TxResultCode::Success
}

fn offer_create(
    cache: &mut LedgerEntryCache,
    transaction: &Transaction,
    taker_pays: i64,
    taker_gets: i64,
) -> TxResultCode {
    let owner = transaction.account;
    let Some(account) = load_account(cache, &owner) else {
        return TxResultCode::BadLedger;
    };

    // 1. The owner must be able to hold the reserve of one more entry.
    let balance = cache.entry(&account).amount(Field::Balance);
    let owner_count = cache.entry(&account).u32(Field::OwnerCount);
    if balance < reserve(owner_count.saturating_add(1)) {
        return TxResultCode::InsufficientReserveOffer;
    }

    // 2. Link the offer into the owner's directory.
    let offer_key = keys::offer(&owner, transaction.sequence);
    let owner_node = match directory::add(cache, &keys::owner_dir(&owner), offer_key, |page, _| {
        page.set_account(Field::Owner, owner)
    }) {
        Ok(page) => page,
        Err(error) => return directory_failure(error),
    };

    // 3. Create the offer.
    let offer = cache.create(LedgerEntryType::Offer, offer_key);
    let entry = cache.entry_mut(&offer);
    entry.set_account(Field::Account, owner);
    entry.set_u32(Field::Sequence, transaction.sequence);
    entry.set_amount(Field::TakerPays, taker_pays);
    entry.set_amount(Field::TakerGets, taker_gets);
    entry.set_u64(Field::OwnerNode, owner_node);

    cache.increment_owner_count(&owner);
    TxResultCode::Success
}

fn offer_cancel(
    cache: &mut LedgerEntryCache,
    owner: &AccountID,
    offer_sequence: u32,
) -> TxResultCode {
    let offer_key = keys::offer(owner, offer_sequence);
    let Some(offer) = cache.load(LedgerEntryType::Offer, &offer_key) else {
        return TxResultCode::NoEntry;
    };

    let owner_node = cache.entry(&offer).u64(Field::OwnerNode);
    if let Err(error) = directory::delete(
        cache,
        false,
        owner_node,
        &keys::owner_dir(owner),
        &offer_key,
        false,
        false,
    ) {
        return directory_failure(error);
    }

    cache.delete(&offer);
    cache.decrement_owner_count(owner);
    TxResultCode::Success
}

fn trust_set(
    cache: &mut LedgerEntryCache,
    setter: &AccountID,
    counterparty: &AccountID,
    limit: i64,
) -> TxResultCode {
    if load_account(cache, counterparty).is_none() {
        return TxResultCode::NoDestination;
    }
    let Some(account) = load_account(cache, setter) else {
        return TxResultCode::BadLedger;
    };

    let setter_is_low = setter < counterparty;
    let (low, high) = if setter_is_low {
        (*setter, *counterparty)
    } else {
        (*counterparty, *setter)
    };
    let (limit_field, reserve_flag) = if setter_is_low {
        (Field::LowLimit, LOW_RESERVE)
    } else {
        (Field::HighLimit, HIGH_RESERVE)
    };
    let line_key = keys::trust_line(setter, counterparty);

    match cache.load(LedgerEntryType::TrustLine, &line_key) {
        // 1. No line yet: create it, linked into both owners' directories.
        None => {
            if limit == 0 {
                return TxResultCode::NoLineRedundant;
            }

            let balance = cache.entry(&account).amount(Field::Balance);
            let owner_count = cache.entry(&account).u32(Field::OwnerCount);
            if balance < reserve(owner_count.saturating_add(1)) {
                return TxResultCode::NoLineInsufficientReserve;
            }

            let low_node =
                match directory::add(cache, &keys::owner_dir(&low), line_key, |page, _| {
                    page.set_account(Field::Owner, low)
                }) {
                    Ok(page) => page,
                    Err(error) => return directory_failure(error),
                };
            let high_node =
                match directory::add(cache, &keys::owner_dir(&high), line_key, |page, _| {
                    page.set_account(Field::Owner, high)
                }) {
                    Ok(page) => page,
                    Err(error) => return directory_failure(error),
                };

            let line = cache.create_or_recreate(LedgerEntryType::TrustLine, line_key);
            let entry = cache.entry_mut(&line);
            entry.set_account(Field::LowAccount, low);
            entry.set_account(Field::HighAccount, high);
            entry.set_amount(Field::Balance, 0);
            entry.set_amount(limit_field, limit);
            entry.set_u64(Field::LowNode, low_node);
            entry.set_u64(Field::HighNode, high_node);
            entry.set_u32(Field::Flags, reserve_flag);

            cache.increment_owner_count(setter);
            TxResultCode::Success
        }

        // 2. Update the setter's side of an existing line, moving its reserve if it starts or stops
        // extending credit.
        Some(line) => {
            let flags = cache.entry(&line).u32(Field::Flags);
            let had_reserve = flags & reserve_flag != 0;
            let needs_reserve = limit != 0;

            if needs_reserve && !had_reserve {
                let balance = cache.entry(&account).amount(Field::Balance);
                let owner_count = cache.entry(&account).u32(Field::OwnerCount);
                if balance < reserve(owner_count.saturating_add(1)) {
                    return TxResultCode::NoLineInsufficientReserve;
                }
                cache.increment_owner_count(setter);
            } else if !needs_reserve && had_reserve {
                cache.decrement_owner_count(setter);
            }

            let flags = if needs_reserve {
                flags | reserve_flag
            } else {
                flags & !reserve_flag
            };
            let (low_limit, high_limit, balance) = cache.update(&line, |entry| {
                entry.set_amount(limit_field, limit);
                entry.set_u32(Field::Flags, flags);
                (
                    entry.amount(Field::LowLimit),
                    entry.amount(Field::HighLimit),
                    entry.amount(Field::Balance),
                )
            });

            // 3. A line with nothing left on it is deleted.
            if low_limit == 0 && high_limit == 0 && balance == 0 {
                return delete_trust_line(cache, &line, &low, &high);
            }

            TxResultCode::Success
        }
    }
}

fn delete_trust_line(
    cache: &mut LedgerEntryCache,
    line: &EntryHandle,
    low: &AccountID,
    high: &AccountID,
) -> TxResultCode {
    let line_key = line.key();
    let entry = cache.entry(line);
    let flags = entry.u32(Field::Flags);
    let low_node = entry.u64(Field::LowNode);
    let high_node = entry.u64(Field::HighNode);

    for (owner, node) in [(low, low_node), (high, high_node)] {
        if let Err(error) = directory::delete(
            cache,
            false,
            node,
            &keys::owner_dir(owner),
            &line_key,
            false,
            false,
        ) {
            return directory_failure(error);
        }
    }

    if flags & LOW_RESERVE != 0 {
        cache.decrement_owner_count(low);
    }
    if flags & HIGH_RESERVE != 0 {
        cache.decrement_owner_count(high);
    }

    let Some(line) = cache.load(LedgerEntryType::TrustLine, &line_key) else {
        return TxResultCode::BadLedger;
    };
    cache.delete(&line);
    TxResultCode::Success
}

/// Balance an account that owns `owner_count` entries must hold.
pub fn reserve(owner_count: u32) -> i64 {
    ACCOUNT_RESERVE.saturating_add(OWNER_RESERVE.saturating_mul(owner_count as i64))
}

fn load_account(cache: &mut LedgerEntryCache, account: &AccountID) -> Option<EntryHandle> {
    cache.load(LedgerEntryType::AccountRoot, &keys::account_root(account))
}

fn directory_failure(error: DirectoryError) -> TxResultCode {
    match error {
        DirectoryError::DirFull => TxResultCode::DirFull,
        DirectoryError::BadLedger { .. } | DirectoryError::EntryNotFound { .. } => {
            TxResultCode::BadLedger
        }
    }
}
