/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Paginated directories mapping an owner (or book) key to the keys of its member entries.
//!
//! ## Layout
//!
//! A directory is a doubly-linked list of `DirectoryNode` pages, each holding up to [`DIR_NODE_MAX`]
//! member keys in its `Indexes` field. Page 0 is the root and lives under the directory's root key;
//! page `n` lives under [`keys::dir_node(root, n)`](keys::dir_node).
//! - `IndexNext` of a page is the number of the next page, or 0 for the last page.
//! - `IndexPrevious` of a non-root page is the number of the previous page (0 being the root).
//! - `IndexPrevious` of the root is the number of the last page, or 0 if the root never overflowed.
//!
//! Members are only ever appended to the last page, so that a watcher can follow new members by
//! monitoring the last page onward.
//!
//! All functions in this module read and write pages through a [`LedgerEntryCache`], and so are subject
//! to its action-transition rules.

use crate::{
    entry_cache::{EntryHandle, LedgerEntryCache},
    ledger::{
        entry::{Field, LedgerEntry, LedgerEntryType},
        keys,
    },
    types::data_types::EntryKey,
};

/// Maximum number of member keys in one page.
pub const DIR_NODE_MAX: usize = 32;

/// A soft delete probes pages up to (and including) this page number before giving up.
pub const SOFT_DELETE_PROBE_LIMIT: u64 = 20;

/// Append `member` to the directory rooted at `root`, creating the root or a new last page as needed.
///
/// `describe` is called with each newly created page and whether it is the root, so that the caller can
/// fill in owner-specific fields.
///
/// Returns the number of the page `member` was added to. Callers should store it so that they can pass
/// it to [`delete`] later.
pub fn add(
    cache: &mut LedgerEntryCache,
    root: &EntryKey,
    member: EntryKey,
    describe: impl FnOnce(&mut LedgerEntry, bool),
) -> Result<u64, DirectoryError> {
    log::trace!("Directory add: root {} member {}", root, member);

    let (page, handle) = match cache.load(LedgerEntryType::DirectoryNode, root) {
        // 1. No root: create it and add the member to it.
        None => {
            let root_handle = cache.create_or_recreate(LedgerEntryType::DirectoryNode, *root);
            let root_page = cache.entry_mut(&root_handle);
            root_page.set_hash(Field::RootIndex, *root);
            describe(root_page, true);
            (0, root_handle)
        }

        Some(root_handle) => {
            // 2. Find the last page: the root itself if it never overflowed.
            let last_page = cache.entry(&root_handle).u64(Field::IndexPrevious);
            let last_handle = if last_page == 0 {
                root_handle
            } else {
                load_page(cache, root, last_page)?
            };

            // 3. Add to the last page if it has room, otherwise link in a new last page.
            if cache.entry(&last_handle).hashes(Field::Indexes).len() < DIR_NODE_MAX {
                (last_page, last_handle)
            } else {
                let new_page = last_page.checked_add(1).ok_or(DirectoryError::DirFull)?;

                cache.update(&last_handle, |page| page.set_u64(Field::IndexNext, new_page));
                cache.update(&root_handle, |page| {
                    page.set_u64(Field::IndexPrevious, new_page)
                });

                let new_handle = cache.create_or_recreate(
                    LedgerEntryType::DirectoryNode,
                    keys::dir_node(root, new_page),
                );
                let page = cache.entry_mut(&new_handle);
                page.set_hash(Field::RootIndex, *root);
                if new_page != 1 {
                    page.set_u64(Field::IndexPrevious, new_page - 1);
                }
                describe(page, false);
                (new_page, new_handle)
            }
        }
    };

    cache.update(&handle, |entry| {
        let mut indexes = entry.hashes(Field::Indexes).to_vec();
        indexes.push(member);
        entry.set_hashes(Field::Indexes, indexes);
    });

    log::trace!("Directory add: appended {} to page {}", member, page);
    Ok(page)
}

/// Remove `member` from the directory rooted at `root`.
///
/// ## Parameters
///
/// - `keep_root`: never delete the root (or the last page) once the root has overflowed.
/// - `page_hint`: the page `member` is expected to be in.
/// - `stable`: preserve the relative order of the remaining members of the page. If `false`, the last
///   member of the page takes the removed member's place.
/// - `soft`: `page_hint` may be stale. Probe the following pages, up to page
///   [`SOFT_DELETE_PROBE_LIMIT`], before giving up.
///
/// Pages emptied by the removal are spliced out of the list, except for the root and last page in the
/// cases described in [the layout](self#layout).
pub fn delete(
    cache: &mut LedgerEntryCache,
    keep_root: bool,
    page_hint: u64,
    root: &EntryKey,
    member: &EntryKey,
    stable: bool,
    soft: bool,
) -> Result<(), DirectoryError> {
    // 1. Find the page holding `member`.
    let mut page = page_hint;
    let handle = loop {
        let found = cache.load(LedgerEntryType::DirectoryNode, &keys::dir_node(root, page));
        let error = match found {
            Some(handle) if cache.entry(&handle).hashes(Field::Indexes).contains(member) => {
                break handle
            }
            Some(_) => DirectoryError::EntryNotFound { page },
            None => DirectoryError::BadLedger { page },
        };

        if !soft {
            log::error!(
                "Directory delete: {:?} (root {}, member {})",
                error,
                root,
                member
            );
            return Err(error);
        }
        if page >= SOFT_DELETE_PROBE_LIMIT {
            log::warn!(
                "Directory delete: gave up probing at page {} (root {}, member {})",
                page,
                root,
                member
            );
            return Err(error);
        }
        log::warn!(
            "Directory delete: {:?}, probing page {} (root {}, member {})",
            error,
            page + 1,
            root,
            member
        );
        page += 1;
    };

    // 2. Remove the member.
    let remaining = cache.update(&handle, |entry| {
        let mut indexes = entry.hashes(Field::Indexes).to_vec();
        if let Some(pos) = indexes.iter().position(|key| key == member) {
            if stable {
                indexes.remove(pos);
            } else {
                indexes.swap_remove(pos);
            }
        }
        let remaining = indexes.len();
        entry.set_hashes(Field::Indexes, indexes);
        remaining
    });
    if remaining > 0 {
        return Ok(());
    }

    // 3. The page is now empty. Splice it out if the layout allows.
    let previous = cache.entry(&handle).u64(Field::IndexPrevious);
    let next = cache.entry(&handle).u64(Field::IndexNext);

    if page == 0 {
        if previous == 0 {
            // The root never overflowed.
            cache.delete(&handle);
        } else if keep_root || previous != next {
            // The root overflowed and must stay, or there are more than two pages.
        } else {
            // Only the root and one last page are left: delete both if both are empty.
            let last_handle = load_page(cache, root, next)?;
            if cache.entry(&last_handle).hashes(Field::Indexes).is_empty() {
                cache.delete(&handle);
                cache.delete(&last_handle);
            }
        }
    } else if next != 0 {
        // An interior page: link its neighbours to each other.
        let previous_handle = load_page(cache, root, previous)?;
        let next_handle = load_page(cache, root, next)?;
        cache.update(&previous_handle, |entry| entry.set_u64(Field::IndexNext, next));
        cache.update(&next_handle, |entry| entry.set_u64(Field::IndexPrevious, previous));
        cache.delete(&handle);
    } else if keep_root || previous != 0 {
        // The last page, which the root points to, must stay.
    } else {
        // The last page, directly after the root: delete both if both are empty.
        let root_handle = load_page(cache, root, 0)?;
        if cache.entry(&root_handle).hashes(Field::Indexes).is_empty() {
            cache.delete(&root_handle);
            cache.delete(&handle);
        }
    }

    Ok(())
}

/// Position of an iteration through a directory. A cursor can be stored and iteration resumed from it
/// with [`next`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirCursor {
    page: u64,
    entry: usize,
}

impl DirCursor {
    pub fn page(&self) -> u64 {
        self.page
    }
}

/// Reset `cursor` to the start of the directory rooted at `root` and return its first member, or `None`
/// if the directory is empty or does not exist.
pub fn first(
    cache: &mut LedgerEntryCache,
    root: &EntryKey,
    cursor: &mut DirCursor,
) -> Result<Option<EntryKey>, DirectoryError> {
    *cursor = DirCursor::default();
    next(cache, root, cursor)
}

/// Return the member at `cursor` and advance it, following `IndexNext` across pages.
///
/// A page that `IndexNext` points to but that does not exist is a corrupt directory: it is logged, and
/// iteration cannot continue.
pub fn next(
    cache: &mut LedgerEntryCache,
    root: &EntryKey,
    cursor: &mut DirCursor,
) -> Result<Option<EntryKey>, DirectoryError> {
    loop {
        let handle = match cache.load(
            LedgerEntryType::DirectoryNode,
            &keys::dir_node(root, cursor.page),
        ) {
            Some(handle) => handle,
            None if cursor.page == 0 => return Ok(None),
            None => {
                log::error!("Corrupt directory: root {} next page {}", root, cursor.page);
                return Err(DirectoryError::BadLedger { page: cursor.page });
            }
        };

        let page = cache.entry(&handle);
        let indexes = page.hashes(Field::Indexes);
        if cursor.entry < indexes.len() {
            let member = indexes[cursor.entry];
            cursor.entry += 1;
            return Ok(Some(member));
        }

        match page.u64(Field::IndexNext) {
            0 => return Ok(None),
            next_page => {
                cursor.page = next_page;
                cursor.entry = 0;
            }
        }
    }
}

/// Count the members of the directory rooted at `root`.
pub fn count(cache: &mut LedgerEntryCache, root: &EntryKey) -> Result<u32, DirectoryError> {
    let mut count = 0;
    let mut page = 0;
    loop {
        match cache.load(LedgerEntryType::DirectoryNode, &keys::dir_node(root, page)) {
            Some(handle) => {
                let entry = cache.entry(&handle);
                count += entry.hashes(Field::Indexes).len() as u32;
                page = entry.u64(Field::IndexNext);
            }
            None if page == 0 => return Ok(0),
            None => {
                log::warn!("Directory count: no page {} (root {})", page, root);
                return Err(DirectoryError::BadLedger { page });
            }
        }
        if page == 0 {
            return Ok(count);
        }
    }
}

/// Check whether the directory rooted at `root` has no members.
pub fn is_empty(cache: &mut LedgerEntryCache, root: &EntryKey) -> bool {
    match cache.load(LedgerEntryType::DirectoryNode, root) {
        None => true,
        Some(handle) => {
            let entry = cache.entry(&handle);
            // If there is another page, it is non-empty.
            entry.hashes(Field::Indexes).is_empty() && entry.u64(Field::IndexNext) == 0
        }
    }
}

/// [`Iterator`] over the members of a directory, built on [`first`] and [`next`]. Iteration ends after
/// the first error.
pub struct DirectoryIter<'a> {
    cache: &'a mut LedgerEntryCache,
    root: EntryKey,
    cursor: DirCursor,
    done: bool,
}

impl<'a> DirectoryIter<'a> {
    pub fn new(cache: &'a mut LedgerEntryCache, root: EntryKey) -> Self {
        Self {
            cache,
            root,
            cursor: DirCursor::default(),
            done: false,
        }
    }

    pub fn cursor(&self) -> DirCursor {
        self.cursor
    }
}

impl<'a> Iterator for DirectoryIter<'a> {
    type Item = Result<EntryKey, DirectoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match next(self.cache, &self.root, &mut self.cursor) {
            Ok(Some(member)) => Some(Ok(member)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

fn load_page(
    cache: &mut LedgerEntryCache,
    root: &EntryKey,
    page: u64,
) -> Result<EntryHandle, DirectoryError> {
    cache
        .load(LedgerEntryType::DirectoryNode, &keys::dir_node(root, page))
        .ok_or_else(|| {
            log::error!("Directory: page {} of root {} is missing", page, root);
            DirectoryError::BadLedger { page }
        })
}

#[derive(Debug, PartialEq, Eq)]
pub enum DirectoryError {
    /// The page counter of the directory would overflow. Permanent for this directory.
    DirFull,

    /// A page the directory links to does not exist.
    BadLedger { page: u64 },

    /// The member is not on the expected page.
    EntryNotFound { page: u64 },
}
