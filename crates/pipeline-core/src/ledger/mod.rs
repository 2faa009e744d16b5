//! Append-only ledger store.
//!
//! The core reads and writes through [`LedgerStore`]: a keyed world state
//! plus a per-key change log. Every `put` is one committed ledger
//! transaction and appends exactly one history entry for its key.
//! [`LedgerStore::put_with`] runs a read-check-write as one transaction, so
//! concurrent writers to the same key take turns.
//!
//! Scans and history reads are lazy [`Cursor`]s that page through the store,
//! so neither a full collection nor a full change log is ever materialised.

pub mod memory;
pub mod redb_ledger;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

pub use self::memory::MemoryLedger;
pub use self::redb_ledger::RedbLedger;

/// Number of entries a cursor pulls from the store per page.
pub const PAGE_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// Commit / HistoryEntry
// ---------------------------------------------------------------------------

/// Identity of one committed ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tx_id: Uuid,
    /// Ledger-wide commit order.
    pub sequence: u64,
    /// Commit time, whole seconds.
    pub timestamp: DateTime<Utc>,
}

impl Commit {
    /// Next commit, stamped with the current time but never earlier than
    /// `floor`, the time of the previous commit. Commit times stay
    /// non-decreasing even if the wall clock steps back.
    pub fn next(sequence: u64, floor: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now().trunc_subsecs(0);
        let timestamp = match floor {
            Some(floor) if floor > now => floor,
            _ => now,
        };
        Self {
            tx_id: Uuid::new_v4(),
            sequence,
            timestamp,
        }
    }
}

/// One committed version of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub tx_id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    pub value: Vec<u8>,
}

impl HistoryEntry {
    pub fn new(commit: &Commit, is_delete: bool, value: Vec<u8>) -> Self {
        Self {
            tx_id: commit.tx_id,
            sequence: commit.sequence,
            timestamp: commit.timestamp,
            is_delete,
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Decides the value to write from the value currently stored. Returning an
/// error aborts the write.
pub type ApplyFn<'f> = dyn FnMut(Option<&[u8]>) -> Result<Vec<u8>> + 'f;

/// Store interface consumed by the collection and the audit layer.
pub trait LedgerStore: Send + Sync {
    /// Current value of `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write `value` at `key` and append it to the key's history in one
    /// atomic commit.
    fn put(&self, key: &str, value: &[u8]) -> Result<Commit>;

    /// Read `key`, hand its current value to `apply` and write what it
    /// returns, all in one transaction. No other write to the store can land
    /// between the read and the write. When `apply` fails nothing is
    /// written and its error is returned.
    fn put_with(&self, key: &str, apply: &mut ApplyFn<'_>) -> Result<Commit>;

    /// All world-state entries whose key starts with `prefix`, in key order.
    fn scan(&self, prefix: &str) -> Result<ScanCursor>;

    /// Every committed version of `key`, oldest first.
    fn history(&self, key: &str) -> Result<HistoryCursor>;
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Source of pages behind a [`Cursor`]. Dropping it releases whatever read
/// snapshot or handle it holds.
pub trait Pager<T> {
    /// Fetch up to `limit` entries following the last one returned.
    fn fetch(&mut self, limit: usize) -> Result<Vec<T>>;
}

/// Lazy, finite, non-restartable sequence over store entries.
///
/// The underlying pager is dropped as soon as the sequence is exhausted or
/// fails, and otherwise when the cursor itself is dropped. After an error
/// the cursor yields nothing further.
pub struct Cursor<T> {
    pager: Option<Box<dyn Pager<T>>>,
    buffer: VecDeque<T>,
}

pub type ScanCursor = Cursor<(String, Vec<u8>)>;
pub type HistoryCursor = Cursor<HistoryEntry>;

impl<T> Cursor<T> {
    pub fn new(pager: impl Pager<T> + 'static) -> Self {
        Self {
            pager: Some(Box::new(pager)),
            buffer: VecDeque::new(),
        }
    }

    /// True once the underlying pager has been released.
    pub fn is_released(&self) -> bool {
        self.pager.is_none()
    }
}

impl<T> Iterator for Cursor<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.buffer.pop_front() {
            return Some(Ok(item));
        }
        let pager = self.pager.as_mut()?;
        match pager.fetch(PAGE_SIZE) {
            Ok(page) => {
                if page.len() < PAGE_SIZE {
                    self.pager = None;
                }
                self.buffer.extend(page);
                let item = self.buffer.pop_front();
                if item.is_none() {
                    self.pager = None;
                }
                item.map(Ok)
            }
            Err(e) => {
                self.pager = None;
                self.buffer.clear();
                Some(Err(match e {
                    PipelineError::Cursor(_) => e,
                    other => PipelineError::Cursor(other.to_string()),
                }))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Yields `total` numbers, optionally failing on a given page, and
    /// records when it is dropped.
    struct Numbers {
        next: usize,
        total: usize,
        fail_on_page: Option<usize>,
        pages: usize,
        dropped: Rc<Cell<bool>>,
    }

    impl Pager<usize> for Numbers {
        fn fetch(&mut self, limit: usize) -> Result<Vec<usize>> {
            self.pages += 1;
            if self.fail_on_page == Some(self.pages) {
                return Err(PipelineError::Store("disk went away".into()));
            }
            let end = (self.next + limit).min(self.total);
            let page: Vec<usize> = (self.next..end).collect();
            self.next = end;
            Ok(page)
        }
    }

    impl Drop for Numbers {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    fn numbers(total: usize, fail_on_page: Option<usize>) -> (Cursor<usize>, Rc<Cell<bool>>) {
        let dropped = Rc::new(Cell::new(false));
        let pager = Numbers {
            next: 0,
            total,
            fail_on_page,
            pages: 0,
            dropped: dropped.clone(),
        };
        (Cursor::new(pager), dropped)
    }

    #[test]
    fn cursor_walks_every_page_in_order() {
        let (cursor, _) = numbers(PAGE_SIZE * 2 + 5, None);
        let all: Vec<usize> = cursor.map(|r| r.unwrap()).collect();
        assert_eq!(all, (0..PAGE_SIZE * 2 + 5).collect::<Vec<_>>());
    }

    #[test]
    fn cursor_releases_pager_when_exhausted() {
        let (mut cursor, dropped) = numbers(3, None);
        assert!(!dropped.get());
        assert_eq!(cursor.next().unwrap().unwrap(), 0);
        // A short page means the store has nothing more to give.
        assert!(dropped.get());
        assert!(cursor.is_released());
        assert_eq!(cursor.by_ref().count(), 2);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn cursor_releases_pager_on_error_and_fuses() {
        let (mut cursor, dropped) = numbers(PAGE_SIZE * 3, Some(2));
        for _ in 0..PAGE_SIZE {
            cursor.next().unwrap().unwrap();
        }
        let err = cursor.next().unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::Cursor(_)));
        assert!(err.to_string().contains("disk went away"));
        assert!(dropped.get());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn cursor_releases_pager_when_dropped_early() {
        let (mut cursor, dropped) = numbers(PAGE_SIZE * 3, None);
        cursor.next().unwrap().unwrap();
        assert!(!dropped.get());
        drop(cursor);
        assert!(dropped.get());
    }

    #[test]
    fn commit_time_never_goes_backwards() {
        let ahead = Utc::now().trunc_subsecs(0) + chrono::Duration::hours(1);
        let commit = Commit::next(2, Some(ahead));
        assert_eq!(commit.timestamp, ahead);

        let behind = ahead - chrono::Duration::hours(2);
        let commit = Commit::next(3, Some(behind));
        assert!(commit.timestamp > behind);
        assert!(commit.timestamp < ahead);
    }

    #[test]
    fn empty_cursor_yields_nothing() {
        let (mut cursor, dropped) = numbers(0, None);
        assert!(cursor.next().is_none());
        assert!(dropped.get());
    }
}
