//! In-process ledger store for tests and throwaway pipelines.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{PipelineError, Result};

use super::{ApplyFn, Commit, Cursor, HistoryCursor, HistoryEntry, LedgerStore, Pager, ScanCursor};

#[derive(Default)]
struct Inner {
    state: BTreeMap<String, Vec<u8>>,
    history: BTreeMap<String, Vec<HistoryEntry>>,
    sequence: u64,
    last_commit: Option<DateTime<Utc>>,
}

impl Inner {
    fn record(&mut self, key: &str, value: Vec<u8>) -> Commit {
        self.sequence += 1;
        let commit = Commit::next(self.sequence, self.last_commit);
        self.last_commit = Some(commit.timestamp);
        self.history
            .entry(key.to_string())
            .or_default()
            .push(HistoryEntry::new(&commit, false, value.clone()));
        self.state.insert(key.to_string(), value);
        commit
    }
}

/// Ledger held entirely in memory. Clones share the same contents.
///
/// Writes hold one lock for their whole read-check-write. Cursors read live
/// data page by page rather than a fixed snapshot.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        lock(&self.inner)
    }

    /// Overwrite the world-state value at `key` without recording history.
    #[cfg(test)]
    pub(crate) fn plant(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.state.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

fn lock(inner: &Mutex<Inner>) -> Result<MutexGuard<'_, Inner>> {
    inner
        .lock()
        .map_err(|_| PipelineError::Store("memory ledger lock poisoned".to_string()))
}

impl LedgerStore for MemoryLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.state.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<Commit> {
        Ok(self.lock()?.record(key, value.to_vec()))
    }

    fn put_with(&self, key: &str, apply: &mut ApplyFn<'_>) -> Result<Commit> {
        let mut inner = self.lock()?;
        let value = apply(inner.state.get(key).map(Vec::as_slice))?;
        Ok(inner.record(key, value))
    }

    fn scan(&self, prefix: &str) -> Result<ScanCursor> {
        Ok(Cursor::new(MemoryScan {
            inner: self.inner.clone(),
            prefix: prefix.to_string(),
            last: None,
        }))
    }

    fn history(&self, key: &str) -> Result<HistoryCursor> {
        Ok(Cursor::new(MemoryHistory {
            inner: self.inner.clone(),
            key: key.to_string(),
            next: 0,
        }))
    }
}

struct MemoryScan {
    inner: Arc<Mutex<Inner>>,
    prefix: String,
    last: Option<String>,
}

impl Pager<(String, Vec<u8>)> for MemoryScan {
    fn fetch(&mut self, limit: usize) -> Result<Vec<(String, Vec<u8>)>> {
        let inner = lock(&self.inner)?;
        let lower = match &self.last {
            Some(last) => Bound::Excluded(last.clone()),
            None => Bound::Included(self.prefix.clone()),
        };
        let page: Vec<(String, Vec<u8>)> = inner
            .state
            .range((lower, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(self.prefix.as_str()))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some((key, _)) = page.last() {
            self.last = Some(key.clone());
        }
        Ok(page)
    }
}

struct MemoryHistory {
    inner: Arc<Mutex<Inner>>,
    key: String,
    next: usize,
}

impl Pager<HistoryEntry> for MemoryHistory {
    fn fetch(&mut self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let inner = lock(&self.inner)?;
        let page: Vec<HistoryEntry> = inner
            .history
            .get(&self.key)
            .map(|versions| versions.iter().skip(self.next).take(limit).cloned().collect())
            .unwrap_or_default();
        self.next += page.len();
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_records_history_and_state() {
        let ledger = MemoryLedger::new();
        ledger.put("k", b"one").unwrap();
        ledger.put("k", b"two").unwrap();

        assert_eq!(ledger.get("k").unwrap().unwrap(), b"two");
        let versions: Vec<Vec<u8>> = ledger.history("k").unwrap().map(|h| h.unwrap().value).collect();
        assert_eq!(versions, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn scan_stops_at_prefix_boundary() {
        let ledger = MemoryLedger::new();
        ledger.put("a/1", b"x").unwrap();
        ledger.put("a/2", b"y").unwrap();
        ledger.put("b/1", b"z").unwrap();
        let keys: Vec<String> = ledger.scan("a/").unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(keys, vec!["a/1".to_string(), "a/2".to_string()]);
    }

    #[test]
    fn put_with_failure_writes_nothing() {
        let ledger = MemoryLedger::new();
        ledger.put("k", b"one").unwrap();
        let err = ledger
            .put_with("k", &mut |current| {
                assert_eq!(current, Some(b"one".as_slice()));
                Err(PipelineError::NotFound("k".into()))
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert_eq!(ledger.history("k").unwrap().count(), 1);

        ledger
            .put_with("k", &mut |current| {
                let mut next = current.unwrap().to_vec();
                next.extend_from_slice(b"+two");
                Ok(next)
            })
            .unwrap();
        assert_eq!(ledger.get("k").unwrap().unwrap(), b"one+two");
    }

    #[test]
    fn plant_skips_history() {
        let ledger = MemoryLedger::new();
        ledger.plant("k", b"garbage").unwrap();
        assert_eq!(ledger.get("k").unwrap().unwrap(), b"garbage");
        assert_eq!(ledger.history("k").unwrap().count(), 0);
    }
}
