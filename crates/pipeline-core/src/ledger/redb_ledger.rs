//! Durable ledger store backed by redb.
//!
//! # Table design
//!
//! `world_state` maps each composite key to its latest value.
//!
//! `history` is the append-only change log. Its key is
//! ```text
//! [ world-state key bytes | 0xff | sequence: u64 big-endian (8 bytes) ]
//! ```
//! `0xff` never occurs in UTF-8, so the bytes before it identify exactly one
//! world-state key, and because the sequence is big-endian a range scan over
//! one key returns its versions in commit order. The value is
//! ```text
//! [ tx_id: 16 bytes | commit seconds: i64 big-endian | is_delete: 1 byte | payload ]
//! ```
//!
//! `meta` holds the ledger-wide commit sequence and the last commit time.
//!
//! A `put` updates all three tables in one write transaction. `put_with`
//! also reads the current value inside that transaction, and redb admits
//! one writer at a time, so the read and the write cannot be split by
//! another commit.
//!
//! Each cursor owns a read transaction, so it sees one consistent snapshot
//! for its whole lifetime and releases it when dropped.

use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction,
};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

use super::{ApplyFn, Commit, Cursor, HistoryCursor, HistoryEntry, LedgerStore, Pager, ScanCursor};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const WORLD_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("world_state");
const HISTORY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("history");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SEQUENCE_KEY: &str = "commit_sequence";
const COMMIT_TIME_KEY: &str = "commit_time";
const KEY_TERMINATOR: u8 = 0xff;
const ROW_HEADER_LEN: usize = 16 + 8 + 1;

fn store_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Store(e.to_string())
}

fn cursor_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Cursor(e.to_string())
}

// ---------------------------------------------------------------------------
// History key and row helpers
// ---------------------------------------------------------------------------

fn history_key(key: &str, sequence: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 9);
    out.extend_from_slice(key.as_bytes());
    out.push(KEY_TERMINATOR);
    out.extend_from_slice(&sequence.to_be_bytes());
    out
}

fn sequence_of(history_key: &[u8]) -> Result<u64> {
    let tail = history_key
        .len()
        .checked_sub(8)
        .map(|at| &history_key[at..])
        .ok_or_else(|| cursor_err("history key too short"))?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(tail);
    Ok(u64::from_be_bytes(bytes))
}

fn encode_row(commit: &Commit, is_delete: bool, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ROW_HEADER_LEN + payload.len());
    out.extend_from_slice(commit.tx_id.as_bytes());
    out.extend_from_slice(&commit.timestamp.timestamp().to_be_bytes());
    out.push(u8::from(is_delete));
    out.extend_from_slice(payload);
    out
}

fn decode_row(sequence: u64, row: &[u8]) -> Result<HistoryEntry> {
    if row.len() < ROW_HEADER_LEN {
        return Err(cursor_err(format!(
            "history row {sequence} is truncated ({} bytes)",
            row.len()
        )));
    }
    let tx_id = Uuid::from_slice(&row[..16]).map_err(cursor_err)?;
    let mut secs = [0u8; 8];
    secs.copy_from_slice(&row[16..24]);
    let seconds = i64::from_be_bytes(secs);
    let timestamp = DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| cursor_err(format!("history row {sequence} has bad time {seconds}")))?;
    Ok(HistoryEntry {
        tx_id,
        sequence,
        timestamp,
        is_delete: row[24] != 0,
        value: row[ROW_HEADER_LEN..].to_vec(),
    })
}

// ---------------------------------------------------------------------------
// RedbLedger
// ---------------------------------------------------------------------------

/// File-backed ledger. Cheap to clone; clones share one database handle.
#[derive(Clone)]
pub struct RedbLedger {
    db: Arc<Database>,
}

impl RedbLedger {
    /// Open or create the ledger at `path`, creating its tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        // Ensure the tables exist before any reads
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(WORLD_STATE).map_err(store_err)?;
        wt.open_table(HISTORY).map_err(store_err)?;
        wt.open_table(META).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        tracing::debug!(path = %path.display(), "opened ledger");
        Ok(Self { db: Arc::new(db) })
    }

    fn begin_read(&self) -> Result<ReadTransaction> {
        self.db.begin_read().map_err(store_err)
    }

    /// Number of transactions committed so far.
    pub fn commit_count(&self) -> Result<u64> {
        let rt = self.begin_read()?;
        let meta = rt.open_table(META).map_err(store_err)?;
        let count = meta
            .get(SEQUENCE_KEY)
            .map_err(store_err)?
            .map(|v| v.value())
            .unwrap_or(0);
        Ok(count)
    }
}

impl LedgerStore for RedbLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let rt = self.begin_read()?;
        let table = rt.open_table(WORLD_STATE).map_err(store_err)?;
        let value = table
            .get(key)
            .map_err(store_err)?
            .map(|v| v.value().to_vec());
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<Commit> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let commit = record(&wt, key, value)?;
        wt.commit().map_err(store_err)?;
        tracing::debug!(sequence = commit.sequence, tx_id = %commit.tx_id, "committed");
        Ok(commit)
    }

    fn put_with(&self, key: &str, apply: &mut ApplyFn<'_>) -> Result<Commit> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let current = {
            let state = wt.open_table(WORLD_STATE).map_err(store_err)?;
            let value = state.get(key).map_err(store_err)?.map(|v| v.value().to_vec());
            value
        };
        let value = match apply(current.as_deref()) {
            Ok(value) => value,
            Err(e) => {
                wt.abort().map_err(store_err)?;
                return Err(e);
            }
        };
        let commit = record(&wt, key, &value)?;
        wt.commit().map_err(store_err)?;
        tracing::debug!(sequence = commit.sequence, tx_id = %commit.tx_id, "committed");
        Ok(commit)
    }

    fn scan(&self, prefix: &str) -> Result<ScanCursor> {
        let txn = self.begin_read()?;
        let table = txn.open_table(WORLD_STATE).map_err(store_err)?;
        Ok(Cursor::new(WorldStatePager {
            table,
            _txn: txn,
            prefix: prefix.to_string(),
            last: None,
        }))
    }

    fn history(&self, key: &str) -> Result<HistoryCursor> {
        let txn = self.begin_read()?;
        let table = txn.open_table(HISTORY).map_err(store_err)?;
        Ok(Cursor::new(HistoryPager {
            table,
            _txn: txn,
            key: key.to_string(),
            after: 0,
            done: false,
        }))
    }
}

/// Stamp the next commit and write `value` at `key` plus its history row,
/// inside `wt`.
fn record(wt: &WriteTransaction, key: &str, value: &[u8]) -> Result<Commit> {
    let mut meta = wt.open_table(META).map_err(store_err)?;
    let sequence = meta
        .get(SEQUENCE_KEY)
        .map_err(store_err)?
        .map(|v| v.value())
        .unwrap_or(0)
        + 1;
    let floor = meta
        .get(COMMIT_TIME_KEY)
        .map_err(store_err)?
        .and_then(|v| i64::try_from(v.value()).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    let commit = Commit::next(sequence, floor);
    meta.insert(SEQUENCE_KEY, sequence).map_err(store_err)?;
    let secs = u64::try_from(commit.timestamp.timestamp()).unwrap_or(0);
    meta.insert(COMMIT_TIME_KEY, secs).map_err(store_err)?;

    let mut state = wt.open_table(WORLD_STATE).map_err(store_err)?;
    state.insert(key, value).map_err(store_err)?;

    let mut history = wt.open_table(HISTORY).map_err(store_err)?;
    let row = encode_row(&commit, false, value);
    history
        .insert(history_key(key, sequence).as_slice(), row.as_slice())
        .map_err(store_err)?;
    Ok(commit)
}

// ---------------------------------------------------------------------------
// Pagers
// ---------------------------------------------------------------------------

struct WorldStatePager {
    table: ReadOnlyTable<&'static str, &'static [u8]>,
    _txn: ReadTransaction,
    prefix: String,
    last: Option<String>,
}

impl Pager<(String, Vec<u8>)> for WorldStatePager {
    fn fetch(&mut self, limit: usize) -> Result<Vec<(String, Vec<u8>)>> {
        let lower = match &self.last {
            Some(last) => Bound::Excluded(last.as_str()),
            None => Bound::Included(self.prefix.as_str()),
        };
        let mut page = Vec::with_capacity(limit);
        for entry in self
            .table
            .range::<&str>((lower, Bound::Unbounded))
            .map_err(cursor_err)?
        {
            let (k, v) = entry.map_err(cursor_err)?;
            let key = k.value();
            if !key.starts_with(self.prefix.as_str()) {
                break;
            }
            page.push((key.to_string(), v.value().to_vec()));
            if page.len() == limit {
                break;
            }
        }
        if let Some((key, _)) = page.last() {
            self.last = Some(key.clone());
        }
        Ok(page)
    }
}

struct HistoryPager {
    table: ReadOnlyTable<&'static [u8], &'static [u8]>,
    _txn: ReadTransaction,
    key: String,
    after: u64,
    done: bool,
}

impl Pager<HistoryEntry> for HistoryPager {
    fn fetch(&mut self, limit: usize) -> Result<Vec<HistoryEntry>> {
        if self.done {
            return Ok(Vec::new());
        }
        let start = match self.after.checked_add(1) {
            Some(next) => history_key(&self.key, next),
            None => return Ok(Vec::new()),
        };
        let end = history_key(&self.key, u64::MAX);
        let mut page = Vec::with_capacity(limit);
        for entry in self
            .table
            .range(start.as_slice()..=end.as_slice())
            .map_err(cursor_err)?
        {
            let (k, v) = entry.map_err(cursor_err)?;
            let sequence = sequence_of(k.value())?;
            page.push(decode_row(sequence, v.value())?);
            if page.len() == limit {
                break;
            }
        }
        match page.last() {
            Some(last) => self.after = last.sequence,
            None => self.done = true,
        }
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
