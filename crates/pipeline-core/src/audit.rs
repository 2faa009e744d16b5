//! Read-only queries over the ledger: full scans by discriminator and the
//! change log of a single item.
//!
//! Both queries are lazy. They wrap a store cursor and decode entries one at
//! a time, so callers can stream results of any length. A payload that does
//! not decode is handed back raw instead of failing the query.

use chrono::{DateTime, Utc};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::entity::{class_of, DecoderRegistry, CLASS_FIELD};
use crate::error::{PipelineError, Result};
use crate::item::{validate_identity, ChangeItem, CHANGE_ITEM_CLASS, CHANGE_ITEM_NAMESPACE};
use crate::key::CompositeKey;
use crate::ledger::{HistoryCursor, HistoryEntry, LedgerStore, ScanCursor};

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Parsed form of `{"selector": {"class": "<discriminator>"}}`.
///
/// Filtering by discriminator is the only supported predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    class: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectorDoc {
    selector: ClassFilter,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassFilter {
    class: String,
}

impl Selector {
    pub fn for_class(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
        }
    }

    pub fn parse(expr: &str) -> Result<Self> {
        let doc: SelectorDoc = serde_json::from_str(expr)
            .map_err(|e| PipelineError::InvalidQuery(format!("{e} in selector {expr}")))?;
        if doc.selector.class.is_empty() {
            return Err(PipelineError::InvalidQuery(format!(
                "selector {expr} names an empty {CLASS_FIELD}"
            )));
        }
        Ok(Self::for_class(doc.selector.class))
    }

    pub fn class(&self) -> &str {
        &self.class
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::for_class(CHANGE_ITEM_CLASS)
    }
}

// ---------------------------------------------------------------------------
// Query results
// ---------------------------------------------------------------------------

/// A stored payload, decoded when possible.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordValue {
    Decoded(serde_json::Value),
    /// Payload that failed to decode, as lossy UTF-8.
    Raw(String),
}

impl RecordValue {
    pub fn is_raw(&self) -> bool {
        matches!(self, RecordValue::Raw(_))
    }

    fn from_bytes(registry: &DecoderRegistry, bytes: &[u8]) -> Self {
        match registry.decode(bytes) {
            Ok(value) => RecordValue::Decoded(value),
            Err(e) => {
                tracing::debug!("passing record through undecoded: {e}");
                RecordValue::Raw(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    pub key: CompositeKey,
    pub record: RecordValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    pub value: RecordValue,
}

// ---------------------------------------------------------------------------
// AuditQuery
// ---------------------------------------------------------------------------

pub struct AuditQuery<'a> {
    store: &'a dyn LedgerStore,
    namespace: String,
    registry: DecoderRegistry,
}

impl<'a> AuditQuery<'a> {
    /// Queries over change items, with the change item decoder registered.
    pub fn new(store: &'a dyn LedgerStore) -> Self {
        let mut registry = DecoderRegistry::new();
        registry.register::<ChangeItem>();
        Self::with_registry(store, CHANGE_ITEM_NAMESPACE, registry)
    }

    pub fn with_registry(
        store: &'a dyn LedgerStore,
        namespace: impl Into<String>,
        registry: DecoderRegistry,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            registry,
        }
    }

    /// Every record in the store whose discriminator matches `selector`.
    /// Records that cannot be parsed at all are included raw, but only from
    /// this query's own namespace.
    pub fn list_all(&self, selector: &Selector) -> Result<ListAll<'_>> {
        Ok(ListAll {
            cursor: self.store.scan("")?,
            class: selector.class.clone(),
            namespace: &self.namespace,
            registry: &self.registry,
        })
    }

    /// Every committed version of one item, oldest first.
    pub fn history_of(&self, item_type: &str, item_number: &str) -> Result<HistoryOf<'_>> {
        validate_identity(item_type, item_number)?;
        let key = CompositeKey::new(&self.namespace, [item_type, item_number]);
        Ok(HistoryOf {
            cursor: self.store.history(key.as_str())?,
            registry: &self.registry,
        })
    }
}

/// Lazy result of [`AuditQuery::list_all`].
pub struct ListAll<'q> {
    cursor: ScanCursor,
    class: String,
    namespace: &'q str,
    registry: &'q DecoderRegistry,
}

impl ListAll<'_> {
    fn accept(&self, raw_key: String, bytes: Vec<u8>) -> Option<QueryRecord> {
        let key = match CompositeKey::from_raw(raw_key) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("skipping record under a foreign key: {e}");
                return None;
            }
        };
        match class_of(&bytes) {
            Ok(class) if class != self.class => return None,
            Ok(_) => {}
            Err(e) => {
                // Unclassified: only ours if it lives in our namespace.
                if key.namespace() != self.namespace {
                    return None;
                }
                tracing::debug!(key = %key, "unclassified record: {e}");
            }
        }
        Some(QueryRecord {
            key,
            record: RecordValue::from_bytes(self.registry, &bytes),
        })
    }
}

impl Iterator for ListAll<'_> {
    type Item = Result<QueryRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.cursor.next()? {
                Ok((key, bytes)) => {
                    if let Some(record) = self.accept(key, bytes) {
                        return Some(Ok(record));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Lazy result of [`AuditQuery::history_of`].
pub struct HistoryOf<'q> {
    cursor: HistoryCursor,
    registry: &'q DecoderRegistry,
}

impl Iterator for HistoryOf<'_> {
    type Item = Result<HistoryRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.cursor.next()?.map(|entry: HistoryEntry| HistoryRecord {
            tx_id: entry.tx_id.to_string(),
            timestamp: entry.timestamp,
            is_delete: entry.is_delete,
            value: RecordValue::from_bytes(self.registry, &entry.value),
        }))
    }
}

// ---------------------------------------------------------------------------
// Streaming output
// ---------------------------------------------------------------------------

/// Serialize `items` as a JSON array, one element at a time. Returns the
/// number of elements written. Stops at the first error.
pub fn write_json_array<W, T, I>(writer: W, items: I) -> Result<usize>
where
    W: Write,
    T: Serialize,
    I: IntoIterator<Item = Result<T>>,
{
    let mut ser = serde_json::Serializer::new(writer);
    let mut seq = serde::Serializer::serialize_seq(&mut ser, None)?;
    let mut count = 0;
    for item in items {
        seq.serialize_element(&item?)?;
        count += 1;
    }
    seq.end()?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
