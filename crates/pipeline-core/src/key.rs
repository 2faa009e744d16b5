//! Composite key codec.
//!
//! A composite key folds a namespace and an ordered list of identity parts
//! into one store key:
//!
//! ```text
//! NUL namespace NUL part-1 NUL part-2 NUL ... part-n NUL
//! ```
//!
//! Inside the namespace and each part a backslash is written as `\\` and a
//! NUL as `\0`, so a raw NUL only ever appears as a terminator. Every
//! component is self-terminated, which makes the encoding injective and
//! makes the key of a partial identity a byte prefix of every full key that
//! starts with the same parts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

pub const SEPARATOR: char = '\u{0}';
const ESCAPE: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    /// Encode `namespace` and `parts` into a key.
    pub fn new<I, S>(namespace: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = String::with_capacity(namespace.len() + 8);
        out.push(SEPARATOR);
        push_escaped(&mut out, namespace);
        out.push(SEPARATOR);
        for part in parts {
            push_escaped(&mut out, part.as_ref());
            out.push(SEPARATOR);
        }
        Self(out)
    }

    /// Wrap a raw key read back from the store, validating its layout.
    pub fn from_raw(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        decode(&raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Namespace and identity parts of this key.
    pub fn components(&self) -> (String, Vec<String>) {
        // Keys are only constructed through `new` or a validated `from_raw`.
        decode(&self.0).unwrap_or_default()
    }

    pub fn namespace(&self) -> String {
        self.components().0
    }

    pub fn parts(&self) -> Vec<String> {
        self.components().1
    }

    /// True when `self` lies under `prefix` (same namespace, leading parts equal).
    pub fn starts_with(&self, prefix: &CompositeKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (namespace, parts) = self.components();
        write!(f, "{namespace}")?;
        for part in parts {
            write!(f, "/{part:?}")?;
        }
        Ok(())
    }
}

impl AsRef<str> for CompositeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn push_escaped(out: &mut String, component: &str) {
    for c in component.chars() {
        match c {
            ESCAPE => out.push_str("\\\\"),
            SEPARATOR => out.push_str("\\0"),
            c => out.push(c),
        }
    }
}

/// Inverse of [`CompositeKey::new`]: returns the namespace and the parts.
pub fn decode(raw: &str) -> Result<(String, Vec<String>)> {
    let malformed = |why: &str| PipelineError::Deserialization(format!("malformed composite key {raw:?}: {why}"));

    let mut chars = raw.chars();
    if chars.next() != Some(SEPARATOR) {
        return Err(malformed("missing leading separator"));
    }

    let mut components = Vec::new();
    let mut current = String::new();
    let mut open = false;
    while let Some(c) = chars.next() {
        open = true;
        match c {
            SEPARATOR => {
                components.push(std::mem::take(&mut current));
                open = false;
            }
            ESCAPE => match chars.next() {
                Some(ESCAPE) => current.push(ESCAPE),
                Some('0') => current.push(SEPARATOR),
                _ => return Err(malformed("dangling escape")),
            },
            c => current.push(c),
        }
    }
    if open {
        return Err(malformed("unterminated component"));
    }

    let mut components = components.into_iter();
    let namespace = components.next().ok_or_else(|| malformed("missing namespace"))?;
    Ok((namespace, components.collect()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
