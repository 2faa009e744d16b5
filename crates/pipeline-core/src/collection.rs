//! Namespaced, typed CRUD over a ledger store.

use std::marker::PhantomData;

use crate::entity::{self, DecodeFn, Entity};
use crate::error::{PipelineError, Result};
use crate::key::CompositeKey;
use crate::ledger::{Commit, LedgerStore};

/// Directory of one entity kind inside a shared store.
///
/// Every key the collection touches is built from its namespace, so several
/// collections can share one store without colliding.
pub struct EntityCollection<'s, T: Entity> {
    store: &'s dyn LedgerStore,
    namespace: String,
    decode: DecodeFn<T>,
    _kind: PhantomData<fn() -> T>,
}

impl<'s, T: Entity> EntityCollection<'s, T> {
    pub fn new(store: &'s dyn LedgerStore, namespace: impl Into<String>, decode: DecodeFn<T>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            decode,
            _kind: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key for the given identity parts inside this collection.
    pub fn key_for<I, S>(&self, parts: I) -> CompositeKey
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CompositeKey::new(&self.namespace, parts)
    }

    pub fn key_of(&self, entity: &T) -> CompositeKey {
        entity.key(&self.namespace)
    }

    /// Insert a new entity. Fails with `DuplicateKey` if the key is taken.
    /// The existence check and the write are one store transaction.
    pub fn add(&self, entity: &T) -> Result<Commit> {
        let key = self.key_of(entity);
        let bytes = entity::serialize(entity, &key)?;
        self.store.put_with(key.as_str(), &mut |current| match current {
            Some(_) => Err(PipelineError::DuplicateKey(key.to_string())),
            None => Ok(bytes.clone()),
        })
    }

    /// Load the entity at `key`. Fails with `NotFound` if absent.
    pub fn get(&self, key: &CompositeKey) -> Result<T> {
        let bytes = self.get_raw(key)?;
        (self.decode)(&bytes)
    }

    /// Stored bytes at `key`, undecoded.
    pub fn get_raw(&self, key: &CompositeKey) -> Result<Vec<u8>> {
        self.store
            .get(key.as_str())?
            .ok_or_else(|| PipelineError::NotFound(key.to_string()))
    }

    /// Overwrite an existing entity. Never creates: fails with `NotFound`
    /// when nothing is stored at the entity's key.
    pub fn update(&self, entity: &T) -> Result<Commit> {
        let key = self.key_of(entity);
        let bytes = entity::serialize(entity, &key)?;
        self.store.put_with(key.as_str(), &mut |current| match current {
            Some(_) => Ok(bytes.clone()),
            None => Err(PipelineError::NotFound(key.to_string())),
        })
    }

    /// Load the entity at `key`, pass it to `change` and store the result,
    /// all in one store transaction. Concurrent calls on the same key see
    /// each other's writes. Nothing is written if `change` fails.
    pub fn modify<F>(&self, key: &CompositeKey, change: F) -> Result<(T, Commit)>
    where
        F: FnOnce(T) -> Result<T>,
    {
        let mut change = Some(change);
        let mut changed = None;
        let commit = self.store.put_with(key.as_str(), &mut |current| {
            let bytes = current.ok_or_else(|| PipelineError::NotFound(key.to_string()))?;
            let change = change
                .take()
                .ok_or_else(|| PipelineError::Store(format!("{key} modified twice")))?;
            let next = change((self.decode)(bytes)?)?;
            let out = entity::serialize(&next, key)?;
            changed = Some(next);
            Ok(out)
        })?;
        let entity = changed.ok_or_else(|| PipelineError::Store(format!("{key} was not modified")))?;
        Ok((entity, commit))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
