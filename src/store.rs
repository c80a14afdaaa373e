//! Generic identifier-keyed record storage with an ordered index.
//!
//! Every [`Entity`] kind owns one backend partition named after its
//! [`Entity::INDEX_NAME`]. A record with id `X` is stored under `item:X` and
//! the insertion-ordered list of ids under `index`. Record and index always
//! change in the same [`WriteOp`] batch, so an id is in the index if and only
//! if its record exists.

use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{Error, KVStore, Result, WriteOp};

const INDEX_KEY: &str = "index";

/// A record kind that can be kept in an [`EntityStore`].
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Singular, human-readable name, e.g. `subject`.
    const ENTITY_NAME: &'static str;
    /// Name of the partition and index, e.g. `subjects`.
    const INDEX_NAME: &'static str;

    /// Partial update. Fields that serialize as absent or `null` are left
    /// untouched by [`EntityStore::patch`].
    type Patch: Serialize + Send + Sync;

    fn id(&self) -> &str;

    /// Checks record-level rules before every write.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Storage for one record kind.
///
/// Mutations on one store are serialized, so concurrent creates and deletes
/// never drop each other's index entries. Stores of different kinds share
/// nothing but the backend.
pub struct EntityStore<T: Entity> {
    backend: Arc<dyn KVStore>,
    writer: Mutex<()>,
    _kind: PhantomData<fn() -> T>,
}

fn item_key(id: &str) -> String {
    format!("item:{}", id)
}

impl<T: Entity> EntityStore<T> {
    pub fn new(backend: Arc<dyn KVStore>) -> Self {
        Self {
            backend,
            writer: Mutex::new(()),
            _kind: PhantomData,
        }
    }

    fn not_found(id: &str) -> Error {
        Error::NotFound(format!("{} {} not found", T::ENTITY_NAME, id))
    }

    async fn read_index(&self) -> Result<Vec<String>> {
        match self.backend.get(T::INDEX_NAME, INDEX_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Stores a fully populated record and appends its id to the index.
    ///
    /// Fails with [`Error::Validation`] on an empty id and with
    /// [`Error::Conflict`] if the id is already taken.
    pub async fn create(&self, record: T) -> Result<T> {
        let id = record.id().trim().to_string();
        if id.is_empty() || id != record.id() {
            return Err(Error::Validation(format!("{} id must be a non-empty string", T::ENTITY_NAME)));
        }

        record.validate()?;

        let _guard = self.writer.lock().await;
        if self.exists(&id).await? {
            return Err(Error::Conflict(format!("{} {} already exists", T::ENTITY_NAME, id)));
        }

        let mut index = self.read_index().await?;
        index.push(id.clone());

        self.backend
            .write_batch(
                T::INDEX_NAME,
                vec![
                    WriteOp::Put { key: item_key(&id), value: serde_json::to_value(&record)? },
                    WriteOp::Put { key: INDEX_KEY.to_string(), value: serde_json::to_value(&index)? },
                ],
            )
            .await?;
        debug!("created {} {}", T::ENTITY_NAME, id);
        Ok(record)
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.backend.get(T::INDEX_NAME, &item_key(id)).await?.is_some())
    }

    /// Returns the current record, or [`Error::NotFound`].
    pub async fn get_state(&self, id: &str) -> Result<T> {
        let value = self
            .backend
            .get(T::INDEX_NAME, &item_key(id))
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Merges the provided fields of `patch` into an existing record.
    ///
    /// There is no upsert: a missing record is [`Error::NotFound`]. The id is
    /// never changed, and a merge that no longer fits the record shape is
    /// rejected with [`Error::Validation`].
    pub async fn patch(&self, id: &str, patch: &T::Patch) -> Result<T> {
        let fields = match serde_json::to_value(patch)? {
            serde_json::Value::Object(map) => map,
            _ => return Err(Error::Validation(format!("{} patch must be an object", T::ENTITY_NAME))),
        };

        let _guard = self.writer.lock().await;
        let current = self
            .backend
            .get(T::INDEX_NAME, &item_key(id))
            .await?
            .ok_or_else(|| Self::not_found(id))?;

        let mut merged = match current {
            serde_json::Value::Object(map) => map,
            _ => return Err(Error::Internal(format!("{} {} is not an object", T::ENTITY_NAME, id))),
        };
        for (field, value) in fields {
            if value.is_null() || field == "id" {
                continue;
            }
            merged.insert(field, value);
        }

        let record: T = serde_json::from_value(serde_json::Value::Object(merged))
            .map_err(|e| Error::Validation(format!("invalid {} update: {}", T::ENTITY_NAME, e)))?;
        record.validate()?;

        self.backend
            .write_batch(
                T::INDEX_NAME,
                vec![WriteOp::Put { key: item_key(id), value: serde_json::to_value(&record)? }],
            )
            .await?;
        debug!("patched {} {}", T::ENTITY_NAME, id);
        Ok(record)
    }

    /// Removes a record and its index entry. Returns `false` if there was
    /// nothing to delete.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.writer.lock().await;
        if !self.exists(id).await? {
            return Ok(false);
        }

        let mut index = self.read_index().await?;
        index.retain(|existing| existing != id);

        self.backend
            .write_batch(
                T::INDEX_NAME,
                vec![
                    WriteOp::Delete { key: item_key(id) },
                    WriteOp::Put { key: INDEX_KEY.to_string(), value: serde_json::to_value(&index)? },
                ],
            )
            .await?;
        debug!("deleted {} {}", T::ENTITY_NAME, id);
        Ok(true)
    }

    /// All records in insertion order.
    pub async fn list(&self) -> Result<Vec<T>> {
        let index = self.read_index().await?;
        let mut items = Vec::with_capacity(index.len());
        for id in index {
            match self.backend.get(T::INDEX_NAME, &item_key(&id)).await? {
                Some(value) => items.push(serde_json::from_value(value)?),
                None => warn!("{} index references missing record {}", T::ENTITY_NAME, id),
            }
        }
        Ok(items)
    }
}
