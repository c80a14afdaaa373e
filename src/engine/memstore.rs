use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use async_trait::async_trait;
use crate::{Result, Error, KVReader, KVWriter, WriteOp};
use crate::engine::{PartitionData, Persistence};

type StoreData = HashMap<String, PartitionData>;

/// In-memory key-value backend with optional write-through persistence.
///
/// Writers are serialized per partition. A batch is applied to a copy of its
/// partition, the copy is persisted, and only then swapped into the live map,
/// so a failed disk write never becomes visible to readers. Once started, a
/// batch runs to completion even if the calling future is dropped.
pub struct MemStore {
    inner: Arc<Inner>,
}

struct Inner {
    data: RwLock<StoreData>,
    persistence: Option<Arc<Persistence>>,
    writers: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> Error {
    Error::Internal(e.to_string())
}

impl Inner {
    fn partition_lock(&self, partition: &str) -> Result<Arc<Mutex<()>>> {
        let mut writers = self.writers.lock().map_err(poisoned)?;
        Ok(writers.entry(partition.to_string()).or_default().clone())
    }

    fn copy_partition(&self, partition: &str) -> Result<PartitionData> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(partition).cloned().unwrap_or_default())
    }

    /// Copy, apply, persist, swap. Blocks on disk I/O when persistent.
    fn apply_batch(&self, partition: &str, ops: Vec<WriteOp>) -> Result<()> {
        let lock = self.partition_lock(partition)?;
        let _guard = lock.lock().map_err(poisoned)?;

        let mut snapshot = self.copy_partition(partition)?;
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    snapshot.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    snapshot.remove(&key);
                }
            }
        }

        if let Some(p) = &self.persistence {
            if let Err(e) = p.save_partition(partition, &snapshot) {
                log::error!("Failed to persist partition {}: {}", partition, e);
                return Err(e);
            }
        }

        let mut data = self.data.write().map_err(poisoned)?;
        data.insert(partition.to_string(), snapshot);
        Ok(())
    }
}

impl MemStore {
    pub fn new(initial_data: StoreData, persistence: Option<Arc<Persistence>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                data: RwLock::new(initial_data),
                persistence,
                writers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// An empty store that never touches disk.
    pub fn in_memory() -> Self {
        Self::new(HashMap::new(), None)
    }

    /// Opens a persisted store, loading everything already in `persistence`.
    pub fn open(persistence: Persistence) -> Result<Self> {
        let initial_data = persistence.load_all()?;
        Ok(Self::new(initial_data, Some(Arc::new(persistence))))
    }
}

#[async_trait]
impl KVReader for MemStore {
    async fn get(&self, partition: &str, key: &str) -> Result<Option<serde_json::Value>> {
        let data = self.inner.data.read().map_err(poisoned)?;
        Ok(data.get(partition).and_then(|p| p.get(key)).cloned())
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        let data = self.inner.data.read().map_err(poisoned)?;
        let mut names: Vec<String> = data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl KVWriter for MemStore {
    async fn write_batch(&self, partition: &str, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        if self.inner.persistence.is_none() {
            return self.inner.apply_batch(partition, ops);
        }

        // The detached task owns the whole batch, so dropping this future
        // cannot leave disk ahead of memory.
        let inner = self.inner.clone();
        let partition = partition.to_string();
        tokio::task::spawn_blocking(move || inner.apply_batch(&partition, ops))
            .await
            .map_err(|e| Error::Internal(format!("persistence task failed: {}", e)))?
    }
}
