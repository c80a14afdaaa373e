use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use crate::{Result, Error};
use log::warn;

/// Contents of one partition: `key -> value`.
pub type PartitionData = HashMap<String, serde_json::Value>;

/// Handles disk I/O for the [`MemStore`](crate::engine::MemStore).
///
/// Persistence uses an atomic "write-then-rename" strategy to ensure data integrity.
/// Each partition is stored in its own `.json` file.
pub struct Persistence {
    data_dir: PathBuf,
}

impl Persistence {
    /// Initializes a new `Persistence` handler in the specified directory.
    ///
    /// If the directory does not exist, it will be created.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { data_dir: dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Writes a single partition to a JSON file atomically.
    ///
    /// The data is written to a temporary file first and then renamed over the
    /// final destination, so a crash never leaves a half-written partition.
    pub fn save_partition(&self, partition: &str, data: &PartitionData) -> Result<()> {
        validate_partition_name(partition)?;
        let file_path = self.data_dir.join(format!("{}.json", partition));
        let temp_path = file_path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(data)?;

        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &file_path)?;

        Ok(())
    }

    /// Loads every partition found in the data directory.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub fn load_all(&self) -> Result<HashMap<String, PartitionData>> {
        let mut all_data = HashMap::new();

        if !self.data_dir.exists() {
            return Ok(all_data);
        }

        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                let partition = path.file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| Error::Internal("Invalid filename".to_string()))?
                    .to_string();

                let content = match fs::read(&path) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("Could not read partition file {:?}: {}", path, e);
                        continue;
                    }
                };

                let data: PartitionData = match serde_json::from_slice(&content) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("Could not unmarshal partition data from {:?}: {}", path, e);
                        continue;
                    }
                };

                all_data.insert(partition, data);
            }
        }

        Ok(all_data)
    }
}

fn validate_partition_name(partition: &str) -> Result<()> {
    let valid = !partition.is_empty()
        && partition
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(Error::Internal(format!("invalid partition name: {:?}", partition)));
    }
    Ok(())
}
