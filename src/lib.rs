//! Cortex Plan is a small personal study planner.
//!
//! Users keep track of subjects, exams, lessons and study sessions. Every
//! record kind lives in its own partition of a key-value store together with
//! an ordered index of ids, so a kind can be listed without scanning the
//! whole key space.
//!
//! ## Core Components
//! - [`engine`]: The key-value backend (in-memory with atomic persistence).
//! - [`store`]: The generic indexed entity store.
//! - [`model`]: Subjects, exams, study sessions and lessons.
//! - [`planner`]: The planner service tying the four stores together.
//! - [`server`]: HTTP API.
//! - [`sdk`]: Remote HTTP client and embedded/remote discovery.

pub mod engine;
pub mod insights;
pub mod model;
pub mod planner;
pub mod sdk;
pub mod server;
pub mod store;
pub mod time;

pub use model::Kind;
pub use planner::{Planner, StudyPlanner};

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by Cortex Plan.
#[derive(Error, Debug)]
pub enum Error {
    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),
    /// The targeted record does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A record with the same id already exists.
    #[error("{0}")]
    Conflict(String),
    /// The storage backend could not be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Transport error while talking to a remote planner.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for Cortex Plan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single mutation inside a [`KVWriter::write_batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { key: String, value: serde_json::Value },
    Delete { key: String },
}

/// Defines basic read operations for the backend.
#[async_trait]
pub trait KVReader: Send + Sync {
    /// Retrieves a value from a partition, `None` if the key is absent.
    async fn get(&self, partition: &str, key: &str) -> Result<Option<serde_json::Value>>;
    /// Lists all partitions that currently hold data.
    async fn partitions(&self) -> Result<Vec<String>>;
}

/// Defines write operations for the backend.
#[async_trait]
pub trait KVWriter: Send + Sync {
    /// Applies `ops` to one partition as a single unit: either all of them
    /// become visible or none does.
    async fn write_batch(&self, partition: &str, ops: Vec<WriteOp>) -> Result<()>;
}

/// The backend contract the entity stores are built on.
pub trait KVStore: KVReader + KVWriter {}

impl<T: KVReader + KVWriter> KVStore for T {}
