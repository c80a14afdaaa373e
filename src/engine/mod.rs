pub mod memstore;
pub mod persistence;

pub use memstore::MemStore;
pub use persistence::{PartitionData, Persistence};
