use std::env;
use std::sync::Arc;
use crate::{Planner, Result, StudyPlanner};
use crate::engine::{MemStore, Persistence};
use crate::sdk::Client;

/// Environment variable naming a running daemon, e.g. `127.0.0.1:8787`.
pub const ADDR_ENV: &str = "CORTEX_ADDR";

/// Initializes a [`StudyPlanner`] based on the environment.
///
/// `new` automatically detects whether to talk to a remote daemon or
/// open the data directory in-process:
///
/// 1. If the `CORTEX_ADDR` environment variable is set, it attempts to
///    connect to that address in **Remote Mode**.
/// 2. Otherwise, or if the daemon does not answer, it opens a [`MemStore`]
///    with [`Persistence`] in `data_dir` in **Embedded Mode**.
///
/// # Examples
///
/// ```no_run
/// use cortex_plan::sdk;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let planner = sdk::new("./data").await?;
///     Ok(())
/// }
/// ```
pub async fn new(data_dir: &str) -> Result<Arc<dyn StudyPlanner>> {
    if let Ok(addr) = env::var(ADDR_ENV) {
        if !addr.is_empty() {
            match Client::connect(&addr).await {
                Ok(client) => return Ok(Arc::new(client)),
                Err(e) => log::warn!("Could not reach planner at {}: {}. Falling back to embedded mode.", addr, e),
            }
        }
    }

    embedded(data_dir)
}

/// Opens the data directory in-process.
pub fn embedded(data_dir: &str) -> Result<Arc<dyn StudyPlanner>> {
    let store = MemStore::open(Persistence::new(data_dir)?)?;
    Ok(Arc::new(Planner::new(Arc::new(store))))
}
