/// Software Development Kit (SDK) for Cortex Plan.
///
/// This module provides a remote HTTP client and automatic mode discovery, so
/// tools can talk to a running daemon or open the data directory directly.
pub mod client;
/// Automatic mode discovery and planner initialization.
pub mod discovery;

pub use client::Client;
pub use discovery::new;
