/// HTTP server for Cortex Plan.
///
/// This module provides the [`Router`] which serves the JSON API and
/// dispatches requests to a [`StudyPlanner`](crate::StudyPlanner).
pub mod router;

pub use router::{ApiResponse, Router};
