//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::ConnectionRegistry;
use crate::handler::DataHandler;

/// Shared application state for all handlers
pub struct AppState {
    /// Configured endpoints by name
    pub handlers: BTreeMap<String, Arc<DataHandler>>,
    /// Registry shared by every endpoint
    pub registry: Arc<ConnectionRegistry>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state from built handlers and the registry they share
    pub fn new(handlers: BTreeMap<String, DataHandler>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            handlers: handlers
                .into_iter()
                .map(|(name, handler)| (name, Arc::new(handler)))
                .collect(),
            registry,
            start_time: Instant::now(),
        }
    }

    pub fn handler(&self, name: &str) -> Option<Arc<DataHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
