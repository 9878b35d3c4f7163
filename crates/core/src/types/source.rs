//! Provenance of a value returned by the inventory service.

use serde::{Deserialize, Serialize};

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Served from the cache without touching the durable store.
    Cache,
    /// Loaded from the durable store (and, best-effort, cached).
    Store,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Store => write!(f, "store"),
        }
    }
}
