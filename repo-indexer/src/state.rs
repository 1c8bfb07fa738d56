//! Orchestrator phase tracking.

use serde::{Deserialize, Serialize};

/// Per-repo pipeline phase, driven by the daemon and exposed through the
/// health check. Transitions are cancellable at safe points (between
/// files, between batches).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Idle,
    Discovering,
    Slicing,
    Storing,
    Embedding,
    Enriching,
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexPhase::Idle => "idle",
            IndexPhase::Discovering => "discovering",
            IndexPhase::Slicing => "slicing",
            IndexPhase::Storing => "storing",
            IndexPhase::Embedding => "embedding",
            IndexPhase::Enriching => "enriching",
        };
        f.write_str(s)
    }
}
