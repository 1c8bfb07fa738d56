//! Per-repo indexing orchestration for the LLMC RAG core.
//!
//! Discovery, slicing, storage, embedding, and enrichment batches for a
//! single repo, driven by the refresh daemon under the repo write lock.

pub mod discover;
pub mod errors;
pub mod indexer;
pub mod state;

pub use discover::{DiscoveredFile, discover};
pub use errors::{IndexError, Result};
pub use indexer::{EnrichSummary, IndexerConfig, RepoIndexer, SyncSummary};
pub use state::IndexPhase;
