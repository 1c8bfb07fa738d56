//! Shared process-level services for the LLMC RAG core.
//!
//! Small, dependency-light building blocks that every other crate leans on:
//! - [`paths`]: canonicalization and workspace containment checks
//! - [`lock`]: advisory per-repo write locks
//! - [`pool`]: a bounded worker pool with backpressure
//! - [`cancel`]: cooperative cancellation tokens
//! - [`telemetry`]: tracing subscriber setup
//! - [`exit`]: stable exit codes for front ends consuming the core

pub mod cancel;
pub mod exit;
pub mod lock;
pub mod paths;
pub mod pool;
pub mod telemetry;

pub use cancel::CancelToken;
pub use lock::{LockError, RepoLock, RepoLockGuard};
pub use paths::{PathError, canonicalize_under, global_dir, is_inside, workspace_dir};
pub use pool::{PoolError, WorkerPool};
