//! Enrichment routing for the LLMC RAG core.
//!
//! Maps each work item's slice family to a named chain, cascades through
//! the chain's backends on retryable exhaustion, validates structured
//! output, and assembles the per-attempt routing decision for audit.

pub mod errors;
pub mod invoker;
pub mod router;

pub use errors::{Result, RouterError};
pub use invoker::{BackendInvoker, GatewayInvoker};
pub use router::{Enriched, RouteOutcome, Router};
