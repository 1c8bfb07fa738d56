//! Stable exit codes for front ends consuming the core.
//!
//! Shell wrappers and CLI front ends script against these values; they
//! must not be renumbered.

/// Operation completed.
pub const SUCCESS: i32 = 0;
/// Unclassified failure.
pub const GENERIC_ERROR: i32 = 1;
/// Caller supplied invalid arguments or configuration.
pub const BAD_ARGS: i32 = 2;
/// Index is stale or missing; results were refused.
pub const STALE_INDEX: i32 = 3;
/// The batch only contained poisoned spans.
pub const POISONED_BATCH: i32 = 4;
/// A cost cap denied the operation.
pub const OVER_BUDGET: i32 = 5;
