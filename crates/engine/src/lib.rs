//! Multi-server sync orchestrator.
//!
//! One [`Orchestrator`] owns the per-server contexts, the bootstrap
//! bookkeeping and the upstream clients. Host processes only decide when to
//! call [`Orchestrator::run_cycle`] and the digest jobs.

pub mod digests;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod sweep;

#[cfg(test)]
mod testing;

pub use error::SyncError;
pub use orchestrator::Orchestrator;
pub use registry::{Registry, ServerContext, SharedClock, StoreLocation};
pub use report::{CycleReport, FetchKind, FetchOutcome, FetchReport, ServerReport, SweepReport};
