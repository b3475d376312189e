//! Search orchestrator: backend selection, concurrent fan-out, fusion.
//!
//! [`Orchestrator`] dispatches one query to the selected backends
//! concurrently, deduplicates the combined results by location, ranks them
//! by score and wraps everything in a [`SearchEnvelope`](crate::SearchEnvelope).

pub mod dedup;
pub mod preview;
pub mod ranking;
pub mod search;
pub(crate) mod select;

pub use search::Orchestrator;
