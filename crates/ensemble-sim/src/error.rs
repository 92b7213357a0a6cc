//! Error kinds produced while a simulation is running.
//!
//! Construction-time failures live in [`ensemble_types::ConstructionError`];
//! this module covers everything that can happen once `simulate` is
//! underway (spec.md §7).

pub use ensemble_types::{ConstructionError, RemoteCallError};

/// An error surfaced from a running simulation, either as `Results.err` or
/// as the error a proxy call returns to a suspended op body.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// An op body returned a non-nil error. This is a *successful*
    /// simulation that found a bug, not an internal failure — it becomes
    /// `Results.err` verbatim (spec.md §7).
    #[error("{0}")]
    OpFailed(anyhow::Error),

    /// The outer caller's context was cancelled, or this is the error
    /// surfaced to a fiber that observed cancellation triggered elsewhere
    /// (spec.md §9, Open Question: cancellation source is distinguished
    /// from op failure here).
    #[error("simulation cancelled")]
    Cancelled,

    /// A replica implementation panicked while handling a delivered call.
    /// Preserved as a fatal error rather than silently converted to
    /// [`RemoteCallError`] (spec.md §4.5).
    #[error("replica panicked: {0}")]
    ReplicaPanicked(String),

    /// Internal programming error: an op referenced a component that was
    /// never registered, or a candidate kind the scheduler doesn't
    /// recognize. Should never occur outside of a bug in this crate or its
    /// host.
    #[error("internal simulator error: {0}")]
    Internal(String),
}

impl SimError {
    /// The string recorded on `OpFinish` when an op body fails, matching
    /// the op body's own error `Display` rather than this wrapper's.
    pub fn op_finish_message(&self) -> String {
        match self {
            SimError::OpFailed(err) => err.to_string(),
            other => other.to_string(),
        }
    }
}
