//! Per-invocation metadata carried from a proxy call into an op body and
//! back out again. Stands in for the ambient-context mechanism described in
//! spec.md §9: the key property preserved here is that a proxy can always
//! recover the caller's [`TraceId`].

use ensemble_types::TraceId;

use crate::cancellation::Cancellation;

/// Carried alongside every op body and proxy call. `trace_id` propagates
/// unchanged from the owning operation; span ids do not live here because a
/// fresh one is minted for every call (spec.md §3, "Identifiers").
#[derive(Clone)]
pub struct Context {
    trace_id: TraceId,
    cancellation: Cancellation,
}

impl Context {
    pub(crate) fn new(trace_id: TraceId, cancellation: Cancellation) -> Self {
        Self {
            trace_id,
            cancellation,
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }
}
