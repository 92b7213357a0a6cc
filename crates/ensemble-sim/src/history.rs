//! The append-only typed event log (spec.md §3, §4.6).
//!
//! `History` imposes no schema beyond the variants below; ordering is
//! whatever order the scheduler's mutex-protected appends executed in, and
//! that linearization is exactly what the testable properties in spec.md §8
//! assert against.

use ensemble_types::{SpanId, TraceId};
use serde::{Deserialize, Serialize};

/// One causal event. Every variant carries the (trace id, span id) pair it
/// belongs to, even though some variants (`DeliverCall`, `DeliverReturn`,
/// `DeliverError`) don't need the trace id for anything but bookkeeping —
/// kept uniform so the renderer doesn't need a second lookup pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    OpStart {
        trace_id: TraceId,
        span_id: SpanId,
        name: String,
        args: String,
    },
    OpFinish {
        trace_id: TraceId,
        span_id: SpanId,
        error: String,
    },
    Call {
        trace_id: TraceId,
        span_id: SpanId,
        caller: String,
        caller_replica: String,
        component: String,
        method: String,
        args: Vec<String>,
    },
    DeliverCall {
        trace_id: TraceId,
        span_id: SpanId,
        component: String,
        replica: usize,
    },
    Return {
        trace_id: TraceId,
        span_id: SpanId,
        component: String,
        replica: usize,
        returns: Vec<String>,
    },
    DeliverReturn {
        trace_id: TraceId,
        span_id: SpanId,
    },
    DeliverError {
        trace_id: TraceId,
        span_id: SpanId,
    },
}

impl Event {
    pub fn trace_id(&self) -> TraceId {
        match self {
            Event::OpStart { trace_id, .. }
            | Event::OpFinish { trace_id, .. }
            | Event::Call { trace_id, .. }
            | Event::DeliverCall { trace_id, .. }
            | Event::Return { trace_id, .. }
            | Event::DeliverReturn { trace_id, .. }
            | Event::DeliverError { trace_id, .. } => *trace_id,
        }
    }

    pub fn span_id(&self) -> SpanId {
        match self {
            Event::OpStart { span_id, .. }
            | Event::OpFinish { span_id, .. }
            | Event::Call { span_id, .. }
            | Event::DeliverCall { span_id, .. }
            | Event::Return { span_id, .. }
            | Event::DeliverReturn { span_id, .. }
            | Event::DeliverError { span_id, .. } => *span_id,
        }
    }
}

/// The history recorder. Lives inside `SchedulerState`, guarded by the same
/// mutex as the RNG and queues — it has no lock of its own (spec.md §9,
/// "single global mutex").
#[derive(Debug, Default, Clone)]
pub struct History(Vec<Event>);

impl History {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, event: Event) {
        self.0.push(event);
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Event> {
        self.0
    }
}
