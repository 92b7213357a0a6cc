//! Queues of in-flight calls and replies, with uniform random pop
//! (spec.md §4.3: "not FIFO — any permutation of pending items is valid").

use ensemble_types::{SpanId, TraceId};
use rand::Rng;
use tokio::sync::oneshot;

use crate::Value;

/// A pending method invocation produced by a proxy, awaiting a scheduler
/// decision (spec.md §3).
pub struct PendingCall {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub caller: String,
    pub caller_replica: String,
    pub component: String,
    pub method: String,
    pub args: Vec<Value>,
    pub reply_tx: oneshot::Sender<Vec<Value>>,
}

/// A pending delivery produced once a replica method has returned, awaiting
/// release to its caller (spec.md §3).
pub struct PendingReply {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub component: String,
    pub replica: usize,
    pub method: String,
    pub returns: Vec<Value>,
    pub reply_tx: oneshot::Sender<Vec<Value>>,
}

/// Swap-remove is acceptable per spec.md §4.3 — pop order need not be
/// stable, only uniformly random.
#[derive(Default)]
pub struct PendingQueues {
    calls: Vec<PendingCall>,
    replies: Vec<PendingReply>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_call(&mut self, call: PendingCall) {
        self.calls.push(call);
    }

    pub fn push_reply(&mut self, reply: PendingReply) {
        self.replies.push(reply);
    }

    pub fn calls_len(&self) -> usize {
        self.calls.len()
    }

    pub fn replies_len(&self) -> usize {
        self.replies.len()
    }

    pub fn pop_random_call(&mut self, rng: &mut impl Rng) -> Option<PendingCall> {
        if self.calls.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.calls.len());
        Some(self.calls.swap_remove(index))
    }

    pub fn pop_random_reply(&mut self, rng: &mut impl Rng) -> Option<PendingReply> {
        if self.replies.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.replies.len());
        Some(self.replies.swap_remove(index))
    }
}
