//! The central event loop (spec.md §4.3, §9).
//!
//! All nondeterminism in a run flows through one seeded RNG, guarded by one
//! mutex ([`SchedulerState`]) alongside the pending queues, the history, and
//! the trace/span counters. `step` is the only place a random choice is
//! made; everything else — proxy calls, op and delivery fibers — only ever
//! *enqueues* work and waits for `step` to pick it up.
//!
//! Reproducibility additionally requires that `simulate` is driven on a
//! current-thread `tokio` runtime. Nothing here performs real I/O or real
//! sleeps (spec.md's own non-goals), so with a single-threaded executor the
//! order in which concurrent fibers reach the scheduler mutex is itself
//! fully determined by prior RNG-driven decisions, not by wall-clock
//! scheduling — that's what makes "same seed, same history" hold in
//! practice.

use std::sync::Arc;

use ensemble_types::{SpanId, TraceId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::cancellation::{self, CancelReason, Canceller, Cancellation};
use crate::context::Context;
use crate::error::SimError;
use crate::fiber;
use crate::history::{Event, History};
use crate::opset::{Op, OpSet};
use crate::options::Options;
use crate::queues::{PendingCall, PendingQueues, PendingReply};
use crate::registry::Registry;
use crate::Value;

/// The five candidate action kinds a step may choose between (spec.md
/// §4.3). `DeliverCallError`/`DeliverReplyError` are only candidates when
/// their matching queue is non-empty, exactly like their non-error
/// counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    RunOp,
    DeliverCall,
    DeliverCallError,
    DeliverReply,
    DeliverReplyError,
}

enum Action {
    RunOp(Arc<Op>),
    DeliverCall(PendingCall),
    DeliverCallError(PendingCall),
    DeliverReply(PendingReply),
    DeliverReplyError(PendingReply),
}

struct SchedulerState {
    rng: StdRng,
    queues: PendingQueues,
    history: History,
    executed_ops: i64,
    next_trace: u64,
    next_span: u64,
    first_error: Option<SimError>,
}

impl SchedulerState {
    fn mint_trace(&mut self) -> TraceId {
        let id = self.next_trace;
        self.next_trace += 1;
        TraceId::new(id)
    }

    fn mint_span(&mut self) -> SpanId {
        let id = self.next_span;
        self.next_span += 1;
        SpanId::new(id)
    }
}

struct Inner {
    state: Mutex<SchedulerState>,
    tasks: Mutex<JoinSet<Result<(), SimError>>>,
    registry: Registry,
    ops: OpSet,
    num_ops: i64,
    cancellation: Cancellation,
    canceller: Canceller,
}

/// Cheaply cloneable handle to the scheduler's shared state. Proxies
/// (`ComponentHandle`) and fibers hold one of these to enqueue work and to
/// read the cancellation scope; only [`Scheduler::simulate`] drives the
/// actual loop.
#[derive(Clone)]
pub struct SchedulerHandle(Arc<Inner>);

/// The outcome of a complete `simulate` run (spec.md §6).
pub struct Results {
    /// The first error observed — from a failing op body, a replica panic,
    /// or an internal bug. `None` means every spawned op completed without
    /// error before the run went idle.
    pub err: Option<SimError>,
    pub history: Vec<Event>,
}

/// Owns the only strong path to driving a run to completion. Built once per
/// simulation by the top-level `Simulator` facade.
pub struct Scheduler {
    handle: SchedulerHandle,
}

impl Scheduler {
    pub(crate) fn new(registry: Registry, ops: OpSet, options: &Options) -> Self {
        let (canceller, cancellation) = cancellation::scope();
        let inner = Inner {
            state: Mutex::new(SchedulerState {
                // `seed` is a user-facing i64 (spec.md §6); StdRng wants a
                // u64 seed, so we reinterpret the bits rather than reject
                // negative seeds.
                rng: StdRng::seed_from_u64(options.seed as u64),
                queues: PendingQueues::new(),
                history: History::new(),
                executed_ops: 0,
                next_trace: 1,
                next_span: 1,
                first_error: None,
            }),
            tasks: Mutex::new(JoinSet::new()),
            registry,
            ops,
            num_ops: options.num_ops,
            cancellation,
            canceller,
        };
        Self {
            handle: SchedulerHandle(Arc::new(inner)),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Drives the run to completion: repeatedly calls `step`, spawning
    /// fibers for `RunOp`/`DeliverCall` choices, until no candidate remains
    /// and every spawned fiber has finished, an op fails, or `external_cancel`
    /// resolves first (spec.md §9, "Cancellation").
    pub async fn simulate<F>(self, external_cancel: F) -> Results
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle_for_cancel = self.handle.clone();
        tokio::spawn(async move {
            external_cancel.await;
            handle_for_cancel.fail(SimError::Cancelled).await;
        });

        loop {
            if self.handle.0.cancellation.is_cancelled() {
                break;
            }
            if self.handle.step().await {
                continue;
            }
            if self.handle.fiber_count().await == 0 {
                break;
            }
            // No candidate is available yet, but a fiber is mid-flight
            // toward producing one — e.g. an op fiber that hasn't reached
            // its proxy call, or a delivery fiber still awaiting its
            // replica's nested task. Give the runtime a tick so it can
            // progress, opportunistically recording any fiber that
            // completes in the same tick rather than blocking on one.
            tokio::select! {
                joined = self.handle.try_join_fiber() => {
                    if let Some(joined) = joined {
                        self.handle.record_fiber_outcome(joined).await;
                    }
                }
                () = tokio::task::yield_now() => {}
            }
        }

        self.handle.drain_fibers().await;

        let mut state = self.handle.0.state.lock().await;
        Results {
            err: state.first_error.take(),
            history: std::mem::take(&mut state.history).into_vec(),
        }
    }
}

impl SchedulerHandle {
    /// Called by `ComponentHandle::call` (spec.md §4.1). Mints a fresh
    /// `SpanId` and appends the `Call` event under the scheduler lock, then
    /// enqueues the pending call and returns the span id plus the receiver
    /// half of the reply channel.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn enqueue_call(
        &self,
        trace_id: TraceId,
        caller: String,
        caller_replica: String,
        component: String,
        method: String,
        args: Vec<Value>,
    ) -> (SpanId, oneshot::Receiver<Vec<Value>>) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.0.state.lock().await;
        let span_id = state.mint_span();
        state.history.push(Event::Call {
            trace_id,
            span_id,
            caller: caller.clone(),
            caller_replica: caller_replica.clone(),
            component: component.clone(),
            method: method.clone(),
            args: args.iter().map(stringify).collect(),
        });
        state.queues.push_call(PendingCall {
            trace_id,
            span_id,
            caller,
            caller_replica,
            component,
            method,
            args,
            reply_tx: tx,
        });
        (span_id, rx)
    }

    pub(crate) fn cancellation(&self) -> &Cancellation {
        &self.0.cancellation
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.0.registry
    }

    /// Generates `op`'s argument, mints its trace/span ids, and records
    /// `OpStart`, all under one lock acquisition (spec.md §4.4).
    pub(crate) async fn begin_op(&self, op: &Op) -> (TraceId, SpanId, Box<dyn std::any::Any + Send>) {
        let mut state = self.0.state.lock().await;
        let (arg, rendered) = op.generate(&mut state.rng);
        let trace_id = state.mint_trace();
        let span_id = state.mint_span();
        state.history.push(Event::OpStart {
            trace_id,
            span_id,
            name: op.name().to_string(),
            args: rendered,
        });
        (trace_id, span_id, arg)
    }

    pub(crate) async fn finish_op(&self, trace_id: TraceId, span_id: SpanId, error: String) {
        let mut state = self.0.state.lock().await;
        state.history.push(Event::OpFinish {
            trace_id,
            span_id,
            error,
        });
    }

    /// Chooses a replica uniformly at random and records `DeliverCall`
    /// (spec.md §4.5).
    pub(crate) async fn begin_delivery(&self, trace_id: TraceId, span_id: SpanId, component: &str) -> usize {
        let mut state = self.0.state.lock().await;
        let count = self.0.registry.replica_count(component).max(1);
        let replica = state.rng.gen_range(0..count);
        state.history.push(Event::DeliverCall {
            trace_id,
            span_id,
            component: component.to_string(),
            replica,
        });
        replica
    }

    /// Records `Return` and enqueues the reply for the scheduler's own
    /// later, possibly error-injecting, delivery back to the caller
    /// (spec.md §4.5).
    pub(crate) async fn finish_delivery(
        &self,
        trace_id: TraceId,
        span_id: SpanId,
        component: String,
        method: String,
        replica: usize,
        returns: Vec<Value>,
        reply_tx: oneshot::Sender<Vec<Value>>,
    ) {
        let mut state = self.0.state.lock().await;
        state.history.push(Event::Return {
            trace_id,
            span_id,
            component: component.clone(),
            replica,
            returns: returns.iter().map(stringify).collect(),
        });
        state.queues.push_reply(PendingReply {
            trace_id,
            span_id,
            component,
            replica,
            method,
            returns,
            reply_tx,
        });
    }

    /// Records `err` as the run's first error (if none is recorded yet) and
    /// cancels the scope so no further candidates are chosen.
    pub(crate) async fn fail(&self, err: SimError) {
        let reason = match err {
            SimError::Cancelled => CancelReason::Caller,
            _ => CancelReason::OpFailure,
        };
        {
            let mut state = self.0.state.lock().await;
            if state.first_error.is_none() {
                state.first_error = Some(err);
            }
        }
        self.0.canceller.cancel(reason);
    }

    async fn spawn_fiber<Fut>(&self, fut: Fut)
    where
        Fut: std::future::Future<Output = Result<(), SimError>> + Send + 'static,
    {
        self.0.tasks.lock().await.spawn(fut);
    }

    /// Applies one scheduling decision. Returns `false` if no candidate was
    /// available (the state mutex saw an idle scheduler).
    async fn step(&self) -> bool {
        if self.0.cancellation.is_cancelled() {
            return false;
        }

        let action = {
            let mut state = self.0.state.lock().await;
            if self.0.cancellation.is_cancelled() {
                return false;
            }

            let mut candidates = Vec::with_capacity(5);
            if state.executed_ops < self.0.num_ops {
                candidates.push(Candidate::RunOp);
            }
            if state.queues.calls_len() > 0 {
                candidates.push(Candidate::DeliverCall);
                candidates.push(Candidate::DeliverCallError);
            }
            if state.queues.replies_len() > 0 {
                candidates.push(Candidate::DeliverReply);
                candidates.push(Candidate::DeliverReplyError);
            }
            if candidates.is_empty() {
                return false;
            }

            let choice = candidates[state.rng.gen_range(0..candidates.len())];
            trace!(?choice, "scheduler step");
            match choice {
                Candidate::RunOp => {
                    state.executed_ops += 1;
                    let index = state.rng.gen_range(0..self.0.ops.len());
                    Action::RunOp(self.0.ops.get(index))
                }
                Candidate::DeliverCall => {
                    let call = state
                        .queues
                        .pop_random_call(&mut state.rng)
                        .expect("candidate implied a non-empty call queue");
                    Action::DeliverCall(call)
                }
                Candidate::DeliverCallError => {
                    let call = state
                        .queues
                        .pop_random_call(&mut state.rng)
                        .expect("candidate implied a non-empty call queue");
                    state.history.push(Event::DeliverError {
                        trace_id: call.trace_id,
                        span_id: call.span_id,
                    });
                    Action::DeliverCallError(call)
                }
                Candidate::DeliverReply => {
                    let reply = state
                        .queues
                        .pop_random_reply(&mut state.rng)
                        .expect("candidate implied a non-empty reply queue");
                    state.history.push(Event::DeliverReturn {
                        trace_id: reply.trace_id,
                        span_id: reply.span_id,
                    });
                    Action::DeliverReply(reply)
                }
                Candidate::DeliverReplyError => {
                    let reply = state
                        .queues
                        .pop_random_reply(&mut state.rng)
                        .expect("candidate implied a non-empty reply queue");
                    state.history.push(Event::DeliverError {
                        trace_id: reply.trace_id,
                        span_id: reply.span_id,
                    });
                    Action::DeliverReplyError(reply)
                }
            }
        };

        self.apply(action).await;
        true
    }

    async fn apply(&self, action: Action) {
        match action {
            Action::RunOp(op) => {
                let handle = self.clone();
                self.spawn_fiber(async move { fiber::run_op(handle, op).await })
                    .await;
            }
            Action::DeliverCall(call) => {
                let handle = self.clone();
                self.spawn_fiber(async move { fiber::deliver_call(handle, call).await })
                    .await;
            }
            Action::DeliverCallError(call) => {
                debug!(component = %call.component, method = %call.method, "injecting call error");
                let arity = self.method_arity(&call.component, &call.method);
                let _ = call.reply_tx.send(error_returns(arity));
            }
            Action::DeliverReply(reply) => {
                let _ = reply.reply_tx.send(reply.returns);
            }
            Action::DeliverReplyError(reply) => {
                debug!(component = %reply.component, method = %reply.method, "injecting reply error");
                let arity = reply.returns.len().max(1);
                let _ = reply.reply_tx.send(error_returns(arity));
            }
        }
    }

    /// Best-effort return arity for a call the scheduler never delivers
    /// (the `DeliverCallError` path). Every replica of a component is
    /// assumed to share one interface, so replica 0 is asked — an
    /// implementation detail recorded as an open question in DESIGN.md.
    fn method_arity(&self, component: &str, method: &str) -> usize {
        self.0
            .registry
            .replica(component, 0)
            .map_or(1, |replica| replica.return_arity(method).max(1))
    }

    /// Number of fibers currently spawned and not yet joined.
    async fn fiber_count(&self) -> usize {
        self.0.tasks.lock().await.len()
    }

    /// Waits for one in-flight fiber to finish. Meant to be raced inside a
    /// `select!` against `tokio::task::yield_now()` — cancel-safe, since
    /// dropping it mid-wait only releases the `tasks` lock and leaves
    /// `JoinSet::join_next` itself cancel-safe.
    async fn try_join_fiber(&self) -> Option<Result<Result<(), SimError>, tokio::task::JoinError>> {
        let mut tasks = self.0.tasks.lock().await;
        tasks.join_next().await
    }

    async fn drain_fibers(&self) {
        loop {
            let next = {
                let mut tasks = self.0.tasks.lock().await;
                tasks.join_next().await
            };
            match next {
                None => break,
                Some(joined) => self.record_fiber_outcome(joined).await,
            }
        }
    }

    async fn record_fiber_outcome(
        &self,
        joined: Result<Result<(), SimError>, tokio::task::JoinError>,
    ) {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.fail(err).await,
            Err(join_err) => {
                self.fail(SimError::Internal(format!("fiber panicked: {join_err}")))
                    .await;
            }
        }
    }
}

/// Synthesizes a zero-valued return vector of `arity` with
/// [`ensemble_types::RemoteCallError`] in the trailing slot (spec.md §4.3).
fn error_returns(arity: usize) -> Vec<Value> {
    let mut returns = vec![Value::Null; arity.saturating_sub(1)];
    returns.push(Value::from(ensemble_types::RemoteCallError::MESSAGE));
    returns
}

fn stringify(value: &Value) -> String {
    value.to_string()
}
