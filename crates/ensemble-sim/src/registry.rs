//! Component registration and the proxy layer (spec.md §4.1).
//!
//! Registering components, wiring replica references, and generating
//! per-method stubs are explicitly out of scope for this crate (spec.md
//! §1) — that's the host application's job. What lives here is the
//! generic machinery any such host needs: a place to park replica handles
//! keyed by component name, and a proxy that turns a method invocation into
//! a pending [`Call`](crate::history::Event::Call) and awaits its reply.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ensemble_types::{SpanId, TraceId};

use crate::context::Context;
use crate::error::SimError;
use crate::scheduler::SchedulerHandle;
use crate::Value;

/// A single replica implementation of a component interface.
///
/// The host supplies this — conceptually the "reflective method stub"
/// described in spec.md §4.1, collapsed here into one dynamic dispatch
/// entry point since generating per-method stubs is out of scope.
#[async_trait]
pub trait Replica: Send + Sync {
    /// Invokes `method` with `args`, returning the full return vector whose
    /// last element is always the error slot (`Value::Null` on success).
    async fn call(&self, ctx: &Context, method: &str, args: Vec<Value>) -> Vec<Value>;

    /// Number of values `method` returns, including the trailing error
    /// slot. Used to synthesize a zero-valued vector when the scheduler
    /// injects a [`RemoteCallError`](ensemble_types::RemoteCallError)
    /// (spec.md §4.3) without ever calling the replica.
    fn return_arity(&self, method: &str) -> usize;

    /// Optional per-invocation `Init` hook (spec.md §4.7). Default is a
    /// no-op; replicas that need setup override it.
    async fn init(&self, _ctx: &Context) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Maps a component interface name to its ordered replica set.
#[derive(Default)]
pub struct Registry {
    components: HashMap<String, Vec<Arc<dyn Replica>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the replica set for `component`. Called once per
    /// component by the host during setup, before any simulation runs.
    pub fn register(&mut self, component: impl Into<String>, replicas: Vec<Arc<dyn Replica>>) {
        self.components.insert(component.into(), replicas);
    }

    pub fn contains(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    pub fn replica_count(&self, component: &str) -> usize {
        self.components.get(component).map_or(0, Vec::len)
    }

    pub(crate) fn replica(&self, component: &str, index: usize) -> Option<&Arc<dyn Replica>> {
        self.components.get(component).and_then(|r| r.get(index))
    }

    /// Builds a proxy handle for `component` as seen by `caller_name`
    /// (instance `caller_replica`). Every method invoked on the returned
    /// handle synthesizes a pending call (spec.md §4.1).
    pub fn handle_for(
        &self,
        component: impl Into<String>,
        caller_name: impl Into<String>,
        caller_replica: impl Into<String>,
        scheduler: SchedulerHandle,
    ) -> ComponentHandle {
        ComponentHandle {
            component: component.into(),
            caller_name: caller_name.into(),
            caller_replica: caller_replica.into(),
            scheduler,
        }
    }
}

/// A proxy representing one component as seen from one caller. Invoking
/// [`ComponentHandle::call`] enqueues a pending call and suspends until the
/// scheduler delivers a reply, injects an error, or the run is cancelled.
#[derive(Clone)]
pub struct ComponentHandle {
    component: String,
    caller_name: String,
    caller_replica: String,
    scheduler: SchedulerHandle,
}

impl ComponentHandle {
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Synthesizes a pending call for `method`, appends the `Call` event,
    /// and awaits the scheduler's eventual reply or error.
    ///
    /// Returns the non-error return values on success. A `RemoteCallError`
    /// injected on either the call or the reply path, or a genuine replica
    /// error, is returned as `Err`; a cancelled run is returned as
    /// `Err(SimError::Cancelled)`.
    pub async fn call(
        &self,
        ctx: &Context,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, SimError> {
        let method = method.into();
        let trace_id = ctx.trace_id();
        let (span_id, rx) = self
            .scheduler
            .enqueue_call(
                trace_id,
                self.caller_name.clone(),
                self.caller_replica.clone(),
                self.component.clone(),
                method.clone(),
                args,
            )
            .await;

        tokio::select! {
            biased;
            () = ctx.cancellation().cancelled() => Err(SimError::Cancelled),
            result = rx => match result {
                Ok(mut returns) => unpack_returns(trace_id, span_id, &mut returns),
                Err(_) => Err(SimError::Cancelled),
            },
        }
    }
}

/// Splits a method's return vector into its non-error prefix and trailing
/// error slot (spec.md §4.1).
fn unpack_returns(
    _trace_id: TraceId,
    _span_id: SpanId,
    returns: &mut Vec<Value>,
) -> Result<Vec<Value>, SimError> {
    let Some(error_slot) = returns.pop() else {
        return Ok(Vec::new());
    };
    if error_slot.is_null() {
        return Ok(std::mem::take(returns));
    }
    if error_slot
        .as_str()
        .is_some_and(|s| s == ensemble_types::RemoteCallError::MESSAGE)
    {
        return Err(SimError::OpFailed(ensemble_types::RemoteCallError.into()));
    }
    Err(SimError::OpFailed(anyhow::anyhow!(
        error_slot
            .as_str()
            .map(str::to_owned)
            .unwrap_or_else(|| error_slot.to_string())
    )))
}
