//! The two fiber bodies the scheduler spawns: one operation invocation
//! (spec.md §4.4) and one call delivery (spec.md §4.5). Neither calls back
//! into the scheduler's step loop directly — `Scheduler::simulate` drives
//! stepping centrally and simply waits for whichever fiber finishes first,
//! which is an allowed equivalent of a fiber re-entering `step` itself
//! (spec.md §9, "equivalent implementations ... acceptable").

use std::sync::Arc;

use tracing::instrument;

use crate::context::Context;
use crate::error::SimError;
use crate::opset::Op;
use crate::queues::PendingCall;
use crate::scheduler::SchedulerHandle;

/// Runs one operation end to end: mints its trace/span ids, records
/// `OpStart`, invokes the op body against freshly built proxy handles for
/// its declared component dependencies, and records `OpFinish`.
#[instrument(skip_all, fields(op = %op.name()))]
pub(crate) async fn run_op(handle: SchedulerHandle, op: Arc<Op>) -> Result<(), SimError> {
    let (trace_id, span_id, arg) = handle.begin_op(&op).await;
    let ctx = Context::new(trace_id, handle.cancellation().clone());

    let handles = op
        .components()
        .iter()
        .map(|component| {
            handle
                .registry()
                .handle_for(component.clone(), "op", trace_id.to_string(), handle.clone())
        })
        .collect();

    let result = op.run(ctx, arg, handles).await;
    let message = match &result {
        Ok(()) => "<nil>".to_string(),
        Err(err) => err.to_string(),
    };
    handle.finish_op(trace_id, span_id, message).await;

    result.map_err(SimError::OpFailed)
}

/// Delivers one pending call to a randomly chosen replica, isolates any
/// panic inside the replica's own task so it surfaces as a fatal error
/// rather than unwinding the scheduler, and enqueues the reply for the
/// scheduler's eventual (possibly erroring) delivery back to the caller.
#[instrument(skip_all, fields(component = %call.component, method = %call.method))]
pub(crate) async fn deliver_call(handle: SchedulerHandle, call: PendingCall) -> Result<(), SimError> {
    let PendingCall {
        trace_id,
        span_id,
        component,
        method,
        args,
        reply_tx,
        ..
    } = call;

    let replica_index = handle.begin_delivery(trace_id, span_id, &component).await;
    let replica = handle
        .registry()
        .replica(&component, replica_index)
        .cloned()
        .ok_or_else(|| {
            SimError::Internal(format!(
                "replica {replica_index} of component {component} vanished between selection and delivery"
            ))
        })?;

    let ctx = Context::new(trace_id, handle.cancellation().clone());
    let call_method = method.clone();
    let joined = tokio::spawn(async move { replica.call(&ctx, &call_method, args).await }).await;

    let returns = match joined {
        Ok(returns) => returns,
        Err(join_err) => {
            let err = SimError::ReplicaPanicked(format!("{component}::{method}: {join_err}"));
            return Err(err);
        }
    };

    handle
        .finish_delivery(
            trace_id,
            span_id,
            component,
            method,
            replica_index,
            returns,
            reply_tx,
        )
        .await;
    Ok(())
}
