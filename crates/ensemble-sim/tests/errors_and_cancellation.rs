//! Scenario tests for remote-call error injection, replica panics, op
//! failure, and run cancellation (spec.md §4.3, §4.5, §7, §9).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ensemble_sim::{Context, Event, Options, Registry, Replica, SimError, Simulator, Value};

struct Echo;

#[async_trait]
impl Replica for Echo {
    async fn call(&self, _ctx: &Context, _method: &str, args: Vec<Value>) -> Vec<Value> {
        let mut returns = args;
        returns.push(Value::Null);
        returns
    }

    fn return_arity(&self, _method: &str) -> usize {
        2
    }
}

struct Panicker;

#[async_trait]
impl Replica for Panicker {
    async fn call(&self, _ctx: &Context, _method: &str, _args: Vec<Value>) -> Vec<Value> {
        panic!("replica intentionally panicked");
    }

    fn return_arity(&self, _method: &str) -> usize {
        1
    }
}

#[tokio::test(flavor = "current_thread")]
async fn remote_call_error_is_injected_and_distinguishable_from_op_errors() {
    let mut registry = Registry::new();
    registry.register("Echo", vec![Arc::new(Echo) as Arc<dyn Replica>]);
    let options = Options::new(3, 1, 60);
    let mut simulator = Simulator::new(registry, options).unwrap();

    let failures_seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let failures_seen_body = Arc::clone(&failures_seen);

    simulator.register_op(
        "echo",
        &["Echo"],
        |_rng| (),
        move |ctx, (), handles| {
            let failures_seen = Arc::clone(&failures_seen_body);
            async move {
                match handles[0].call(&ctx, "Echo", vec![Value::from(1)]).await {
                    Ok(_) => Ok(()),
                    Err(SimError::OpFailed(err)) => {
                        if err.downcast_ref::<ensemble_types::RemoteCallError>().is_some() {
                            failures_seen.store(true, Ordering::SeqCst);
                            Ok(())
                        } else {
                            Err(err)
                        }
                    }
                    Err(other) => Err(anyhow::anyhow!(other.to_string())),
                }
            }
        },
    );

    let results = simulator.simulate().await;
    assert!(results.err.is_none());
    assert!(
        failures_seen.load(Ordering::SeqCst),
        "expected at least one RemoteCallError across 60 ops with both call- and reply-error candidates available"
    );
}

#[tokio::test(flavor = "current_thread")]
async fn failing_op_body_becomes_results_err_and_is_recorded_on_op_finish() {
    let mut registry = Registry::new();
    registry.register("Echo", vec![Arc::new(Echo) as Arc<dyn Replica>]);
    let options = Options::new(1, 1, 40);
    let mut simulator = Simulator::new(registry, options).unwrap();

    simulator.register_op(
        "sometimes_fails",
        &["Echo"],
        |rng| {
            use rand::Rng;
            rng.gen_bool(0.3)
        },
        |ctx, should_fail, handles| async move {
            handles[0].call(&ctx, "Echo", vec![]).await.ok();
            if should_fail {
                anyhow::bail!("op decided to fail");
            }
            Ok(())
        },
    );

    let results = simulator.simulate().await;
    match &results.err {
        Some(SimError::OpFailed(err)) => assert_eq!(err.to_string(), "op decided to fail"),
        other => panic!("expected a recorded op failure, got {other:?}"),
    }

    let failed_finish = results.history.iter().any(|event| {
        matches!(event, Event::OpFinish { error, .. } if error == "op decided to fail")
    });
    assert!(failed_finish, "OpFinish should record the op body's own error message");
}

#[tokio::test(flavor = "current_thread")]
async fn a_panicking_replica_surfaces_as_a_fatal_error_not_a_remote_call_error() {
    let mut registry = Registry::new();
    registry.register("Panicker", vec![Arc::new(Panicker) as Arc<dyn Replica>]);
    let options = Options::new(1, 1, 1);
    let mut simulator = Simulator::new(registry, options).unwrap();

    simulator.register_op(
        "trigger",
        &["Panicker"],
        |_rng| (),
        |ctx, (), handles| async move {
            handles[0].call(&ctx, "Boom", vec![]).await.ok();
            Ok(())
        },
    );

    let results = simulator.simulate().await;
    assert!(
        matches!(results.err, Some(SimError::ReplicaPanicked(_))),
        "expected ReplicaPanicked, got {:?}",
        results.err
    );
}

#[tokio::test(flavor = "current_thread")]
async fn external_cancellation_surfaces_as_results_err_cancelled() {
    let mut registry = Registry::new();
    registry.register("Echo", vec![Arc::new(Echo) as Arc<dyn Replica>]);
    let options = Options::new(1, 1, 1_000_000);
    let mut simulator = Simulator::new(registry, options).unwrap();

    simulator.register_op(
        "echo",
        &["Echo"],
        |_rng| (),
        |ctx, (), handles| async move {
            handles[0].call(&ctx, "Echo", vec![]).await.ok();
            Ok(())
        },
    );

    let results = simulator
        .simulate_until(async { tokio::time::sleep(Duration::from_millis(5)).await })
        .await;

    assert!(
        matches!(results.err, Some(SimError::Cancelled)),
        "expected Cancelled, got {:?}",
        results.err
    );
    let starts = results
        .history
        .iter()
        .filter(|e| matches!(e, Event::OpStart { .. }))
        .count();
    assert!(
        starts < 1_000_000,
        "cancellation should have cut the run short, got {starts} op starts"
    );
}
