//! Whole-crate scenario tests exercising the invariants from spec.md §8:
//! trace id ordering, span id uniqueness, and byte-identical histories for
//! a repeated seed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ensemble_sim::{Context, Event, Options, Registry, Replica, Simulator, Value};

struct Counter {
    value: AtomicI64,
}

#[async_trait]
impl Replica for Counter {
    async fn call(&self, _ctx: &Context, method: &str, args: Vec<Value>) -> Vec<Value> {
        match method {
            "Inc" => {
                let delta = args.first().and_then(Value::as_i64).unwrap_or(1);
                let next = self.value.fetch_add(delta, Ordering::SeqCst) + delta;
                vec![Value::from(next), Value::Null]
            }
            _ => vec![Value::Null, Value::Null],
        }
    }

    fn return_arity(&self, _method: &str) -> usize {
        2
    }
}

fn build_simulator(seed: i64, num_replicas: i64, num_ops: i64) -> Simulator {
    let mut registry = Registry::new();
    let replicas = (0..num_replicas)
        .map(|_| {
            Arc::new(Counter {
                value: AtomicI64::new(0),
            }) as Arc<dyn Replica>
        })
        .collect();
    registry.register("Counter", replicas);

    let options = Options::new(seed, num_replicas, num_ops);
    let mut simulator = Simulator::new(registry, options).unwrap();
    simulator.register_op(
        "inc",
        &["Counter"],
        |rng| {
            use rand::Rng;
            rng.gen_range(1..=5_i64)
        },
        |ctx, delta, handles| async move {
            handles[0]
                .call(&ctx, "Inc", vec![Value::from(delta)])
                .await?;
            Ok(())
        },
    );
    simulator
}

#[tokio::test(flavor = "current_thread")]
async fn op_start_trace_ids_are_1_through_num_ops_in_order_of_first_appearance() {
    let results = build_simulator(11, 3, 15).simulate().await;
    assert!(results.err.is_none());

    let trace_ids: Vec<u64> = results
        .history
        .iter()
        .filter_map(|event| match event {
            Event::OpStart { trace_id, .. } => Some(trace_id.get()),
            _ => None,
        })
        .collect();
    let expected: Vec<u64> = (1..=15).collect();
    assert_eq!(trace_ids, expected);
}

#[tokio::test(flavor = "current_thread")]
async fn span_ids_are_unique_across_the_whole_history() {
    let results = build_simulator(5, 2, 10).simulate().await;
    let span_ids: Vec<u64> = results.history.iter().map(|e| e.span_id().get()).collect();
    let unique: HashSet<u64> = span_ids.iter().copied().collect();

    // Span ids are unique per minting event, but the same span id is
    // legitimately repeated across Call/DeliverCall/Return/DeliverReturn
    // for one in-flight call — so dedupe by minting event instead.
    let minted: Vec<u64> = results
        .history
        .iter()
        .filter(|e| matches!(e, Event::OpStart { .. } | Event::Call { .. }))
        .map(|e| e.span_id().get())
        .collect();
    let minted_unique: HashSet<u64> = minted.iter().copied().collect();
    assert_eq!(minted.len(), minted_unique.len());
    assert!(unique.iter().all(|id| *id >= 1));
}

#[tokio::test(flavor = "current_thread")]
async fn same_seed_produces_byte_identical_histories() {
    let first = build_simulator(42, 4, 25).simulate().await;
    let second = build_simulator(42, 4, 25).simulate().await;

    assert!(first.err.is_none());
    assert!(second.err.is_none());

    let first_json = serde_json::to_string(&first.history).unwrap();
    let second_json = serde_json::to_string(&second.history).unwrap();
    assert_eq!(first_json, second_json);
}

#[tokio::test(flavor = "current_thread")]
async fn different_seeds_usually_diverge() {
    let first = build_simulator(1, 3, 25).simulate().await;
    let second = build_simulator(2, 3, 25).simulate().await;

    let first_json = serde_json::to_string(&first.history).unwrap();
    let second_json = serde_json::to_string(&second.history).unwrap();
    assert_ne!(first_json, second_json);
}

#[tokio::test(flavor = "current_thread")]
async fn every_registered_op_is_spawned_exactly_num_ops_times() {
    let results = build_simulator(9, 2, 30).simulate().await;
    let starts = results
        .history
        .iter()
        .filter(|e| matches!(e, Event::OpStart { .. }))
        .count();
    let finishes = results
        .history
        .iter()
        .filter(|e| matches!(e, Event::OpFinish { .. }))
        .count();
    assert_eq!(starts, 30);
    assert_eq!(finishes, 30);
}
