//! Scenario S5: `Options::with_fake` replaces a component's whole replica
//! set with a single fake (spec.md §6).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ensemble_sim::{Context, Event, Options, Registry, Replica, Simulator, Value};

struct RealCounter;

#[async_trait]
impl Replica for RealCounter {
    async fn call(&self, _ctx: &Context, _method: &str, _args: Vec<Value>) -> Vec<Value> {
        panic!("the real replica set must not be reachable once faked");
    }

    fn return_arity(&self, _method: &str) -> usize {
        1
    }
}

struct FakeCounter {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Replica for FakeCounter {
    async fn call(&self, _ctx: &Context, _method: &str, _args: Vec<Value>) -> Vec<Value> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        vec![Value::Null]
    }

    fn return_arity(&self, _method: &str) -> usize {
        1
    }
}

#[tokio::test(flavor = "current_thread")]
async fn with_fake_replaces_the_whole_replica_set_with_a_single_fake() {
    let mut registry = Registry::new();
    registry.register(
        "Counter",
        vec![
            Arc::new(RealCounter) as Arc<dyn Replica>,
            Arc::new(RealCounter) as Arc<dyn Replica>,
            Arc::new(RealCounter) as Arc<dyn Replica>,
        ],
    );

    let invocations = Arc::new(AtomicUsize::new(0));
    let options = Options::new(7, 3, 20).with_fake(
        "Counter",
        Arc::new(FakeCounter {
            invocations: Arc::clone(&invocations),
        }),
    );
    let mut simulator = Simulator::new(registry, options).unwrap();

    assert_eq!(simulator.registry().replica_count("Counter"), 1);

    simulator.register_op(
        "inc",
        &["Counter"],
        |_rng| (),
        |ctx, (), handles| async move {
            handles[0].call(&ctx, "Inc", vec![]).await.ok();
            Ok(())
        },
    );

    let results = simulator.simulate().await;
    assert!(results.err.is_none());

    let deliveries: Vec<usize> = results
        .history
        .iter()
        .filter_map(|event| match event {
            Event::DeliverCall {
                component, replica, ..
            } if component == "Counter" => Some(*replica),
            _ => None,
        })
        .collect();
    assert_eq!(deliveries.len(), 20);
    assert!(
        deliveries.iter().all(|&r| r == 0),
        "every delivery to a faked component must land on replica 0, got {deliveries:?}"
    );
    assert_eq!(invocations.load(Ordering::SeqCst), 20);
}
