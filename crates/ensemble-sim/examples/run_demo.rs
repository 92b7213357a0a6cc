//! Wires a toy `Counter` component and an `"inc"` op end to end:
//! `Simulator::new` → `register_op` → `simulate` → `render_mermaid`.
//!
//! ```sh
//! cargo run --example run_demo -- --seed 7 --num-ops 20
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use ensemble_sim::{render, Context, Options, Registry, Replica, Simulator, Value};

#[derive(Parser)]
struct Args {
    #[arg(long, default_value_t = 1)]
    seed: i64,

    #[arg(long, default_value_t = 3)]
    num_replicas: i64,

    #[arg(long, default_value_t = 20)]
    num_ops: i64,
}

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
            other => vec![Value::Null, Value::from(format!("unknown method {other}"))],
        }
    }

    fn return_arity(&self, method: &str) -> usize {
        match method {
            "Inc" => 2,
            _ => 1,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut registry = Registry::new();
    let replicas = (0..args.num_replicas)
        .map(|_| {
            Arc::new(Counter {
                value: AtomicI64::new(0),
            }) as Arc<dyn Replica>
        })
        .collect();
    registry.register("Counter", replicas);

    let options = Options::new(args.seed, args.num_replicas, args.num_ops);
    let mut simulator = Simulator::new(registry, options)?;

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

    let results = simulator.simulate().await;

    println!("{}", render::render_mermaid(&results.history));
    if let Some(err) = results.err {
        eprintln!("simulation found an error: {err}");
        std::process::exit(1);
    }

    Ok(())
}
