//! Registered operations (spec.md §4.2).
//!
//! Each [`Op`] type-erases its generator and body so heterogeneous
//! argument types can live side by side in one `OpSet` — the idiomatic
//! Rust stand-in for the reflective signature validation the source
//! performs at registration time (spec.md §9, "Reflective method dispatch
//! → typed dispatch").

use std::any::Any;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rand::rngs::StdRng;

use crate::context::Context;
use crate::registry::{ComponentHandle, Registry};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type BoxedArg = Box<dyn Any + Send>;

/// A named, randomized operation (spec.md §3, "Op").
pub struct Op {
    name: String,
    components: Vec<String>,
    gen: Box<dyn Fn(&mut StdRng) -> (BoxedArg, String) + Send + Sync>,
    body: Box<dyn Fn(Context, BoxedArg, Vec<ComponentHandle>) -> BoxFuture<'static, Result<(), anyhow::Error>> + Send + Sync>,
}

impl Op {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub(crate) fn generate(&self, rng: &mut StdRng) -> (BoxedArg, String) {
        (self.gen)(rng)
    }

    pub(crate) fn run(
        &self,
        ctx: Context,
        arg: BoxedArg,
        handles: Vec<ComponentHandle>,
    ) -> BoxFuture<'static, Result<(), anyhow::Error>> {
        (self.body)(ctx, arg, handles)
    }
}

/// Registered operations, keyed by name but materialized into a stable
/// indexed sequence for selection (spec.md §4.2 — "iteration-order-
/// independent").
#[derive(Default)]
pub struct OpSet {
    ops: Vec<Arc<Op>>,
}

impl OpSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new op. Panics (a programming error, not a runtime
    /// failure — spec.md §7) if `name` is already registered or if any
    /// declared component dependency was never registered with `registry`.
    ///
    /// `T` must be `Debug` so `OpStart` events can render the generated
    /// argument without the host supplying a formatter per op.
    pub fn register<T, G, F, Fut>(
        &mut self,
        registry: &Registry,
        name: impl Into<String>,
        components: &[&str],
        gen: G,
        body: F,
    ) where
        T: Debug + Send + 'static,
        G: Fn(&mut StdRng) -> T + Send + Sync + 'static,
        F: Fn(Context, T, Vec<ComponentHandle>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = name.into();
        assert!(!name.is_empty(), "op name must not be empty");
        assert!(
            self.ops.iter().all(|op| op.name != name),
            "duplicate op name: {name}"
        );
        for component in components {
            assert!(
                registry.contains(component),
                "op {name} declares unregistered component dependency {component}"
            );
        }

        let components: Vec<String> = components.iter().map(|c| (*c).to_string()).collect();
        let gen = Box::new(move |rng: &mut StdRng| {
            let value = gen(rng);
            let rendered = format!("{value:?}");
            (Box::new(value) as BoxedArg, rendered)
        });
        let body = Box::new(move |ctx: Context, arg: BoxedArg, handles: Vec<ComponentHandle>| {
            let value = *arg
                .downcast::<T>()
                .expect("op argument type mismatch — internal simulator bug");
            Box::pin(body(ctx, value, handles)) as BoxFuture<'static, Result<(), anyhow::Error>>
        });

        self.ops.push(Arc::new(Op {
            name,
            components,
            gen,
            body,
        }));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the op at `index` in the stable registration-order sequence.
    /// The scheduler draws `index` from its RNG — selection is uniform and
    /// reproducible regardless of how ops were inserted (spec.md §4.2).
    pub fn get(&self, index: usize) -> Arc<Op> {
        Arc::clone(&self.ops[index])
    }
}
