//! Deterministic discrete-event simulation scheduler for component-based
//! distributed applications.
//!
//! A user application is a set of *components* — polymorphic service
//! interfaces backed by one or more *replica* implementations — that call
//! each other through method invocations. [`Simulator`] schedules operation
//! spawns and method deliveries pseudo-randomly but reproducibly from a
//! single seed, injects [`ensemble_types::RemoteCallError`] on call and
//! reply paths, and records a full causal [`history::Event`] log suitable
//! for property checking and rendering.
//!
//! Component registration, replica construction, and configuration *file*
//! parsing are a host application's job, not this crate's — see
//! [`registry`] and [`options`] for the seams a host plugs into.

use std::sync::Arc;

pub mod cancellation;
pub mod context;
pub mod error;
mod fiber;
pub mod history;
pub mod opset;
pub mod options;
pub mod queues;
pub mod registry;
pub mod render;
mod scheduler;

pub use context::Context;
pub use error::SimError;
pub use history::Event;
pub use opset::OpSet;
pub use options::Options;
pub use registry::{ComponentHandle, Registry, Replica};
pub use scheduler::Results;

/// The generic, opaque argument/return value representation threaded
/// through proxy calls and recorded in the history (spec.md §3). Typed
/// method signatures are a host application's concern; this crate only
/// moves `Value`s around and occasionally serializes one to text for an
/// event.
pub type Value = serde_json::Value;

/// Top-level facade tying registration ([`Registry`], [`OpSet`]) to a run
/// ([`scheduler::Scheduler`]). Construct one, register ops against an
/// already-built [`Registry`], then call [`Simulator::simulate`].
pub struct Simulator {
    registry: Registry,
    ops: OpSet,
    options: Options,
}

impl Simulator {
    /// Validates `options` and returns a simulator ready for op
    /// registration (spec.md §6). Any component named in
    /// `options.fakes` has its whole replica set replaced with the single
    /// fake, so every delivery to it lands on replica 0.
    pub fn new(
        mut registry: Registry,
        options: Options,
    ) -> Result<Self, error::ConstructionError> {
        options.validate()?;
        for (component, fake) in &options.fakes {
            registry.register(component.clone(), vec![Arc::clone(fake)]);
        }
        Ok(Self {
            registry,
            ops: OpSet::new(),
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers an operation. See [`OpSet::register`] for the panic
    /// conditions (spec.md §4.2, a programming error, not a runtime
    /// failure).
    pub fn register_op<T, G, F, Fut>(
        &mut self,
        name: impl Into<String>,
        components: &[&str],
        gen: G,
        body: F,
    ) where
        T: std::fmt::Debug + Send + 'static,
        G: Fn(&mut rand::rngs::StdRng) -> T + Send + Sync + 'static,
        F: Fn(Context, T, Vec<ComponentHandle>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.ops
            .register(&self.registry, name, components, gen, body);
    }

    /// Drives the run to completion with no external cancellation source
    /// other than a failing op. Equivalent to
    /// `simulate_until(std::future::pending())`.
    pub async fn simulate(self) -> Results {
        self.simulate_until(std::future::pending()).await
    }

    /// Drives the run to completion, or until `external_cancel` resolves
    /// first (spec.md §9, "Cancellation").
    pub async fn simulate_until<C>(self, external_cancel: C) -> Results
    where
        C: std::future::Future<Output = ()> + Send + 'static,
    {
        scheduler::Scheduler::new(self.registry, self.ops, &self.options)
            .simulate(external_cancel)
            .await
    }
}
