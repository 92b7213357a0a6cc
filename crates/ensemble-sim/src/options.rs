//! Simulator configuration (spec.md §6).

use std::collections::HashMap;
use std::sync::Arc;

use ensemble_types::ConstructionError;

use crate::registry::Replica;

/// Construction-time configuration for a simulator run.
pub struct Options {
    /// Sole source of randomness for the run.
    pub seed: i64,
    /// Replicas per non-faked component. Must be positive.
    pub num_replicas: i64,
    /// Total operations to spawn across the run. Must be positive.
    pub num_ops: i64,
    /// Diagnostic-only name of the config document; never parsed here.
    pub config_filename: String,
    /// The already-applied config document, forwarded to replica
    /// construction untouched. Empty object when no config was supplied.
    pub config: serde_json::Value,
    /// Replaces a component's whole replica set with a single fake.
    pub fakes: HashMap<String, Arc<dyn Replica>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            seed: 0,
            num_replicas: 1,
            num_ops: 1,
            config_filename: String::new(),
            config: serde_json::Value::Object(serde_json::Map::new()),
            fakes: HashMap::new(),
        }
    }
}

impl Options {
    pub fn new(seed: i64, num_replicas: i64, num_ops: i64) -> Self {
        Self {
            seed,
            num_replicas,
            num_ops,
            ..Self::default()
        }
    }

    pub fn with_fake(mut self, component: impl Into<String>, fake: Arc<dyn Replica>) -> Self {
        self.fakes.insert(component.into(), fake);
        self
    }

    pub fn with_config(mut self, filename: impl Into<String>, config: serde_json::Value) -> Self {
        self.config_filename = filename.into();
        self.config = config;
        self
    }

    /// Rejects a non-positive `num_replicas`/`num_ops` (spec.md §6).
    pub fn validate(&self) -> Result<(), ConstructionError> {
        if self.num_replicas <= 0 {
            return Err(ConstructionError::InvalidNumReplicas(self.num_replicas));
        }
        if self.num_ops <= 0 {
            return Err(ConstructionError::InvalidNumOps(self.num_ops));
        }
        Ok(())
    }
}
