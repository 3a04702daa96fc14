// ABOUTME: Registry pattern for runtime backend selection.
// ABOUTME: Backends register factories, the agent creates one by name from config.

use crate::traits::SharedBackend;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Factory function that creates a backend from config
pub type BackendFactory = Box<dyn Fn(&Value) -> Result<SharedBackend> + Send + Sync>;

/// Registry for runtime backend selection
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory by name
    pub fn register(mut self, name: &str, factory: BackendFactory) -> Self {
        self.factories.insert(name.to_string(), factory);
        self
    }

    /// Create a backend by name with the given config
    pub fn create(&self, name: &str, config: &Value) -> Result<SharedBackend> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("Unknown completion backend: {}", name))?;
        factory(config)
    }

    /// List available backend names
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        use crate::backends::mock::MockBackend;
        use crate::backends::openai::OpenAiBackend;

        Self::new()
            .register("mock", MockBackend::factory())
            .register("openai", OpenAiBackend::factory())
    }
}
