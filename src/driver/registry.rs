// src/driver/registry.rs

//! Explicit name -> constructor table for drivers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::shell::ShellDriver;
use crate::driver::{GlobalEnv, TestDriver, TestEnv};

/// Builds a driver instance for one test.
pub type DriverConstructor =
    Arc<dyn Fn(Arc<GlobalEnv>, TestEnv) -> anyhow::Result<Arc<dyn TestDriver>> + Send + Sync>;

/// Registration table consulted when resolving a test's driver name.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, DriverConstructor>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing the drivers shipped with the crate.
    pub fn with_builtin_drivers() -> Self {
        Self::new().with(ShellDriver::NAME, |global, env| {
            let driver: Arc<dyn TestDriver> = ShellDriver::new(global, env)?;
            Ok(driver)
        })
    }

    /// Register `constructor` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(Arc<GlobalEnv>, TestEnv) -> anyhow::Result<Arc<dyn TestDriver>> + Send + Sync + 'static,
    {
        self.drivers.insert(name.to_string(), Arc::new(constructor));
        self
    }

    /// Builder-style variant of [`DriverRegistry::register`].
    pub fn with<F>(mut self, name: &str, constructor: F) -> Self
    where
        F: Fn(Arc<GlobalEnv>, TestEnv) -> anyhow::Result<Arc<dyn TestDriver>> + Send + Sync + 'static,
    {
        self.register(name, constructor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DriverConstructor> {
        self.drivers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(|s| s.as_str())
    }
}
