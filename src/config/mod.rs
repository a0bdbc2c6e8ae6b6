// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the TOML-backed suite config and the resolved run options.
//! - `loader.rs`: reading the suite config and per-test spec files.
//! - `validate.rs`: raw -> validated conversion.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_test_env};
pub use model::{RawSuiteConfig, SuiteConfig, SuiteOptions};
