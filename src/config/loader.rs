// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::model::{RawSuiteConfig, SuiteConfig};
use crate::driver::TestEnv;
use crate::errors::Result;

/// Load a suite configuration file and return the raw `RawSuiteConfig`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// the checked form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSuiteConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawSuiteConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a suite configuration file and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SuiteConfig> {
    let raw_config = load_from_path(&path)?;
    let config = SuiteConfig::try_from(raw_config)?;
    Ok(config)
}

/// Suite config looked up when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Testsuite.toml")
}

/// Load one test specification file into a mapping.
///
/// An empty file yields an empty mapping.
pub fn load_test_env(path: &Path) -> anyhow::Result<TestEnv> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading test spec at {}", path.display()))?;

    if contents.trim().is_empty() {
        return Ok(TestEnv::new());
    }

    let env: TestEnv = toml::from_str(&contents)
        .with_context(|| format!("parsing test spec at {}", path.display()))?;
    Ok(env)
}
