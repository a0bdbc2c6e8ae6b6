// src/config/validate.rs

use crate::config::model::{RawSuiteConfig, SuiteConfig};
use crate::errors::{DagsuiteError, Result};

impl TryFrom<RawSuiteConfig> for SuiteConfig {
    type Error = DagsuiteError;

    fn try_from(raw: RawSuiteConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(SuiteConfig::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawSuiteConfig) -> Result<()> {
    validate_jobs(cfg)?;
    validate_names(cfg)?;
    Ok(())
}

fn validate_jobs(cfg: &RawSuiteConfig) -> Result<()> {
    if cfg.suite.jobs == Some(0) {
        return Err(DagsuiteError::ConfigError(
            "[suite].jobs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_names(cfg: &RawSuiteConfig) -> Result<()> {
    let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());

    if blank(&cfg.suite.name) {
        return Err(DagsuiteError::ConfigError(
            "[suite].name must not be empty".to_string(),
        ));
    }
    if blank(&cfg.suite.default_driver) {
        return Err(DagsuiteError::ConfigError(
            "[suite].default_driver must not be empty".to_string(),
        ));
    }
    if blank(&cfg.suite.test_subdir) {
        return Err(DagsuiteError::ConfigError(
            "[suite].test_subdir must not be empty (use \".\")".to_string(),
        ));
    }
    Ok(())
}

/// Validate the options actually used for a run, after CLI overrides.
pub fn validate_jobs_override(jobs: usize) -> Result<usize> {
    if jobs == 0 {
        return Err(DagsuiteError::ConfigError(
            "--jobs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(jobs)
}
