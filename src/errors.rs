// src/errors.rs

//! Crate-wide error types and aliases.
//!
//! Structural problems (bad graph, malformed control rules, bad suite
//! config) abort before any fragment runs. Per-fragment failures never reach
//! this type: they are contained by [`crate::engine::fragment`] and turned
//! into ERROR results instead.

use thiserror::Error;

use crate::dag::GraphError;
use crate::driver::PushOrigin;

#[derive(Error, Debug)]
pub enum DagsuiteError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration error: control rule #{index}: {reason}")]
    ControlRule { index: usize, reason: String },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error(
        "cannot push twice results for {test_name}\nFirst push happened at:\n  {first}\nThis one happened at:\n  {second}"
    )]
    DuplicateResult {
        test_name: String,
        first: PushOrigin,
        second: PushOrigin,
    },

    #[error("cannot resolve driver for {test}: {reason}")]
    DriverResolution { test: String, reason: String },

    #[error("Scheduler invariant violated: {0}")]
    SchedulerInvariant(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("xUnit serialization error: {0}")]
    XunitError(#[from] quick_junit::SerializeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagsuiteError>;
