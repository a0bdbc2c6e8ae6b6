// src/engine/workspace.rs

//! Filesystem layout of a run: the rotated output directory and the
//! working directory handed to tests.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::SuiteOptions;
use crate::errors::{DagsuiteError, Result};

/// Prepare `<output>/new` for this run's results.
///
/// A previous `new` becomes `old`; a previous `old` is deleted.
pub fn setup_result_dir(output_dir: &Path) -> Result<PathBuf> {
    let output_dir = std::path::absolute(output_dir)?;
    let new_dir = output_dir.join("new");
    let old_dir = output_dir.join("old");

    if old_dir.is_dir() {
        fs::remove_dir_all(&old_dir)?;
    }
    if new_dir.is_dir() {
        fs::rename(&new_dir, &old_dir)?;
        debug!(dir = %old_dir.display(), "previous results kept");
    }
    fs::create_dir_all(&new_dir)?;
    Ok(new_dir)
}

/// Root of the per-test working directories.
#[derive(Debug)]
pub struct WorkingDir {
    path: PathBuf,
    /// Present when the directory is removed at the end of the run.
    temp: Option<TempDir>,
}

impl WorkingDir {
    /// Provision the working directory described by `options`.
    ///
    /// - `dev_temp`: that exact directory, emptied first, never removed.
    /// - otherwise a fresh `tmp*` directory inside `temp_dir`, removed at
    ///   the end unless cleanup is disabled.
    pub fn provision(options: &SuiteOptions) -> Result<Self> {
        if let Some(dev_temp) = &options.dev_temp {
            let path = std::path::absolute(dev_temp)?;
            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
            fs::create_dir_all(&path)?;
            info!(dir = %path.display(), "using developer working dir (cleanup disabled)");
            return Ok(Self { path, temp: None });
        }

        if !options.temp_dir.is_dir() {
            return Err(DagsuiteError::ConfigError(format!(
                "temp dir '{}' does not exist",
                options.temp_dir.display()
            )));
        }

        let temp = tempfile::Builder::new()
            .prefix("tmp")
            .tempdir_in(std::path::absolute(&options.temp_dir)?)?;

        if options.enable_cleanup {
            Ok(Self {
                path: temp.path().to_path_buf(),
                temp: Some(temp),
            })
        } else {
            let path = temp.keep();
            info!(dir = %path.display(), "working dir will be kept");
            Ok(Self { path, temp: None })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// End of run: remove the directory if it is temporary.
    pub fn finish(self) {
        if let Some(temp) = self.temp {
            if let Err(err) = temp.close() {
                warn!(dir = %self.path.display(), error = %err, "cannot remove working dir");
            }
        }
    }
}
