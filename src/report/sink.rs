// src/report/sink.rs

//! Where collected results are persisted.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::errors::{DagsuiteError, Result};
use crate::result::TestResult;

/// Destination of collected results. Called once per result, from the
/// collecting loop only.
pub trait ResultSink: Send {
    fn persist(&mut self, result: &TestResult) -> Result<()>;
}

/// Writes one TOML file per result into a directory.
#[derive(Debug, Clone)]
pub struct FileResultSink {
    dir: PathBuf,
}

impl FileResultSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `test_name`.
    pub fn path_for(&self, test_name: &str) -> PathBuf {
        self.dir.join(format!("{}.toml", encode_file_name(test_name)))
    }
}

impl ResultSink for FileResultSink {
    fn persist(&mut self, result: &TestResult) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&result.test_name);
        let body = toml::to_string(result)?;

        // `create_new`: an artifact is never overwritten within a run.
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| {
                DagsuiteError::Other(anyhow::anyhow!(
                    "cannot write result artifact {}: {err}",
                    path.display()
                ))
            })?;
        file.write_all(body.as_bytes())?;

        trace!(path = %path.display(), "result persisted");
        Ok(())
    }
}

/// Map a test name to a portable file stem.
///
/// Bytes outside `[A-Za-z0-9._-]` are percent-encoded, as is a leading dot,
/// so distinct names always get distinct stems.
pub fn encode_file_name(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }
    let mut encoded = String::with_capacity(name.len());
    for (i, byte) in name.bytes().enumerate() {
        match byte {
            b'.' if i == 0 => encoded.push_str("%2E"),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                encoded.push(char::from(byte))
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
