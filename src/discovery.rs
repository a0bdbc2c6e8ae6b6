// src/discovery.rs

//! Test discovery: which spec files make up a run, and how their test
//! names are derived.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use regex::Regex;
use tracing::{debug, info, warn};

/// File name marking a test directory.
pub const TEST_SPEC_FILE: &str = "test.toml";

/// Strategy listing the tests of a run.
///
/// Returned paths are spec files relative to the test directory, using `/`
/// as separator.
pub trait TestDiscovery: Send + Sync {
    fn discover(&self, test_dir: &Path, sublist: &[String]) -> anyhow::Result<Vec<String>>;
}

/// Finds every [`TEST_SPEC_FILE`] under the test directory.
#[derive(Debug, Clone, Default)]
pub struct SpecFileDiscovery {
    /// Directory relative selectors are resolved from; the process's
    /// current directory when `None`.
    pub base_dir: Option<PathBuf>,
}

impl TestDiscovery for SpecFileDiscovery {
    fn discover(&self, test_dir: &Path, sublist: &[String]) -> anyhow::Result<Vec<String>> {
        let mut found = Vec::new();
        walk(test_dir, test_dir, &mut found)
            .with_context(|| format!("scanning test dir {}", test_dir.display()))?;
        found.sort();

        let base_dir = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("resolving current directory")?,
        };

        let result = if sublist.is_empty() {
            found
        } else {
            info!(filter = ?sublist, "filtering tests");
            let selectors: Vec<Selector> = sublist
                .iter()
                .map(|s| Selector::new(s, &base_dir, test_dir))
                .collect();
            found
                .into_iter()
                .filter(|p| selectors.iter().any(|s| s.matches(p)))
                .collect()
        };

        info!(count = result.len(), "found tests");
        debug!(tests = ?result, "test list");
        Ok(result)
    }
}

fn walk(root: &Path, dir: &Path, found: &mut Vec<String>) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, found)?;
        } else if file_type.is_file() && entry.file_name() == TEST_SPEC_FILE {
            if let Ok(rel) = path.strip_prefix(root) {
                found.push(to_slash(rel));
            }
        }
    }
    Ok(())
}

/// One sublist entry, turned into a path relative to the test dir.
#[derive(Debug)]
enum Selector {
    All,
    Pattern(Regex),
    Prefix(String),
}

impl Selector {
    fn new(raw: &str, base_dir: &Path, test_dir: &Path) -> Self {
        let absolute = normalize(&base_dir.join(raw));
        let test_dir = normalize(&if test_dir.is_absolute() {
            test_dir.to_path_buf()
        } else {
            base_dir.join(test_dir)
        });

        let Ok(rel) = absolute.strip_prefix(&test_dir) else {
            // A parent of the test dir (or somewhere else): everything.
            return Selector::All;
        };

        let mut rel = to_slash(rel);
        if rel.is_empty() {
            return Selector::All;
        }
        if raw.ends_with('/') || raw.ends_with('\\') {
            rel.push('/');
        }

        match Regex::new(&format!("^(?:{rel})")) {
            Ok(re) => Selector::Pattern(re),
            Err(err) => {
                warn!(selector = raw, error = %err, "selector is not a valid regex, matching as a prefix");
                Selector::Prefix(rel)
            }
        }
    }

    fn matches(&self, spec: &str) -> bool {
        match self {
            Selector::All => true,
            Selector::Pattern(re) => re.is_match(spec),
            Selector::Prefix(prefix) => spec.starts_with(prefix.as_str()),
        }
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Default test name: the spec file's directory relative to the test dir,
/// with `/` replaced by `__`.
pub fn default_test_name(test_case_file: &str) -> String {
    let normalized = test_case_file.replace('\\', "/");
    let dir = match normalized.rfind('/') {
        Some(pos) => &normalized[..pos],
        None => "",
    };
    dir.trim_end_matches('/').replace('/', "__")
}
