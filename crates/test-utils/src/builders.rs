//! Builders for graphs, test specs and suite options.

use std::collections::BTreeMap;
use std::path::Path;

use dagsuite::config::SuiteOptions;
use dagsuite::dag::DependencyGraph;
use dagsuite::driver::TestEnv;

/// Parse a TOML snippet into a test env.
pub fn spec(source: &str) -> TestEnv {
    toml::from_str(source).expect("invalid TOML in test spec")
}

/// Builder for the in-memory spec map consumed by
/// [`crate::drivers::in_memory_suite`].
#[derive(Debug, Default)]
pub struct SpecsBuilder {
    specs: BTreeMap<String, Option<TestEnv>>,
}

impl SpecsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add test `name` (spec file `<name>/test.toml`).
    pub fn test(mut self, name: &str, source: &str) -> Self {
        self.specs
            .insert(format!("{name}/test.toml"), Some(spec(source)));
        self
    }

    /// Add a test whose spec fails to load.
    pub fn broken(mut self, name: &str) -> Self {
        self.specs.insert(format!("{name}/test.toml"), None);
        self
    }

    pub fn build(self) -> BTreeMap<String, Option<TestEnv>> {
        self.specs
    }
}

/// Builder for graphs with unit payloads and `v<i>` uids.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    vertices: Vec<Vec<usize>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uid(i: usize) -> String {
        format!("v{i}")
    }

    /// Add vertex `v<len>` depending on the given earlier vertices.
    pub fn vertex(mut self, predecessors: &[usize]) -> Self {
        self.vertices.push(predecessors.to_vec());
        self
    }

    /// `n` independent vertices.
    pub fn wide(n: usize) -> Self {
        (0..n).fold(Self::new(), |b, _| b.vertex(&[]))
    }

    /// `v0 -> v1 -> ... -> v<n-1>`.
    pub fn chain(n: usize) -> Self {
        (0..n).fold(Self::new(), |b, i| {
            if i == 0 { b.vertex(&[]) } else { b.vertex(&[i - 1]) }
        })
    }

    pub fn build(self) -> DependencyGraph<()> {
        let mut graph = DependencyGraph::new();
        for (i, preds) in self.vertices.iter().enumerate() {
            graph
                .add_vertex(&Self::uid(i), (), preds.iter().map(|&p| Self::uid(p)))
                .expect("duplicate uid in GraphBuilder");
        }
        graph
    }
}

/// Suite options writing everything under `dir`.
pub fn options_in(dir: &Path) -> SuiteOptions {
    let temp_dir = dir.join("tmp");
    std::fs::create_dir_all(&temp_dir).expect("cannot create temp dir");
    SuiteOptions {
        name: "selftest".to_string(),
        root_dir: dir.to_path_buf(),
        output_dir: dir.join("out"),
        temp_dir,
        jobs: 4,
        ..SuiteOptions::default()
    }
}
