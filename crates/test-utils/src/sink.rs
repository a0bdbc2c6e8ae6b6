use std::sync::{Arc, Mutex};

use dagsuite::errors::Result;
use dagsuite::report::ResultSink;
use dagsuite::result::{TestResult, TestStatus};

/// Result sink keeping everything in memory. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    results: Arc<Mutex<Vec<TestResult>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<TestResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn status_of(&self, test_name: &str) -> Option<TestStatus> {
        self.results
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.test_name == test_name)
            .map(|r| r.status)
    }

    pub fn names(&self) -> Vec<String> {
        self.results
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.test_name.clone())
            .collect()
    }
}

impl ResultSink for MemorySink {
    fn persist(&mut self, result: &TestResult) -> Result<()> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }
}
