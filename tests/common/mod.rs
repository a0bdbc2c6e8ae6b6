#![allow(dead_code)]

pub use dagsuite_test_utils::builders;
pub use dagsuite_test_utils::drivers;
pub use dagsuite_test_utils::probe;
pub use dagsuite_test_utils::sink;
pub use dagsuite_test_utils::{init_tracing, with_timeout};

use std::error::Error;

pub type TestResult = Result<(), Box<dyn Error>>;
