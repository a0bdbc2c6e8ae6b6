// src/report/mod.rs

//! Run artifacts: per-test result files, the summary, the xUnit export and
//! the environment dump.

pub mod environ;
pub mod sink;
pub mod summary;
pub mod xunit;

pub use sink::{encode_file_name, FileResultSink, ResultSink};
pub use summary::{render_result_line, RunSummary};
pub use xunit::{render_xunit, write_xunit};
