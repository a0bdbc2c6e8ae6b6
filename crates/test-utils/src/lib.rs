//! Shared fixtures for the `dagsuite` integration tests.

pub mod builders;
pub mod drivers;
pub mod probe;
pub mod sink;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use dagsuite::logging::LOG_ENV_VAR;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Hard limit for a single async test scenario.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Install a subscriber writing through the test harness, so logs only show
/// up for failing tests (or with `--nocapture`).
///
/// The filter comes from `DAGSUITE_LOG` (e.g. `DAGSUITE_LOG=dagsuite=debug`),
/// defaulting to `info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("scenario did not finish within {TEST_TIMEOUT:?}"),
    }
}
