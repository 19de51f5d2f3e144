//! gridhook
//!
//! A harness for running browser-based acceptance scenarios in parallel
//! against a remote browser grid. Each worker is handed a distinct,
//! deterministically-rotated capability profile, gets a freshly opened remote
//! session published into its scenario scope, and is guaranteed teardown of
//! that session on every exit path.

pub mod caps;
pub mod config;
pub mod errors;
pub mod report;
pub mod runner;
pub mod scope;
pub mod session;

use std::path::Path;

pub use caps::{catalog, endpoint_url, CapabilityProfile, CapabilityRotation};
pub use config::{Credentials, RunConfig};
pub use errors::HarnessError;
pub use report::{prepare_run_dir, StatusReporter};
pub use runner::{Runner, Scenario, ScenarioReport};
pub use scope::ScenarioScope;
pub use session::{CdpDriver, RemoteDriver, ScenarioStatus, Session, SessionLifecycle};

/// Initialize logging: console layer always, plus a daily-rolling file layer
/// when a log directory is given.
///
/// Returns the appender guard; dropping it flushes and stops the writer.
pub fn init_logging(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir {
        let _ = std::fs::create_dir_all(log_dir);
        let file_appender = tracing_appender::rolling::daily(log_dir, "gridhook.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
