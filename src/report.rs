//! Status reporting and report directory handling
//!
//! The reporter is a thin pass-through to the lifecycle manager's outcome
//! channel: step code, not the lifecycle, decides pass/fail. The report
//! directory is a side collaborator: wiped once per run, best effort, and
//! repopulated with a timestamp-named subdirectory.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::errors::HarnessError;
use crate::session::{ScenarioStatus, Session, SessionLifecycle};

/// Pushes scenario outcomes to the grid provider.
#[derive(Debug, Default)]
pub struct StatusReporter;

impl StatusReporter {
    pub fn new() -> Self {
        Self
    }

    /// Report the outcome of the scenario that owns `session`.
    ///
    /// Must happen before the session is closed; afterwards it degrades to a
    /// benign no-op inside the lifecycle.
    pub async fn report(
        &self,
        lifecycle: &SessionLifecycle,
        session: &mut Session,
        status: ScenarioStatus,
        reason: &str,
    ) -> Result<(), HarnessError> {
        lifecycle.mark_outcome(session, status, reason).await
    }
}

/// Wipe the previous report area and create a fresh timestamped run
/// directory underneath it.
///
/// Deletion of stale reports is best effort: a failure is logged and the run
/// continues. Creation of the new run directory is required.
pub fn prepare_run_dir(base: &Path) -> Result<PathBuf, HarnessError> {
    if base.exists() {
        if let Err(e) = std::fs::remove_dir_all(base) {
            warn!("Could not delete previous reports at {}: {}", base.display(), e);
        }
    }

    let run_dir = base.join(format!("Report_{}", Local::now().format("%d%m%Y_%H%M%S")));
    std::fs::create_dir_all(&run_dir)?;

    info!("Report directory ready: {}", run_dir.display());
    Ok(run_dir)
}
