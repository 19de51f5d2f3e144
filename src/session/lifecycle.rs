//! Session lifecycle management
//!
//! Opens remote sessions against a chosen capability profile and guarantees
//! teardown. Per scenario the session moves through
//! `Idle -> ProfileAssigned -> SessionOpen -> (OutcomeReported)? -> Closed`;
//! `Closed` is terminal and reachable from every partial-open failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::driver::{RemoteBrowser, RemoteDriver, GRANTED_PERMISSIONS, VIEWPORT};
use crate::caps::{endpoint_url, CapabilityProfile};
use crate::config::RunConfig;
use crate::errors::HarnessError;

/// Scenario outcome pushed to the grid provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioStatus {
    Passed,
    Failed,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Passed => "passed",
            ScenarioStatus::Failed => "failed",
        }
    }
}

// Field order is the wire order; the provider expects exactly
// {"action":"setSessionStatus","arguments":{"status":...,"reason":...}}
#[derive(Serialize)]
struct SessionStatusCommand<'a> {
    action: &'static str,
    arguments: SessionStatusArguments<'a>,
}

#[derive(Serialize)]
struct SessionStatusArguments<'a> {
    status: &'a str,
    reason: &'a str,
}

pub(crate) fn status_payload(status: ScenarioStatus, reason: &str) -> String {
    let command = SessionStatusCommand {
        action: "setSessionStatus",
        arguments: SessionStatusArguments {
            status: status.as_str(),
            reason,
        },
    };
    // A struct of string fields always serializes
    serde_json::to_string(&command).unwrap_or_default()
}

/// One remote browser session plus its browsing context and active page.
///
/// Owned exclusively by the worker that created it; never shared across
/// workers. Closing is idempotent and must happen on every exit path.
pub struct Session {
    id: Uuid,
    profile: CapabilityProfile,
    browser: Option<Box<dyn RemoteBrowser>>,
    outcome_reported: bool,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    /// Whether the remote connection is still open.
    pub fn is_open(&self) -> bool {
        self.browser.is_some()
    }

    pub fn outcome_reported(&self) -> bool {
        self.outcome_reported
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("profile", &self.profile.name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Async close cannot run here; the driver's own drop releases the
        // transport. Reaching this with an open session means a caller
        // skipped the teardown path.
        if self.browser.is_some() {
            warn!(
                "Session {} ({}) dropped while still open",
                self.id, self.profile.name
            );
        }
    }
}

/// Opens, marks and closes remote sessions.
///
/// One instance per run, shared by all workers. Holds no per-session state;
/// sessions themselves are never shared.
pub struct SessionLifecycle {
    driver: Arc<dyn RemoteDriver>,
    grid_endpoint: String,
    entry_url: String,
    open_timeout: Duration,
}

impl SessionLifecycle {
    pub fn new(driver: Arc<dyn RemoteDriver>, config: &RunConfig) -> Self {
        Self {
            driver,
            grid_endpoint: config.grid_endpoint.clone(),
            entry_url: config.entry_url.clone(),
            open_timeout: Duration::from_secs(config.open_timeout_secs),
        }
    }

    /// Open a fully-initialized session for `profile`: connect to the grid,
    /// create an isolated context with viewport and permissions, open a page
    /// and navigate it to the entry URL.
    ///
    /// Every slow step is bounded by the configured timeout. A failure after
    /// the connection is up still tears down whatever was created before the
    /// error is returned.
    pub async fn open(&self, profile: &CapabilityProfile) -> Result<Session, HarnessError> {
        let endpoint = endpoint_url(&self.grid_endpoint, profile)?;

        debug!("Opening session for profile: {}", profile.name);
        let mut browser = self
            .bounded("grid connect", self.driver.connect(&endpoint))
            .await?;

        if let Err(e) = self
            .bounded("context creation", browser.create_context(&GRANTED_PERMISSIONS))
            .await
        {
            Self::teardown(browser.as_mut()).await;
            return Err(e);
        }

        if let Err(e) = self
            .bounded("entry navigation", browser.open_page(VIEWPORT, &self.entry_url))
            .await
        {
            Self::teardown(browser.as_mut()).await;
            return Err(e);
        }

        let session = Session {
            id: Uuid::new_v4(),
            profile: profile.clone(),
            browser: Some(browser),
            outcome_reported: false,
        };
        info!("Session {} open ({})", session.id, profile.name);
        Ok(session)
    }

    /// Push the scenario outcome through the session's provider channel.
    ///
    /// Must be called before `close`; once the session is closed this is a
    /// benign no-op.
    pub async fn mark_outcome(
        &self,
        session: &mut Session,
        status: ScenarioStatus,
        reason: &str,
    ) -> Result<(), HarnessError> {
        let Some(browser) = session.browser.as_mut() else {
            debug!("Session {} already closed, outcome not sent", session.id);
            return Ok(());
        };

        let payload = status_payload(status, reason);
        browser.execute_script(&payload).await?;
        session.outcome_reported = true;
        debug!(
            "Session {} outcome reported: {}",
            session.id,
            status.as_str()
        );
        Ok(())
    }

    /// Idempotent teardown: page, then context, then connection.
    ///
    /// A failure at one layer never prevents attempting the next; secondary
    /// failures are logged and swallowed.
    pub async fn close(&self, session: &mut Session) {
        let Some(mut browser) = session.browser.take() else {
            debug!("Session {} already closed", session.id);
            return;
        };

        Self::teardown(browser.as_mut()).await;
        info!("Session {} closed ({})", session.id, session.profile.name);
    }

    async fn teardown(browser: &mut dyn RemoteBrowser) {
        if let Err(e) = browser.close_page().await {
            warn!("Teardown: page close failed: {}", e);
        }
        if let Err(e) = browser.close_context().await {
            warn!("Teardown: context close failed: {}", e);
        }
        if let Err(e) = browser.disconnect().await {
            warn!("Teardown: disconnect failed: {}", e);
        }
    }

    async fn bounded<T, F>(&self, step: &str, operation: F) -> Result<T, HarnessError>
    where
        F: Future<Output = Result<T, HarnessError>>,
    {
        match tokio::time::timeout(self.open_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Connection(format!(
                "{} timed out after {}s",
                step,
                self.open_timeout.as_secs()
            ))),
        }
    }
}
