//! Test-run driver
//!
//! Starts one worker per scenario. Each worker reads the run config, asks
//! the rotation for a profile, opens a session, publishes it into the
//! scenario's scope, runs the scenario body, then reports the outcome and
//! closes the session on every exit path, including body errors and panics.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::caps::{catalog, CapabilityRotation};
use crate::config::{Credentials, RunConfig};
use crate::errors::HarnessError;
use crate::report::{prepare_run_dir, StatusReporter};
use crate::scope::ScenarioScope;
use crate::session::{RemoteDriver, ScenarioStatus, SessionLifecycle};

/// A scenario body: step code that receives the scope holding the session.
pub type ScenarioBody =
    Box<dyn for<'a> Fn(&'a ScenarioScope) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;

/// One acceptance scenario: a name plus its step code.
pub struct Scenario {
    name: String,
    body: ScenarioBody,
}

impl Scenario {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a ScenarioScope) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of one executed scenario.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub scenario: String,
    /// Session name of the capability profile the rotation assigned, if the
    /// scenario got that far.
    pub profile: Option<String>,
    pub passed: bool,
    pub reason: String,
}

impl ScenarioReport {
    fn failed(scenario: String, profile: Option<String>, reason: String) -> Self {
        Self {
            scenario,
            profile,
            passed: false,
            reason,
        }
    }
}

/// Drives parallel scenario execution.
///
/// Construction is fatal on configuration problems (unreadable config,
/// unresolvable credentials, empty catalog): every worker depends on them,
/// so there is no point starting a run.
pub struct Runner {
    config_path: PathBuf,
    rotation: Arc<CapabilityRotation>,
    driver: Arc<dyn RemoteDriver>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config_path", &self.config_path)
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn new(
        config_path: impl Into<PathBuf>,
        driver: Arc<dyn RemoteDriver>,
    ) -> Result<Self, HarnessError> {
        let config_path = config_path.into();
        let config = RunConfig::load(&config_path)?;
        let credentials = Credentials::resolve(&config)?;
        let rotation = Arc::new(CapabilityRotation::new(catalog(&credentials))?);

        info!(
            "Runner ready: {} capability profiles, endpoint {}",
            rotation.len(),
            config.grid_endpoint
        );

        Ok(Self {
            config_path,
            rotation,
            driver,
        })
    }

    /// The shared rotation scheduler (one cursor for the whole run).
    pub fn rotation(&self) -> &CapabilityRotation {
        &self.rotation
    }

    /// Run all scenarios in parallel, one worker per scenario.
    ///
    /// A scenario that fails to obtain or open a session is reported as
    /// failed; the run continues with the remaining scenarios.
    pub async fn run(&self, scenarios: Vec<Scenario>) -> Vec<ScenarioReport> {
        if let Ok(config) = RunConfig::load(&self.config_path) {
            if let Err(e) = prepare_run_dir(Path::new(&config.report_dir)) {
                warn!("Report directory not prepared: {}", e);
            }
        }

        info!("=== RUNNING {} SCENARIOS IN PARALLEL ===", scenarios.len());

        let mut names = Vec::with_capacity(scenarios.len());
        let mut tasks = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            names.push(scenario.name.clone());
            let config_path = self.config_path.clone();
            let rotation = self.rotation.clone();
            let driver = self.driver.clone();
            tasks.push(tokio::spawn(execute(
                config_path,
                rotation,
                driver,
                scenario,
            )));
        }

        let mut reports = Vec::with_capacity(names.len());
        for (name, task) in names.into_iter().zip(join_all(tasks).await) {
            match task {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Worker for '{}' aborted: {}", name, e);
                    reports.push(ScenarioReport::failed(
                        name,
                        None,
                        format!("worker aborted: {}", e),
                    ));
                }
            }
        }

        let passed = reports.iter().filter(|r| r.passed).count();
        info!("=== RUN COMPLETE: {}/{} scenarios passed ===", passed, reports.len());
        reports
    }

    /// Run a single scenario to completion on the current worker.
    pub async fn run_scenario(&self, scenario: Scenario) -> ScenarioReport {
        execute(
            self.config_path.clone(),
            self.rotation.clone(),
            self.driver.clone(),
            scenario,
        )
        .await
    }
}

async fn execute(
    config_path: PathBuf,
    rotation: Arc<CapabilityRotation>,
    driver: Arc<dyn RemoteDriver>,
    scenario: Scenario,
) -> ScenarioReport {
    let name = scenario.name.clone();

    // Config is read once per worker, before any session is opened
    let config = match RunConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Scenario '{}' aborted before session open: {}", name, e);
            return ScenarioReport::failed(name, None, e.to_string());
        }
    };

    let profile = rotation.next();
    let profile_name = profile.name.clone();
    info!("Scenario '{}' assigned profile: {}", name, profile_name);

    let lifecycle = SessionLifecycle::new(driver, &config);
    let session = match lifecycle.open(&profile).await {
        Ok(session) => session,
        Err(e) => {
            error!("Scenario '{}' could not open a session: {}", name, e);
            return ScenarioReport::failed(name, Some(profile_name), e.to_string());
        }
    };

    let mut scope = ScenarioScope::new(name.clone());
    if let Err(e) = scope.register(session) {
        return ScenarioReport::failed(name, Some(profile_name), e.to_string());
    }

    // Panics must not skip teardown
    let body_result = AssertUnwindSafe((scenario.body)(&scope)).catch_unwind().await;
    let (status, reason) = match body_result {
        Ok(Ok(())) => (ScenarioStatus::Passed, "all steps passed".to_string()),
        Ok(Err(e)) => (ScenarioStatus::Failed, format!("{:#}", e)),
        Err(panic) => (ScenarioStatus::Failed, panic_reason(panic)),
    };

    let mut session = match scope.take_session() {
        Some(session) => session,
        None => {
            // Step code consumed the session; nothing left to report against
            warn!("Scenario '{}' removed its session from scope", name);
            return ScenarioReport {
                scenario: name,
                profile: Some(profile_name),
                passed: status == ScenarioStatus::Passed,
                reason,
            };
        }
    };

    let reporter = StatusReporter::new();
    if let Err(e) = reporter
        .report(&lifecycle, &mut session, status, &reason)
        .await
    {
        warn!("Scenario '{}' outcome not delivered: {}", name, e);
    }
    lifecycle.close(&mut session).await;

    ScenarioReport {
        scenario: name,
        profile: Some(profile_name),
        passed: status == ScenarioStatus::Passed,
        reason,
    }
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("scenario panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("scenario panicked: {}", message)
    } else {
        "scenario panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::{CallLog, MockDriver};
    use std::io::Write;

    fn config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let reports = std::env::temp_dir().join(format!("gridhook-test-{}", uuid::Uuid::new_v4()));
        write!(
            file,
            r#"{{
                "gridEndpoint": "wss://grid.test/cdp",
                "entryUrl": "https://sut.test/",
                "openTimeoutSecs": 5,
                "reportDir": "{}",
                "username": "u",
                "accessKey": "k"
            }}"#,
            reports.display()
        )
        .unwrap();
        file
    }

    fn runner(driver: MockDriver) -> (Runner, tempfile::NamedTempFile) {
        let file = config_file();
        let runner = Runner::new(file.path(), Arc::new(driver)).unwrap();
        (runner, file)
    }

    fn ok_body(_scope: &ScenarioScope) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn failing_body(_scope: &ScenarioScope) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Err(anyhow::anyhow!("assertion X")) })
    }

    fn panicking_body(_scope: &ScenarioScope) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { panic!("step blew up") })
    }

    fn inspecting_body(scope: &ScenarioScope) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let session = scope
                .session()
                .ok_or_else(|| anyhow::anyhow!("no session in scope"))?;
            anyhow::ensure!(session.is_open(), "session not open");
            Ok(())
        })
    }

    fn noop(name: &str) -> Scenario {
        Scenario::new(name, ok_body)
    }

    fn log_count(log: &CallLog, entry: &str) -> usize {
        log.lock().iter().filter(|c| c.as_str() == entry).count()
    }

    #[tokio::test]
    async fn five_sequential_scenarios_rotate_p0_p1_p2_p0_p1() {
        let (driver, _log) = MockDriver::recording();
        let (runner, _file) = runner(driver);

        let mut profiles = Vec::new();
        for i in 0..5 {
            let report = runner.run_scenario(noop(&format!("scenario-{}", i))).await;
            assert!(report.passed, "reason: {}", report.reason);
            profiles.push(report.profile.unwrap());
        }

        assert_eq!(
            profiles,
            vec![
                "Branded Google Chrome on Catalina",
                "Branded Microsoft Edge on Catalina",
                "Playwright Chromium on Catalina",
                "Branded Google Chrome on Catalina",
                "Branded Microsoft Edge on Catalina",
            ]
        );
    }

    #[tokio::test]
    async fn parallel_run_returns_one_report_per_scenario_with_distinct_profiles() {
        let (driver, log) = MockDriver::recording();
        let (runner, _file) = runner(driver);

        let scenarios = vec![noop("a"), noop("b"), noop("c")];
        let reports = runner.run(scenarios).await;

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.passed));

        // 3 workers over a 3-profile catalog: each profile exactly once
        let mut profiles: Vec<_> = reports.iter().map(|r| r.profile.clone().unwrap()).collect();
        profiles.sort();
        profiles.dedup();
        assert_eq!(profiles.len(), 3);

        // Every session was torn down
        assert_eq!(log_count(&log, "disconnect"), 3);
    }

    #[tokio::test]
    async fn failing_body_reports_failed_outcome_and_still_closes() {
        let (driver, log) = MockDriver::recording();
        let (runner, _file) = runner(driver);

        let report = runner
            .run_scenario(Scenario::new("broken", failing_body))
            .await;

        assert!(!report.passed);
        assert_eq!(report.reason, "assertion X");

        let calls = log.lock().clone();
        assert!(calls.iter().any(|c| c
            == r#"script {"action":"setSessionStatus","arguments":{"status":"failed","reason":"assertion X"}}"#));
        assert!(calls.contains(&"disconnect".to_string()));
    }

    #[tokio::test]
    async fn panicking_body_still_tears_down_the_session() {
        let (driver, log) = MockDriver::recording();
        let (runner, _file) = runner(driver);

        let report = runner
            .run_scenario(Scenario::new("exploder", panicking_body))
            .await;

        assert!(!report.passed);
        assert!(report.reason.contains("step blew up"));
        assert_eq!(log_count(&log, "disconnect"), 1);
    }

    #[tokio::test]
    async fn open_failure_is_an_isolated_scenario_failure() {
        let (mut driver, _log) = MockDriver::recording();
        driver.fail_connect = true;
        let (runner, _file) = runner(driver);

        let reports = runner.run(vec![noop("a"), noop("b")]).await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| !r.passed));
        // Profiles were still assigned; the failure is per-scenario, the
        // rotation cursor is untouched by it
        assert!(reports.iter().all(|r| r.profile.is_some()));
    }

    #[tokio::test]
    async fn body_sees_the_registered_session() {
        let (driver, _log) = MockDriver::recording();
        let (runner, _file) = runner(driver);

        let report = runner
            .run_scenario(Scenario::new("uses-session", inspecting_body))
            .await;
        assert!(report.passed, "reason: {}", report.reason);
    }

    #[test]
    fn missing_config_file_is_fatal_at_construction() {
        let (driver, _log) = MockDriver::recording();
        let err = Runner::new("/nonexistent/single.conf.json", Arc::new(driver)).unwrap_err();
        assert!(err.is_fatal());
    }
}
