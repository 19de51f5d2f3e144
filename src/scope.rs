//! Scenario scope
//!
//! Per-scenario registry that publishes the active session to step code.
//! One scope value is created at scenario start, passed by reference into
//! every step, and destroyed with the scenario. Explicit context-passing
//! instead of a runtime service locator: two concurrently running scenarios
//! can never see each other's handles.

use tracing::debug;
use uuid::Uuid;

use crate::errors::HarnessError;
use crate::session::Session;

/// The lifetime and visibility boundary of one executed scenario.
#[derive(Debug)]
pub struct ScenarioScope {
    id: Uuid,
    name: String,
    session: Option<Session>,
}

impl ScenarioScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            session: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish the scenario's session. Write-once: registering a second
    /// session in the same scope is a programming error.
    pub fn register(&mut self, session: Session) -> Result<(), HarnessError> {
        if self.session.is_some() {
            return Err(HarnessError::Configuration(format!(
                "scenario '{}' already has a registered session",
                self.name
            )));
        }

        debug!("Scenario '{}' registered session {}", self.name, session.id());
        self.session = Some(session);
        Ok(())
    }

    /// The active session, if one has been registered.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Remove the session for teardown. The scope is empty afterwards.
    pub fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }
}
