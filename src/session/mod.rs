//! Remote session management
//!
//! Opening, marking and tearing down remote browser sessions.

mod driver;
mod lifecycle;

pub use driver::{CdpDriver, Permission, RemoteBrowser, RemoteDriver, Viewport, GRANTED_PERMISSIONS, VIEWPORT};
pub use lifecycle::{ScenarioStatus, Session, SessionLifecycle};

#[cfg(test)]
pub(crate) use driver::mock;
