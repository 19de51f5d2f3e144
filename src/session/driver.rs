//! Remote browser driver
//!
//! The wire protocol used to drive the remote browser is an external
//! collaborator, so the lifecycle manager talks to it through a narrow trait
//! pair. The production implementation speaks CDP via chromiumoxide against a
//! grid endpoint; tests use an in-memory mock.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    BrowserContextId, GrantPermissionsParams, PermissionType,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::errors::HarnessError;

/// Fixed viewport every session context is created with.
pub const VIEWPORT: Viewport = Viewport {
    width: 1920,
    height: 1080,
};

/// Permissions pre-granted to every session context.
pub const GRANTED_PERMISSIONS: [Permission; 3] = [
    Permission::ClipboardRead,
    Permission::ClipboardWrite,
    Permission::Geolocation,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ClipboardRead,
    ClipboardWrite,
    Geolocation,
}

/// Factory for remote browser connections.
#[async_trait]
pub trait RemoteDriver: Send + Sync {
    /// Establish a connection to the grid endpoint (capabilities already
    /// embedded in the URL query).
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn RemoteBrowser>, HarnessError>;
}

/// One remote browser connection plus its browsing context and active page.
///
/// Layered teardown contract: `close_page`, `close_context` and `disconnect`
/// are each idempotent, and a failure in one layer must not stop the caller
/// from attempting the next.
#[async_trait]
pub trait RemoteBrowser: Send + Sync {
    /// Create an isolated browsing context with the given permissions
    /// pre-granted.
    async fn create_context(&mut self, permissions: &[Permission]) -> Result<(), HarnessError>;

    /// Open a page in the context, apply the viewport, and navigate to the
    /// entry URL.
    async fn open_page(&mut self, viewport: Viewport, entry_url: &str)
        -> Result<(), HarnessError>;

    /// Send a provider command payload through the page's script channel.
    async fn execute_script(&mut self, payload: &str) -> Result<(), HarnessError>;

    async fn close_page(&mut self) -> Result<(), HarnessError>;

    async fn close_context(&mut self) -> Result<(), HarnessError>;

    async fn disconnect(&mut self) -> Result<(), HarnessError>;
}

/// CDP driver for BrowserStack-style grid endpoints.
#[derive(Debug, Default)]
pub struct CdpDriver;

impl CdpDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteDriver for CdpDriver {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn RemoteBrowser>, HarnessError> {
        let (browser, mut handler) = Browser::connect(endpoint)
            .await
            .map_err(|e| HarnessError::Connection(format!("grid rejected connection: {}", e)))?;

        // Drive the CDP message loop until the connection ends
        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!("CDP event loop ended (connection closed)");
        });

        Ok(Box::new(CdpBrowser {
            browser: Some(browser),
            context: None,
            page: None,
            event_loop: Some(event_loop),
        }))
    }
}

struct CdpBrowser {
    browser: Option<Browser>,
    context: Option<BrowserContextId>,
    page: Option<Page>,
    event_loop: Option<tokio::task::JoinHandle<()>>,
}

impl CdpBrowser {
    fn browser(&self) -> Result<&Browser, HarnessError> {
        self.browser
            .as_ref()
            .ok_or_else(|| HarnessError::Connection("browser connection closed".to_string()))
    }

    fn map_permission(permission: Permission) -> PermissionType {
        match permission {
            Permission::ClipboardRead => PermissionType::ClipboardReadWrite,
            Permission::ClipboardWrite => PermissionType::ClipboardSanitizedWrite,
            Permission::Geolocation => PermissionType::Geolocation,
        }
    }
}

#[async_trait]
impl RemoteBrowser for CdpBrowser {
    async fn create_context(&mut self, permissions: &[Permission]) -> Result<(), HarnessError> {
        let browser = self.browser()?;

        let response = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| HarnessError::Connection(format!("context creation failed: {}", e)))?;
        let context = response.result.browser_context_id.clone();

        let mut grant = GrantPermissionsParams::new(
            permissions
                .iter()
                .map(|p| Self::map_permission(*p))
                .collect::<Vec<_>>(),
        );
        grant.browser_context_id = Some(context.clone());
        browser
            .execute(grant)
            .await
            .map_err(|e| HarnessError::Connection(format!("permission grant failed: {}", e)))?;

        self.context = Some(context);
        Ok(())
    }

    async fn open_page(
        &mut self,
        viewport: Viewport,
        entry_url: &str,
    ) -> Result<(), HarnessError> {
        let context = self
            .context
            .clone()
            .ok_or_else(|| HarnessError::Connection("no browsing context".to_string()))?;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context)
            .build()
            .map_err(HarnessError::Connection)?;

        let page = self
            .browser()?
            .new_page(target)
            .await
            .map_err(|e| HarnessError::Connection(format!("page creation failed: {}", e)))?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            viewport.width as i64,
            viewport.height as i64,
            1.0,
            false,
        ))
        .await
        .map_err(|e| HarnessError::Connection(format!("viewport override failed: {}", e)))?;

        page.goto(entry_url)
            .await
            .map_err(|e| HarnessError::Navigation(format!("{}: {}", entry_url, e)))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| HarnessError::Navigation(format!("{}: {}", entry_url, e)))?;

        self.page = Some(page);
        Ok(())
    }

    async fn execute_script(&mut self, payload: &str) -> Result<(), HarnessError> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| HarnessError::Connection("no active page".to_string()))?;

        // BrowserStack intercepts evaluate calls carrying this framing; the
        // expression never reaches the page itself.
        page.evaluate(format!("browserstack_executor: {}", payload))
            .await
            .map_err(|e| HarnessError::Connection(format!("provider command failed: {}", e)))?;
        Ok(())
    }

    async fn close_page(&mut self) -> Result<(), HarnessError> {
        if let Some(page) = self.page.take() {
            page.close()
                .await
                .map_err(|e| HarnessError::Connection(format!("page close failed: {}", e)))?;
        }
        Ok(())
    }

    async fn close_context(&mut self) -> Result<(), HarnessError> {
        if let Some(context) = self.context.take() {
            self.browser()?
                .execute(DisposeBrowserContextParams::new(context))
                .await
                .map_err(|e| HarnessError::Connection(format!("context dispose failed: {}", e)))?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), HarnessError> {
        let result = match self.browser.take() {
            Some(mut browser) => browser
                .close()
                .await
                .map(|_| ())
                .map_err(|e| HarnessError::Connection(format!("browser close failed: {}", e))),
            None => Ok(()),
        };

        if let Some(event_loop) = self.event_loop.take() {
            event_loop.abort();
        }

        result
    }
}

impl Drop for CdpBrowser {
    fn drop(&mut self) {
        if self.browser.is_some() {
            warn!("CDP connection dropped without disconnect; transport released on drop");
        }
        if let Some(event_loop) = self.event_loop.take() {
            event_loop.abort();
        }
    }
}
