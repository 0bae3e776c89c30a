//! The single WebDriver session: one geckodriver process, one Firefox,
//! one current-tab pointer.

use crate::config::schema::FirefoxConfig;
use crate::driver::launcher;
use crate::error::ApiError;
use fantoccini::wd::{Capabilities, WindowHandle};
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::time::Duration;
use tokio::process::Child;
use uuid::Uuid;

const DRIVER_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Information about one tab
#[derive(Debug, Clone, serde::Serialize)]
pub struct TabInfo {
    pub handle: String,
    pub title: String,
    pub url: String,
    pub is_current: bool,
}

/// Title and URL of the focused tab after an operation
#[derive(Debug, Clone, serde::Serialize)]
pub struct PageInfo {
    pub title: String,
    pub url: String,
}

/// A live browser session.
///
/// Owns the geckodriver child process and the WebDriver client. `current`
/// tracks the tab targeted by navigation, screenshots and scripts; closing
/// the current tab leaves it `None` until another tab is opened or selected.
/// Invariant: while `current` is `Some(h)`, the driver's focused window is `h`.
pub struct BrowserSession {
    id: Uuid,
    client: Client,
    driver: Child,
    driver_port: u16,
    current: Option<String>,
}

impl BrowserSession {
    /// Launch geckodriver, connect a WebDriver session and prepare the
    /// first tab. Stale geckodriver processes from a previous run are
    /// killed first so their ports don't shadow ours.
    pub async fn launch(config: &FirefoxConfig) -> Result<Self, ApiError> {
        launcher::kill_stale_drivers();

        let port = launcher::allocate_driver_port();
        let mut driver = launcher::spawn(config, port)?;

        if let Err(e) = launcher::wait_until_ready(port, DRIVER_READY_TIMEOUT).await {
            let _ = driver.kill().await;
            return Err(e.into());
        }

        let url = format!("http://127.0.0.1:{}", port);
        let mut builder = ClientBuilder::native();
        builder.capabilities(Self::capabilities(config));
        let client = match builder.connect(&url).await {
            Ok(c) => c,
            Err(e) => {
                let _ = driver.kill().await;
                return Err(e.into());
            }
        };

        let mut session = Self {
            id: Uuid::new_v4(),
            client,
            driver,
            driver_port: port,
            current: None,
        };

        match session.client.window().await {
            Ok(handle) => session.current = Some(String::from(handle)),
            Err(e) => {
                session.quit().await;
                return Err(e.into());
            }
        }

        if let Some(start_url) = &config.start_url {
            // Navigation blocks until the page load settles (or the
            // pageLoad timeout fires); a failing start page must not
            // take the whole launch down.
            if let Err(e) = session.client.goto(start_url).await {
                tracing::warn!("Failed to load start page {}: {}", start_url, e);
            }
        }

        tracing::info!(
            "Browser session {} established (geckodriver port {})",
            session.id,
            port
        );
        Ok(session)
    }

    fn capabilities(config: &FirefoxConfig) -> Capabilities {
        let mut args = Vec::new();
        if config.headless {
            args.push("-headless".to_string());
        }
        args.push(format!("--width={}", config.window_width));
        args.push(format!("--height={}", config.window_height));
        args.extend(config.extra_args.iter().cloned());

        let mut firefox_options = serde_json::Map::new();
        firefox_options.insert("args".to_string(), json!(args));
        if let Some(binary) = &config.binary {
            firefox_options.insert("binary".to_string(), json!(binary));
        }

        let mut caps = Capabilities::new();
        caps.insert(
            "moz:firefoxOptions".to_string(),
            serde_json::Value::Object(firefox_options),
        );
        caps.insert(
            "timeouts".to_string(),
            json!({
                "pageLoad": config.page_load_timeout_ms,
                "script": config.script_timeout_ms,
            }),
        );
        caps
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn driver_port(&self) -> u16 {
        self.driver_port
    }

    pub fn current_tab(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn require_current(&self) -> Result<&str, ApiError> {
        self.current.as_deref().ok_or(ApiError::NoCurrentTab)
    }

    async fn window_handles(&self) -> Result<Vec<String>, ApiError> {
        let handles = self.client.windows().await?;
        Ok(handles.into_iter().map(String::from).collect())
    }

    async fn focus(&self, handle: &str) -> Result<(), ApiError> {
        let handle = WindowHandle::try_from(handle.to_string())
            .map_err(|_| ApiError::TabNotFound(handle.to_string()))?;
        self.client.switch_to_window(handle).await?;
        Ok(())
    }

    async fn page_info(&self) -> Result<PageInfo, ApiError> {
        Ok(PageInfo {
            title: self.client.title().await?,
            url: self.client.current_url().await?.to_string(),
        })
    }

    /// Navigate the current tab
    pub async fn navigate(&self, url: &str) -> Result<PageInfo, ApiError> {
        self.require_current()?;
        self.client.goto(url).await?;
        self.page_info().await
    }

    /// Capture the current tab's viewport as PNG bytes
    pub async fn screenshot(&self) -> Result<Vec<u8>, ApiError> {
        self.require_current()?;
        Ok(self.client.screenshot().await?)
    }

    /// Run a script in the current tab and return its value.
    /// Any driver-side failure is reported as a script error with the
    /// underlying message; the caller decides whether to retry.
    pub async fn execute_script(&self, script: &str) -> Result<serde_json::Value, ApiError> {
        self.require_current()?;
        self.client
            .execute(script, vec![])
            .await
            .map_err(|e| ApiError::Script(e.to_string()))
    }

    /// Open a new tab, make it current and optionally navigate it
    pub async fn open_tab(&mut self, url: Option<&str>) -> Result<TabInfo, ApiError> {
        let new_window = self.client.new_window(true).await?;
        let handle = String::from(new_window.handle);
        self.focus(&handle).await?;
        self.current = Some(handle.clone());

        if let Some(url) = url {
            if url != "about:blank" {
                self.client.goto(url).await?;
            }
        }

        let info = self.page_info().await?;
        Ok(TabInfo {
            handle,
            title: info.title,
            url: info.url,
            is_current: true,
        })
    }

    /// List all tabs. The driver has to visit each tab to read its title
    /// and URL; focus is restored to the current tab afterwards.
    pub async fn tabs(&self) -> Result<Vec<TabInfo>, ApiError> {
        let handles = self.window_handles().await?;
        let mut tabs = Vec::with_capacity(handles.len());

        for handle in handles {
            self.focus(&handle).await?;
            let info = self.page_info().await?;
            let is_current = self.current.as_deref() == Some(handle.as_str());
            tabs.push(TabInfo {
                handle,
                title: info.title,
                url: info.url,
                is_current,
            });
        }

        if let Some(current) = &self.current {
            self.focus(current).await?;
        }
        Ok(tabs)
    }

    /// Switch the current tab. An unknown handle leaves the current tab
    /// unchanged.
    pub async fn switch_tab(&mut self, handle: &str) -> Result<PageInfo, ApiError> {
        if !self.window_handles().await?.iter().any(|h| h == handle) {
            return Err(ApiError::TabNotFound(handle.to_string()));
        }
        self.focus(handle).await?;
        self.current = Some(handle.to_string());
        self.page_info().await
    }

    /// Close a tab (the current one when no handle is given). Closing the
    /// current tab leaves the session without a current tab. The last
    /// remaining tab cannot be closed; use quit instead.
    pub async fn close_tab(&mut self, handle: Option<&str>) -> Result<usize, ApiError> {
        let target = match handle {
            Some(h) => h.to_string(),
            None => self.require_current()?.to_string(),
        };

        let handles = self.window_handles().await?;
        if !handles.iter().any(|h| *h == target) {
            return Err(ApiError::TabNotFound(target));
        }
        if handles.len() == 1 {
            return Err(ApiError::LastTab);
        }

        let was_current = self.current.as_deref() == Some(target.as_str());
        self.focus(&target).await?;
        self.client.close_window().await?;

        if was_current {
            self.current = None;
        } else if let Some(current) = &self.current {
            self.focus(current).await?;
        }

        Ok(self.window_handles().await?.len())
    }

    /// All window handles plus the focused tab's page info, for /api/status
    pub async fn status(&self) -> Result<(Vec<String>, Option<PageInfo>), ApiError> {
        let handles = self.window_handles().await?;
        let page = if self.current.is_some() {
            Some(self.page_info().await?)
        } else {
            None
        };
        Ok((handles, page))
    }

    /// End the WebDriver session and kill geckodriver. Failures are logged,
    /// not surfaced: quit must always leave the slot empty.
    pub async fn quit(mut self) {
        if let Err(e) = self.client.close().await {
            tracing::warn!("Failed to close WebDriver session cleanly: {}", e);
        }
        if let Err(e) = self.driver.kill().await {
            tracing::warn!("Failed to kill geckodriver: {}", e);
        }
        tracing::info!("Browser session {} terminated", self.id);
    }
}
