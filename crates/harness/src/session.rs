//! Session lifecycle - launch, viewport mutation, scoped teardown
//!
//! A session is one isolated browser context plus one page, owned
//! exclusively by its scenario. There is no pooling: every `acquire` call on
//! a fresh config produces a new session, so a failure in one scenario can
//! never leak state into the next.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::driver::{Browser, DriverConfig, PageDriver, PlaywrightDriver};
use crate::error::{HarnessError, HarnessResult};
use crate::scenario::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Closed,
}

/// Configuration for acquiring a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the application under test.
    pub base_url: String,

    pub viewport: Viewport,
    pub browser: Browser,
    pub headless: bool,

    /// Bound on browser launch (and eager navigation, when enabled).
    pub launch_timeout: Duration,

    /// Settle interval after resizes and other unobservable reflows.
    pub settle_interval: Duration,

    /// When set, `acquire` first waits for the app to answer over HTTP and
    /// fails with a launch error if it never does.
    pub reachability_timeout: Option<Duration>,

    /// Navigate to the base URL during `acquire` instead of leaving the
    /// first navigation to the scenario.
    pub eager_navigation: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1420".to_string(),
            viewport: Viewport { width: 1280, height: 720 },
            browser: Browser::Chromium,
            headless: true,
            launch_timeout: Duration::from_secs(30),
            settle_interval: Duration::from_secs(1),
            reachability_timeout: None,
            eager_navigation: false,
        }
    }
}

/// One browser context and page, plus the config it was acquired with.
///
/// The sidecar process is killed on drop even if [`Session::release`] never
/// ran, so teardown happens on abnormal termination too.
pub struct Session {
    driver: Box<dyn PageDriver>,
    base_url: String,
    viewport: Viewport,
    settle_interval: Duration,
    state: SessionState,
}

impl Session {
    pub fn new(driver: Box<dyn PageDriver>, config: &SessionConfig) -> Self {
        Self {
            driver,
            base_url: config.base_url.clone(),
            viewport: config.viewport,
            settle_interval: config.settle_interval,
            state: SessionState::Active,
        }
    }

    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn settle_interval(&self) -> Duration {
        self.settle_interval
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Join a scenario-relative URL onto the base URL.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }

    /// Mutate the live viewport without tearing down the session.
    pub async fn resize(&mut self, width: u32, height: u32) -> HarnessResult<()> {
        self.driver.set_viewport(width, height).await?;
        self.viewport = Viewport { width, height };
        debug!("viewport now {}", self.viewport);
        Ok(())
    }

    /// Scoped teardown. Safe to call more than once.
    pub async fn release(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Err(e) = self.driver.close().await {
            warn!("session teardown error (ignored): {}", e);
        }
        self.state = SessionState::Closed;
    }
}

/// Acquires and releases isolated sessions.
pub struct SessionController;

impl SessionController {
    /// Launch an isolated browser context per the config.
    ///
    /// Fails with a launch error if the sidecar cannot start, the app never
    /// becomes reachable (when a reachability timeout is set), or eager
    /// navigation does not settle in time.
    pub async fn acquire(config: &SessionConfig) -> HarnessResult<Session> {
        if let Some(timeout) = config.reachability_timeout {
            wait_for_reachable(&config.base_url, timeout).await?;
        }

        let driver = PlaywrightDriver::launch(&DriverConfig {
            browser: config.browser,
            headless: config.headless,
            viewport_width: config.viewport.width,
            viewport_height: config.viewport.height,
            launch_timeout: config.launch_timeout,
            ..DriverConfig::default()
        })
        .await?;

        let session = Session::new(Box::new(driver), config);

        if config.eager_navigation {
            session
                .driver()
                .goto(
                    &config.base_url,
                    crate::driver::NavigationWait::NetworkIdle,
                    config.launch_timeout,
                )
                .await
                .map_err(|e| HarnessError::Launch(format!("initial navigation: {e}")))?;
        }

        info!("session active against {}", config.base_url);
        Ok(session)
    }
}

/// Poll the app over HTTP until it answers or the timeout lapses.
pub async fn wait_for_reachable(base_url: &str, timeout: Duration) -> HarnessResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| HarnessError::Launch(e.to_string()))?;

    let start = std::time::Instant::now();
    let mut attempts = 0usize;

    while start.elapsed() < timeout {
        attempts += 1;
        match client.get(base_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("app reachable after {} attempt(s)", attempts);
                return Ok(());
            }
            Ok(resp) => warn!("reachability probe returned {}", resp.status()),
            Err(e) => {
                if attempts == 1 {
                    info!("waiting for app at {}...", base_url);
                }
                // Connection refused is expected while the app is starting.
                if !e.is_connect() {
                    warn!("reachability probe error: {}", e);
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Err(HarnessError::Launch(format!(
        "app at {} unreachable after {} attempt(s)",
        base_url, attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedDriver;

    fn scripted_session(driver: ScriptedDriver) -> Session {
        Session::new(Box::new(driver), &SessionConfig::default())
    }

    #[tokio::test]
    async fn resize_updates_viewport_and_driver() {
        let mut session = scripted_session(ScriptedDriver::new());
        session.resize(600, 720).await.unwrap();
        assert_eq!(session.viewport(), Viewport { width: 600, height: 720 });
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let mut session = scripted_session(ScriptedDriver::new());
        assert!(session.is_active());
        session.release().await;
        session.release().await;
        assert!(!session.is_active());
    }

    #[test]
    fn absolute_url_joins_relative_paths() {
        let session = scripted_session(ScriptedDriver::new());
        assert_eq!(session.absolute_url("/settings"), "http://localhost:1420/settings");
        assert_eq!(session.absolute_url("settings"), "http://localhost:1420/settings");
        assert_eq!(session.absolute_url("https://other.test/x"), "https://other.test/x");
    }

    #[tokio::test]
    async fn unreachable_app_fails_launch_within_bound() {
        let start = std::time::Instant::now();
        let err = wait_for_reachable("http://127.0.0.1:1", Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Launch(_)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
