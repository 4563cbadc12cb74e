//! Browser bridge - a persistent Playwright sidecar driven over stdio
//!
//! The live driver writes a small Node.js script to a temp directory, spawns
//! it under `node`, and exchanges one JSON line per command. The page, context
//! and browser live inside the sidecar for the whole session, so application
//! state survives across steps and viewport resizes.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::locator::Strategy;

/// Default per-command timeout for driver round trips.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }
}

/// How a navigation decides it has settled.
///
/// The application under test hydrates client-side after the initial
/// document load, so `NetworkIdle` is the default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavigationWait {
    #[default]
    NetworkIdle,
    Load,
    DomContentLoaded,
}

impl NavigationWait {
    fn as_playwright(&self) -> &'static str {
        match self {
            NavigationWait::NetworkIdle => "networkidle",
            NavigationWait::Load => "load",
            NavigationWait::DomContentLoaded => "domcontentloaded",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn as_playwright(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// The seam between the harness and the browser.
///
/// The live implementation talks to Playwright; tests substitute
/// [`crate::scripted::ScriptedDriver`]. Every method queries the live DOM at
/// call time - nothing behind this trait caches element identity.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, wait: NavigationWait, timeout: Duration) -> HarnessResult<()>;

    async fn set_viewport(&self, width: u32, height: u32) -> HarnessResult<()>;

    /// Number of elements the strategy matches right now.
    async fn count(&self, strategy: &Strategy) -> HarnessResult<usize>;

    async fn click(
        &self,
        strategy: &Strategy,
        button: MouseButton,
        timeout: Duration,
    ) -> HarnessResult<()>;

    async fn fill(&self, strategy: &Strategy, text: &str, timeout: Duration) -> HarnessResult<()>;

    async fn is_visible(&self, strategy: &Strategy) -> HarnessResult<bool>;

    async fn text_of(&self, strategy: &Strategy) -> HarnessResult<String>;

    async fn screenshot(&self, path: &Path, full_page: bool) -> HarnessResult<()>;

    /// Serialized HTML of the current document, for failure artifacts.
    async fn dom_snapshot(&self) -> HarnessResult<String>;

    async fn close(&self) -> HarnessResult<()>;
}

// Shared handles delegate, so a session can own a driver that a test (or a
// provider) still observes.
#[async_trait]
impl<T: PageDriver + ?Sized> PageDriver for std::sync::Arc<T> {
    async fn goto(&self, url: &str, wait: NavigationWait, timeout: Duration) -> HarnessResult<()> {
        (**self).goto(url, wait, timeout).await
    }

    async fn set_viewport(&self, width: u32, height: u32) -> HarnessResult<()> {
        (**self).set_viewport(width, height).await
    }

    async fn count(&self, strategy: &Strategy) -> HarnessResult<usize> {
        (**self).count(strategy).await
    }

    async fn click(
        &self,
        strategy: &Strategy,
        button: MouseButton,
        timeout: Duration,
    ) -> HarnessResult<()> {
        (**self).click(strategy, button, timeout).await
    }

    async fn fill(&self, strategy: &Strategy, text: &str, timeout: Duration) -> HarnessResult<()> {
        (**self).fill(strategy, text, timeout).await
    }

    async fn is_visible(&self, strategy: &Strategy) -> HarnessResult<bool> {
        (**self).is_visible(strategy).await
    }

    async fn text_of(&self, strategy: &Strategy) -> HarnessResult<String> {
        (**self).text_of(strategy).await
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> HarnessResult<()> {
        (**self).screenshot(path, full_page).await
    }

    async fn dom_snapshot(&self) -> HarnessResult<String> {
        (**self).dom_snapshot().await
    }

    async fn close(&self) -> HarnessResult<()> {
        (**self).close().await
    }
}

/// Configuration for launching the live driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub launch_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            launch_timeout: Duration::from_secs(30),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

struct Bridge {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// Live Playwright-backed driver.
pub struct PlaywrightDriver {
    bridge: Mutex<Bridge>,
    command_timeout: Duration,
    // Holds the sidecar script on disk for the lifetime of the driver.
    _workdir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Spawn the sidecar and launch an isolated browser context.
    pub async fn launch(config: &DriverConfig) -> HarnessResult<Self> {
        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_JS)?;

        debug!("Spawning Playwright sidecar: {}", script_path.display());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::Launch(format!(
                    "failed to spawn node: {}. Playwright must be installed (npx playwright install)",
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::Launch("sidecar stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Launch("sidecar stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("sidecar: {}", line);
                }
            });
        }

        let driver = Self {
            bridge: Mutex::new(Bridge {
                child,
                stdin,
                lines: BufReader::new(stdout).lines(),
                next_id: 0,
            }),
            command_timeout: config.command_timeout,
            _workdir: workdir,
        };

        driver
            .request(
                "launch",
                json!({
                    "browser": config.browser.as_str(),
                    "headless": config.headless,
                    "width": config.viewport_width,
                    "height": config.viewport_height,
                }),
                config.launch_timeout,
            )
            .await
            .map_err(|e| HarnessError::Launch(e.to_string()))?;

        Ok(driver)
    }

    /// Send one command and wait for the matching response line.
    ///
    /// Commands are strictly sequential - the bridge lock holds until the
    /// sidecar answers or the timeout lapses.
    async fn request(
        &self,
        cmd: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> HarnessResult<serde_json::Value> {
        let mut bridge = self.bridge.lock().await;
        bridge.next_id += 1;
        let id = bridge.next_id;

        let mut message = params;
        if let Some(obj) = message.as_object_mut() {
            obj.insert("id".into(), json!(id));
            obj.insert("cmd".into(), json!(cmd));
        }
        let line = serde_json::to_string(&message)?;

        debug!("driver -> {}", line);
        bridge.stdin.write_all(line.as_bytes()).await?;
        bridge.stdin.write_all(b"\n").await?;
        bridge.stdin.flush().await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let next = tokio::time::timeout(remaining, bridge.lines.next_line())
                .await
                .map_err(|_| HarnessError::Timeout(format!("driver command '{}'", cmd)))?;

            let line = next?.ok_or_else(|| {
                HarnessError::Driver("sidecar closed its output stream".to_string())
            })?;

            let value: serde_json::Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(_) => {
                    debug!("sidecar noise: {}", line);
                    continue;
                }
            };

            if value.get("id").and_then(|v| v.as_u64()) != Some(id) {
                continue;
            }

            if value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
                return Ok(value.get("data").cloned().unwrap_or(serde_json::Value::Null));
            }

            let message = value
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown driver error")
                .to_string();
            return Err(classify_error(cmd, message));
        }
    }
}

/// Map a sidecar error string onto the harness taxonomy.
///
/// A click or fill only runs after resolution confirmed a unique match, so
/// any failure there means the element was not interactable at action time.
fn classify_error(cmd: &str, message: String) -> HarnessError {
    let timed_out = message.contains("Timeout") || message.contains("timeout");
    match cmd {
        "click" | "fill" => HarnessError::Action(message),
        "goto" if timed_out => HarnessError::Timeout(message),
        _ => HarnessError::Driver(message),
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn goto(&self, url: &str, wait: NavigationWait, timeout: Duration) -> HarnessResult<()> {
        self.request(
            "goto",
            json!({
                "url": url,
                "wait_until": wait.as_playwright(),
                "timeout": timeout.as_millis() as u64,
            }),
            timeout + Duration::from_secs(1),
        )
        .await?;
        Ok(())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> HarnessResult<()> {
        self.request(
            "set_viewport",
            json!({ "width": width, "height": height }),
            self.command_timeout,
        )
        .await?;
        Ok(())
    }

    async fn count(&self, strategy: &Strategy) -> HarnessResult<usize> {
        let data = self
            .request(
                "count",
                json!({ "strategy": strategy }),
                self.command_timeout,
            )
            .await?;
        Ok(data.as_u64().unwrap_or(0) as usize)
    }

    async fn click(
        &self,
        strategy: &Strategy,
        button: MouseButton,
        timeout: Duration,
    ) -> HarnessResult<()> {
        self.request(
            "click",
            json!({
                "strategy": strategy,
                "button": button.as_playwright(),
                "timeout": timeout.as_millis() as u64,
            }),
            timeout + Duration::from_secs(1),
        )
        .await?;
        Ok(())
    }

    async fn fill(&self, strategy: &Strategy, text: &str, timeout: Duration) -> HarnessResult<()> {
        self.request(
            "fill",
            json!({
                "strategy": strategy,
                "text": text,
                "timeout": timeout.as_millis() as u64,
            }),
            timeout + Duration::from_secs(1),
        )
        .await?;
        Ok(())
    }

    async fn is_visible(&self, strategy: &Strategy) -> HarnessResult<bool> {
        let data = self
            .request(
                "visible",
                json!({ "strategy": strategy }),
                self.command_timeout,
            )
            .await?;
        Ok(data.as_bool().unwrap_or(false))
    }

    async fn text_of(&self, strategy: &Strategy) -> HarnessResult<String> {
        let data = self
            .request("text", json!({ "strategy": strategy }), self.command_timeout)
            .await?;
        Ok(data.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> HarnessResult<()> {
        self.request(
            "screenshot",
            json!({
                "path": path.to_string_lossy(),
                "full_page": full_page,
            }),
            self.command_timeout,
        )
        .await?;
        Ok(())
    }

    async fn dom_snapshot(&self) -> HarnessResult<String> {
        let data = self.request("dom", json!({}), self.command_timeout).await?;
        Ok(data.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> HarnessResult<()> {
        // Polite shutdown first, then the signal ladder.
        let _ = self
            .request("shutdown", json!({}), Duration::from_secs(5))
            .await;

        let mut bridge = self.bridge.lock().await;

        #[cfg(unix)]
        if let Some(pid) = bridge.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }

        match tokio::time::timeout(Duration::from_secs(2), bridge.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = bridge.child.start_kill();
                let _ = bridge.child.wait().await;
            }
        }

        Ok(())
    }
}

/// The Node.js sidecar. One JSON command per stdin line, one JSON response
/// per stdout line: `{id, ok, data?}` or `{id, ok: false, error}`.
const DRIVER_JS: &str = r#"
const readline = require('readline');
const { chromium, firefox, webkit } = require('playwright');

const engines = { chromium, firefox, webkit };

let browser = null;
let context = null;
let page = null;

function locatorFor(s) {
  switch (s.by) {
    case 'text':
      return page.getByText(s.value, { exact: !!s.exact });
    case 'role':
      return s.name ? page.getByRole(s.role, { name: s.name }) : page.getByRole(s.role);
    case 'label':
      return page.getByLabel(s.value);
    case 'placeholder':
      return page.getByPlaceholder(s.value);
    case 'test_id':
      return page.getByTestId(s.value);
    case 'css':
      return page.locator(s.value);
    default:
      throw new Error(`unknown strategy kind: ${s.by}`);
  }
}

async function dispatch(msg) {
  switch (msg.cmd) {
    case 'launch': {
      const engine = engines[msg.browser] || chromium;
      browser = await engine.launch({ headless: !!msg.headless });
      context = await browser.newContext({
        viewport: { width: msg.width, height: msg.height },
      });
      page = await context.newPage();
      return null;
    }
    case 'goto':
      await page.goto(msg.url, { waitUntil: msg.wait_until, timeout: msg.timeout });
      return null;
    case 'set_viewport':
      await page.setViewportSize({ width: msg.width, height: msg.height });
      return null;
    case 'count':
      return await locatorFor(msg.strategy).count();
    case 'click':
      await locatorFor(msg.strategy).click({ button: msg.button, timeout: msg.timeout });
      return null;
    case 'fill':
      await locatorFor(msg.strategy).fill(msg.text, { timeout: msg.timeout });
      return null;
    case 'visible':
      return await locatorFor(msg.strategy).isVisible();
    case 'text':
      return (await locatorFor(msg.strategy).textContent()) || '';
    case 'screenshot':
      await page.screenshot({ path: msg.path, fullPage: !!msg.full_page });
      return null;
    case 'dom':
      return await page.content();
    case 'shutdown':
      if (browser) await browser.close();
      process.exit(0);
    default:
      throw new Error(`unknown command: ${msg.cmd}`);
  }
}

const rl = readline.createInterface({ input: process.stdin });
rl.on('line', async (line) => {
  let msg;
  try {
    msg = JSON.parse(line);
  } catch (e) {
    return;
  }
  try {
    const data = await dispatch(msg);
    process.stdout.write(JSON.stringify({ id: msg.id, ok: true, data }) + '\n');
  } catch (e) {
    process.stdout.write(JSON.stringify({ id: msg.id, ok: false, error: e.message }) + '\n');
  }
});

rl.on('close', async () => {
  if (browser) await browser.close();
  process.exit(0);
});
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_parse_defaults_to_chromium() {
        assert_eq!(Browser::parse("firefox"), Browser::Firefox);
        assert_eq!(Browser::parse("webkit"), Browser::Webkit);
        assert_eq!(Browser::parse("anything-else"), Browser::Chromium);
    }

    #[test]
    fn click_errors_classify_as_action() {
        let err = classify_error("click", "Timeout 5000ms exceeded".into());
        assert!(matches!(err, HarnessError::Action(_)));
    }

    #[test]
    fn goto_timeouts_classify_as_timeout() {
        let err = classify_error("goto", "Timeout 30000ms exceeded".into());
        assert!(matches!(err, HarnessError::Timeout(_)));
    }

    #[test]
    fn unknown_errors_classify_as_driver() {
        let err = classify_error("count", "protocol error".into());
        assert!(matches!(err, HarnessError::Driver(_)));
    }
}
