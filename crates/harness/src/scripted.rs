//! Scripted in-memory driver for tests
//!
//! Stands in for the Playwright sidecar so locator, executor, probe and
//! runner logic can be exercised deterministically, without a browser.
//! Programmed with per-strategy match counts, visibility and text; supports
//! late-appearing elements, viewport-dependent visibility and click-revealed
//! state so tests can model hydration, responsive overflow and panels.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{MouseButton, NavigationWait, PageDriver};
use crate::error::{HarnessError, HarnessResult};
use crate::locator::Strategy;

#[derive(Default)]
struct State {
    width: u32,
    height: u32,
    counts: HashMap<String, usize>,
    visible: HashMap<String, bool>,
    texts: HashMap<String, String>,
    // Element exists but is only visible while the viewport width is in range.
    visible_widths: HashMap<String, (u32, u32)>,
    // Strategy reports zero matches for the first N count() calls.
    pending_polls: HashMap<String, usize>,
    // Clicking the key strategy makes the value strategy present and visible.
    reveals: HashMap<String, String>,
    failing_clicks: HashMap<String, String>,
    fail_navigation: bool,
    fail_screenshots: bool,
    dom: String,

    navigations: Vec<String>,
    clicks: Vec<String>,
    fills: Vec<(String, String)>,
    resizes: Vec<(u32, u32)>,
    screenshots: Vec<PathBuf>,
    closed: bool,
}

pub struct ScriptedDriver {
    state: Mutex<State>,
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                width: 1280,
                height: 720,
                dom: "<html><body></body></html>".to_string(),
                ..State::default()
            }),
        }
    }

    fn key(strategy: &Strategy) -> String {
        strategy.to_string()
    }

    pub fn with_count(self, strategy: &Strategy, count: usize) -> Self {
        self.state.lock().unwrap().counts.insert(Self::key(strategy), count);
        self
    }

    /// The strategy matches nothing for the first `polls` count() calls.
    pub fn with_count_after_polls(self, strategy: &Strategy, count: usize, polls: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.counts.insert(Self::key(strategy), count);
            state.pending_polls.insert(Self::key(strategy), polls);
        }
        self
    }

    pub fn with_visible(self, strategy: &Strategy, visible: bool) -> Self {
        self.state.lock().unwrap().visible.insert(Self::key(strategy), visible);
        self
    }

    pub fn with_text(self, strategy: &Strategy, text: impl Into<String>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.counts.entry(Self::key(strategy)).or_insert(1);
            state.texts.insert(Self::key(strategy), text.into());
        }
        self
    }

    /// Element always present, visible only while the viewport width is
    /// within `[min_width, max_width]`.
    pub fn with_visible_between(self, strategy: &Strategy, min_width: u32, max_width: u32) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.counts.insert(Self::key(strategy), 1);
            state.visible_widths.insert(Self::key(strategy), (min_width, max_width));
        }
        self
    }

    /// Clicking `trigger` makes `revealed` present and visible.
    pub fn with_click_revealing(self, trigger: &Strategy, revealed: &Strategy) -> Self {
        self.state
            .lock()
            .unwrap()
            .reveals
            .insert(Self::key(trigger), Self::key(revealed));
        self
    }

    pub fn with_failing_click(self, strategy: &Strategy, message: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_clicks
            .insert(Self::key(strategy), message.into());
        self
    }

    pub fn with_failing_navigation(self) -> Self {
        self.state.lock().unwrap().fail_navigation = true;
        self
    }

    pub fn with_failing_screenshots(self) -> Self {
        self.state.lock().unwrap().fail_screenshots = true;
        self
    }

    pub fn with_dom(self, dom: impl Into<String>) -> Self {
        self.state.lock().unwrap().dom = dom.into();
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().fills.clone()
    }

    pub fn resizes(&self) -> Vec<(u32, u32)> {
        self.state.lock().unwrap().resizes.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().screenshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn goto(&self, url: &str, _wait: NavigationWait, _timeout: Duration) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        if state.fail_navigation {
            return Err(HarnessError::Timeout(format!("navigation to {url}")));
        }
        Ok(())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        state.width = width;
        state.height = height;
        state.resizes.push((width, height));
        Ok(())
    }

    async fn count(&self, strategy: &Strategy) -> HarnessResult<usize> {
        let key = Self::key(strategy);
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.pending_polls.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(0);
            }
        }
        Ok(state.counts.get(&key).copied().unwrap_or(0))
    }

    async fn click(
        &self,
        strategy: &Strategy,
        _button: MouseButton,
        _timeout: Duration,
    ) -> HarnessResult<()> {
        let key = Self::key(strategy);
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.failing_clicks.get(&key) {
            return Err(HarnessError::Action(message.clone()));
        }
        state.clicks.push(key.clone());
        if let Some(revealed) = state.reveals.get(&key).cloned() {
            state.counts.insert(revealed.clone(), 1);
            state.visible.insert(revealed, true);
        }
        Ok(())
    }

    async fn fill(&self, strategy: &Strategy, text: &str, _timeout: Duration) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        state.fills.push((Self::key(strategy), text.to_string()));
        Ok(())
    }

    async fn is_visible(&self, strategy: &Strategy) -> HarnessResult<bool> {
        let key = Self::key(strategy);
        let state = self.state.lock().unwrap();
        if let Some((min, max)) = state.visible_widths.get(&key) {
            return Ok(state.width >= *min && state.width <= *max);
        }
        if let Some(visible) = state.visible.get(&key) {
            return Ok(*visible);
        }
        Ok(state.counts.get(&key).copied().unwrap_or(0) > 0)
    }

    async fn text_of(&self, strategy: &Strategy) -> HarnessResult<String> {
        let state = self.state.lock().unwrap();
        Ok(state.texts.get(&Self::key(strategy)).cloned().unwrap_or_default())
    }

    async fn screenshot(&self, path: &Path, _full_page: bool) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_screenshots {
            return Err(HarnessError::Driver("screenshot capture refused".to_string()));
        }
        // Minimal PNG magic so artifact tests see a real file.
        std::fs::write(path, b"\x89PNG\r\n\x1a\n")?;
        state.screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn dom_snapshot(&self) -> HarnessResult<String> {
        Ok(self.state.lock().unwrap().dom.clone())
    }

    async fn close(&self) -> HarnessResult<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}
