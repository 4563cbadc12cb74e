//! Failure and checkpoint artifacts - screenshots and DOM dumps
//!
//! Paths derive deterministically from the scenario name and checkpoint
//! label, so no two scenarios in a run can collide. Failure capture is
//! best-effort by contract: it must never raise a secondary error that
//! masks the diagnostic it was meant to illustrate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::driver::PageDriver;
use crate::error::HarnessResult;

/// A file produced at a labeled checkpoint. Append-only per scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub label: String,
    pub path: PathBuf,
}

pub struct ArtifactRecorder {
    dir: PathBuf,
    seq: usize,
    dom_dumps: bool,
    artifacts: Vec<Artifact>,
}

impl ArtifactRecorder {
    /// Recorder rooted at `<root>/<sanitized scenario name>/`. The directory
    /// is created on first write, not up front.
    pub fn new(root: &Path, scenario: &str) -> Self {
        Self {
            dir: root.join(sanitize(scenario)),
            seq: 0,
            dom_dumps: false,
            artifacts: Vec::new(),
        }
    }

    pub fn with_dom_dumps(mut self, enabled: bool) -> Self {
        self.dom_dumps = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn take_artifacts(&mut self) -> Vec<Artifact> {
        std::mem::take(&mut self.artifacts)
    }

    fn ensure_dir(&self) -> HarnessResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Capture a labeled screenshot (and DOM dump, when enabled).
    pub async fn checkpoint(
        &mut self,
        driver: &dyn PageDriver,
        label: &str,
        full_page: bool,
    ) -> HarnessResult<PathBuf> {
        self.ensure_dir()?;
        self.seq += 1;

        let stem = format!("{:02}-{}", self.seq, sanitize(label));
        let png = self.dir.join(format!("{stem}.png"));
        driver.screenshot(&png, full_page).await?;
        debug!("checkpoint '{}' -> {}", label, png.display());
        self.artifacts.push(Artifact { label: label.to_string(), path: png.clone() });

        if self.dom_dumps {
            let html = self.dir.join(format!("{stem}.html"));
            match driver.dom_snapshot().await {
                Ok(dom) => {
                    std::fs::write(&html, dom)?;
                    self.artifacts.push(Artifact { label: label.to_string(), path: html });
                }
                Err(e) => warn!("DOM dump for '{}' failed: {}", label, e),
            }
        }

        Ok(png)
    }

    /// Best-effort capture after a scenario aborts. The page may be in an
    /// inconsistent state; every capture error is swallowed with a warning.
    pub async fn on_failure(&mut self, driver: &dyn PageDriver, reason: &str) {
        warn!("capturing failure artifacts ({})", reason);

        if let Err(e) = self.ensure_dir() {
            warn!("failure artifact directory unavailable: {}", e);
            return;
        }

        let png = self.dir.join("failure.png");
        match driver.screenshot(&png, false).await {
            Ok(()) => {
                self.artifacts.push(Artifact { label: "failure".to_string(), path: png });
            }
            Err(e) => warn!("failure screenshot failed: {}", e),
        }

        let html = self.dir.join("failure.html");
        match driver.dom_snapshot().await {
            Ok(dom) => {
                if let Err(e) = std::fs::write(&html, dom) {
                    warn!("failure DOM dump failed: {}", e);
                } else {
                    self.artifacts.push(Artifact { label: "failure".to_string(), path: html });
                }
            }
            Err(e) => warn!("failure DOM snapshot failed: {}", e),
        }
    }
}

/// Lowercase, alphanumerics and dashes only.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedDriver;

    #[test]
    fn sanitize_derives_stable_slugs() {
        assert_eq!(sanitize("Responsive Toolbar (600px)"), "responsive-toolbar-600px");
        assert_eq!(sanitize("start page"), "start-page");
        assert_eq!(sanitize("--edge--"), "edge");
    }

    #[tokio::test]
    async fn checkpoints_are_sequenced_and_recorded() {
        let root = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new();
        let mut recorder = ArtifactRecorder::new(root.path(), "start page");

        let first = recorder.checkpoint(&driver, "after load", false).await.unwrap();
        let second = recorder.checkpoint(&driver, "after click", false).await.unwrap();

        assert!(first.ends_with("01-after-load.png"));
        assert!(second.ends_with("02-after-click.png"));
        assert!(first.exists());
        assert_eq!(recorder.artifacts().len(), 2);
        assert!(first.starts_with(root.path().join("start-page")));
    }

    #[tokio::test]
    async fn dom_dumps_accompany_checkpoints_when_enabled() {
        let root = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new().with_dom("<html><body>editor</body></html>");
        let mut recorder = ArtifactRecorder::new(root.path(), "shell").with_dom_dumps(true);

        recorder.checkpoint(&driver, "loaded", false).await.unwrap();

        let html = root.path().join("shell").join("01-loaded.html");
        assert!(html.exists());
        assert!(std::fs::read_to_string(html).unwrap().contains("editor"));
    }

    #[tokio::test]
    async fn failure_capture_never_raises() {
        let root = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new().with_failing_screenshots();
        let mut recorder = ArtifactRecorder::new(root.path(), "broken");

        // Must not panic or propagate even though the screenshot fails.
        recorder.on_failure(&driver, "timed out waiting for: navigation").await;

        // The DOM dump still made it.
        assert!(recorder.artifacts().iter().any(|a| a.label == "failure"));
    }

    #[tokio::test]
    async fn failure_capture_records_screenshot_when_possible() {
        let root = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new();
        let mut recorder = ArtifactRecorder::new(root.path(), "broken");

        recorder.on_failure(&driver, "step timed out").await;

        assert!(root.path().join("broken").join("failure.png").exists());
    }
}
