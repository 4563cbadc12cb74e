//! Responsive probe - re-validate assertions across a viewport matrix
//!
//! Viewports are probed smallest to largest, sequentially, on the one live
//! session. Probing on a single session is deliberate: it checks that
//! application state established before a resize survives the resize, which
//! parallel per-viewport sessions would never catch.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::artifact::ArtifactRecorder;
use crate::error::HarnessResult;
use crate::executor::{self, ACTION_TIMEOUT};
use crate::scenario::{ResponsiveSpec, Viewport};
use crate::session::Session;

/// Outcome of the assertion subset at one viewport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportOutcome {
    pub viewport: Viewport,
    pub success: bool,
    pub failures: Vec<String>,
    pub artifact: Option<PathBuf>,
}

/// Run the assertion subset at every viewport of the matrix.
pub async fn probe(
    session: &mut Session,
    recorder: &mut ArtifactRecorder,
    spec: &ResponsiveSpec,
) -> HarnessResult<Vec<ViewportOutcome>> {
    // Smallest first, mirroring real responsive breakpoints.
    let mut viewports = spec.viewports.clone();
    viewports.sort();

    let settle = Duration::from_millis(spec.settle_ms);
    let mut outcomes = Vec::with_capacity(viewports.len());

    for viewport in viewports {
        session.resize(viewport.width, viewport.height).await?;
        // One settle interval for layout reflow; resize completion is not
        // otherwise observable.
        tokio::time::sleep(settle).await;

        let mut failures = Vec::new();
        for assertion in &spec.assertions {
            let timeout = assertion
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(ACTION_TIMEOUT);
            match executor::check_expectation(
                session.driver(),
                &assertion.target,
                &assertion.expect,
                timeout,
            )
            .await
            {
                Ok(()) => {}
                Err(e) if e.is_step_failure() => failures.push(e.to_string()),
                Err(e) => return Err(e),
            }
        }

        let label = format!("probe-{}", viewport);
        let artifact = match recorder.checkpoint(session.driver(), &label, false).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("probe screenshot at {} failed (non-fatal): {}", viewport, e);
                None
            }
        };

        if failures.is_empty() {
            debug!("probe {} passed", viewport);
        } else {
            warn!("probe {} failed: {}", viewport, failures.join("; "));
        }

        outcomes.push(ViewportOutcome {
            viewport,
            success: failures.is_empty(),
            failures,
            artifact,
        });
    }

    Ok(outcomes)
}
