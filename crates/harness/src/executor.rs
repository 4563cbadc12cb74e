//! Step execution - each step kind carries its own completion condition
//!
//! Click and fill resolve their target through the locator ladder first and
//! only then act, so "element not found" and "element found but not
//! interactable" stay distinct failures. Assertions report expected versus
//! observed state. Screenshots never fail a scenario. No step retries
//! automatically; retry semantics belong to the scenario author as an
//! explicit bounded wait.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::artifact::ArtifactRecorder;
use crate::driver::PageDriver;
use crate::error::{HarnessError, HarnessResult};
use crate::locator::{self, LocatorSpec, Presence, POLL_INTERVAL};
use crate::scenario::{ExpectedState, Step};
use crate::session::Session;

/// Default bound on navigation settle (the app hydrates after load).
pub const NAVIGATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on resolution plus action for click/fill/assert.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on condition waits.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of executing one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub artifact: Option<PathBuf>,
}

/// Execute one step against the session.
///
/// Step-level failures (not found, not interactable, assertion mismatch,
/// timeout) come back as an unsuccessful outcome; only harness faults
/// propagate as errors.
pub async fn execute(
    session: &mut Session,
    recorder: &mut ArtifactRecorder,
    step: &Step,
) -> HarnessResult<StepOutcome> {
    let start = std::time::Instant::now();
    let label = step.label();
    debug!("step: {}", label);

    let result = run_step(session, recorder, step).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(artifact) => Ok(StepOutcome {
            step: label,
            success: true,
            duration_ms,
            error: None,
            error_kind: None,
            artifact,
        }),
        Err(e) if e.is_step_failure() => {
            warn!("step '{}' failed: {}", label, e);
            Ok(StepOutcome {
                step: label,
                success: false,
                duration_ms,
                error: Some(e.to_string()),
                error_kind: Some(e.kind().to_string()),
                artifact: None,
            })
        }
        Err(e) => Err(e),
    }
}

async fn run_step(
    session: &mut Session,
    recorder: &mut ArtifactRecorder,
    step: &Step,
) -> HarnessResult<Option<PathBuf>> {
    match step {
        Step::Navigate { url, wait, timeout_ms } => {
            let timeout = timeout_or(*timeout_ms, NAVIGATE_TIMEOUT);
            let absolute = session.absolute_url(url);
            session.driver().goto(&absolute, *wait, timeout).await?;
            Ok(None)
        }

        Step::Click { target, button, timeout_ms } => {
            let timeout = timeout_or(*timeout_ms, ACTION_TIMEOUT);
            let resolved = locator::resolve(session.driver(), target, timeout).await?;
            session.driver().click(&resolved.strategy, *button, timeout).await?;
            Ok(None)
        }

        Step::Fill { target, text, timeout_ms } => {
            let timeout = timeout_or(*timeout_ms, ACTION_TIMEOUT);
            let resolved = locator::resolve(session.driver(), target, timeout).await?;
            session.driver().fill(&resolved.strategy, text, timeout).await?;
            Ok(None)
        }

        Step::Resize { width, height } => {
            session.resize(*width, *height).await?;
            Ok(None)
        }

        Step::Wait { ms: Some(ms), .. } => {
            // Fixed sleeps are a last resort for unobservable settling.
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            Ok(None)
        }

        Step::Wait { condition: Some(condition), .. } => {
            let timeout = timeout_or(condition.timeout_ms, WAIT_TIMEOUT);
            wait_for_state(session.driver(), &condition.target, &condition.state, timeout).await?;
            Ok(None)
        }

        Step::Wait { .. } => Err(HarnessError::SpecParse(
            "wait step needs either ms or condition".into(),
        )),

        Step::Assert { target, expect, timeout_ms } => {
            let timeout = timeout_or(*timeout_ms, ACTION_TIMEOUT);
            check_expectation(session.driver(), target, expect, timeout).await?;
            Ok(None)
        }

        Step::Screenshot { label, full_page } => {
            // Capture failures are logged, never fatal.
            match recorder.checkpoint(session.driver(), label, *full_page).await {
                Ok(path) => Ok(Some(path)),
                Err(e) => {
                    warn!("screenshot '{}' failed (non-fatal): {}", label, e);
                    Ok(None)
                }
            }
        }
    }
}

fn timeout_or(override_ms: Option<u64>, default: Duration) -> Duration {
    override_ms.map(Duration::from_millis).unwrap_or(default)
}

/// Poll an expectation until it holds, failing with expected-vs-observed.
pub async fn check_expectation(
    driver: &dyn PageDriver,
    spec: &LocatorSpec,
    expect: &ExpectedState,
    timeout: Duration,
) -> HarnessResult<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match evaluate(driver, spec, expect).await? {
            Ok(()) => return Ok(()),
            Err(observed) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(HarnessError::AssertionFailed {
                        expected: format!("{} {}", spec, expect),
                        observed,
                    });
                }
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Poll a wait condition; expiry is a timeout, not an assertion failure.
pub async fn wait_for_state(
    driver: &dyn PageDriver,
    spec: &LocatorSpec,
    state: &ExpectedState,
    timeout: Duration,
) -> HarnessResult<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if evaluate(driver, spec, state).await?.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(HarnessError::Timeout(format!("{} to become {}", spec, state)));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// One non-waiting evaluation; `Err` carries the observed state description.
async fn evaluate(
    driver: &dyn PageDriver,
    spec: &LocatorSpec,
    expect: &ExpectedState,
) -> HarnessResult<Result<(), String>> {
    match expect {
        ExpectedState::Visible => match locator::lookup(driver, spec).await? {
            Presence::Unique(strategy) => {
                if driver.is_visible(&strategy).await? {
                    Ok(Ok(()))
                } else {
                    Ok(Err("element present but hidden".to_string()))
                }
            }
            Presence::Ambiguous => Ok(Err("every strategy matched ambiguously".to_string())),
            Presence::Absent => Ok(Err("element not found".to_string())),
        },

        ExpectedState::Hidden => match locator::lookup(driver, spec).await? {
            // Absence counts as hidden; expected absence is a result here,
            // not an error to catch.
            Presence::Absent => Ok(Ok(())),
            Presence::Unique(strategy) => {
                if driver.is_visible(&strategy).await? {
                    Ok(Err("element visible".to_string()))
                } else {
                    Ok(Ok(()))
                }
            }
            Presence::Ambiguous => Ok(Err("ambiguous matches still present".to_string())),
        },

        ExpectedState::Text { value } => match locator::lookup(driver, spec).await? {
            Presence::Unique(strategy) => {
                let text = driver.text_of(&strategy).await?;
                if text.trim() == value {
                    Ok(Ok(()))
                } else {
                    Ok(Err(format!("text='{}'", text.trim())))
                }
            }
            Presence::Ambiguous => Ok(Err("every strategy matched ambiguously".to_string())),
            Presence::Absent => Ok(Err("element not found".to_string())),
        },

        ExpectedState::TextContains { value } => match locator::lookup(driver, spec).await? {
            Presence::Unique(strategy) => {
                let text = driver.text_of(&strategy).await?;
                if text.contains(value.as_str()) {
                    Ok(Ok(()))
                } else {
                    Ok(Err(format!("text='{}'", text.trim())))
                }
            }
            Presence::Ambiguous => Ok(Err("every strategy matched ambiguously".to_string())),
            Presence::Absent => Ok(Err("element not found".to_string())),
        },

        ExpectedState::Count { value } => {
            // Count applies to the first rung of the ladder.
            let strategy = match spec.strategies().first() {
                Some(s) => s,
                None => return Err(HarnessError::SpecParse("empty locator ladder".into())),
            };
            let observed = driver.count(strategy).await?;
            if observed == *value {
                Ok(Ok(()))
            } else {
                Ok(Err(format!("count={}", observed)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MouseButton;
    use crate::locator::Strategy;
    use crate::scenario::WaitCondition;
    use crate::scripted::ScriptedDriver;
    use crate::session::SessionConfig;

    fn session(driver: ScriptedDriver) -> Session {
        Session::new(Box::new(driver), &SessionConfig::default())
    }

    fn recorder() -> (tempfile::TempDir, ArtifactRecorder) {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ArtifactRecorder::new(dir.path(), "executor-test");
        (dir, recorder)
    }

    fn fast(ms: u64) -> Option<u64> {
        Some(ms)
    }

    #[tokio::test]
    async fn assert_visible_passes_for_unique_visible_element() {
        let target = Strategy::Text { value: "Start Page".into(), exact: true };
        let mut session = session(ScriptedDriver::new().with_count(&target, 1));
        let (_dir, mut rec) = recorder();

        let step = Step::Assert {
            target: crate::locator::LocatorSpec::exact_text("Start Page"),
            expect: ExpectedState::Visible,
            timeout_ms: fast(200),
        };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn assert_failure_reports_expected_and_observed() {
        let mut session = session(ScriptedDriver::new());
        let (_dir, mut rec) = recorder();

        let step = Step::Assert {
            target: crate::locator::LocatorSpec::exact_text("Start Page"),
            expect: ExpectedState::Visible,
            timeout_ms: fast(200),
        };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("assertion_failed"));
        let error = outcome.error.unwrap();
        assert!(error.contains("visible"));
        assert!(error.contains("not found"));
    }

    #[tokio::test]
    async fn assert_hidden_passes_on_absence() {
        let mut session = session(ScriptedDriver::new());
        let (_dir, mut rec) = recorder();

        let step = Step::Assert {
            target: crate::locator::LocatorSpec::text("gone"),
            expect: ExpectedState::Hidden,
            timeout_ms: fast(200),
        };
        assert!(execute(&mut session, &mut rec, &step).await.unwrap().success);
    }

    #[tokio::test]
    async fn click_falls_through_ambiguous_text_to_role() {
        let text = Strategy::Text { value: "More".into(), exact: false };
        let role = Strategy::Role { role: "button".into(), name: Some("More".into()) };
        let driver =
            std::sync::Arc::new(ScriptedDriver::new().with_count(&text, 2).with_count(&role, 1));

        let mut session = Session::new(Box::new(driver.clone()), &SessionConfig::default());
        let (_dir, mut rec) = recorder();

        let step = Step::Click {
            target: crate::locator::LocatorSpec::text("More").or_role("button", "More"),
            button: MouseButton::Left,
            timeout_ms: fast(300),
        };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(outcome.success);
        // The click landed on the disambiguating rung, not the ambiguous one.
        assert_eq!(driver.clicks(), vec![role.to_string()]);
    }

    #[tokio::test]
    async fn unresolvable_click_is_element_not_found() {
        let mut session = session(ScriptedDriver::new());
        let (_dir, mut rec) = recorder();

        let step = Step::Click {
            target: crate::locator::LocatorSpec::text("nope"),
            button: MouseButton::Left,
            timeout_ms: fast(200),
        };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("element_not_found"));
    }

    #[tokio::test]
    async fn resolved_but_uninteractable_click_is_action_error() {
        let target = Strategy::Css { value: ".covered".into() };
        let driver = ScriptedDriver::new()
            .with_count(&target, 1)
            .with_failing_click(&target, "element is covered by an overlay");
        let mut session = session(driver);
        let (_dir, mut rec) = recorder();

        let step = Step::Click {
            target: crate::locator::LocatorSpec::css(".covered"),
            button: MouseButton::Left,
            timeout_ms: fast(300),
        };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("action"));
    }

    #[tokio::test]
    async fn navigate_timeout_is_a_step_failure_not_a_harness_fault() {
        let mut session = session(ScriptedDriver::new().with_failing_navigation());
        let (_dir, mut rec) = recorder();

        let step = Step::Navigate { url: "/".into(), wait: Default::default(), timeout_ms: fast(200) };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn screenshot_failure_never_fails_the_step() {
        let mut session = session(ScriptedDriver::new().with_failing_screenshots());
        let (_dir, mut rec) = recorder();

        let step = Step::Screenshot { label: "checkpoint".into(), full_page: false };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.artifact.is_none());
    }

    #[tokio::test]
    async fn screenshot_records_artifact_path() {
        let mut session = session(ScriptedDriver::new());
        let (_dir, mut rec) = recorder();

        let step = Step::Screenshot { label: "loaded".into(), full_page: true };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.artifact.unwrap().ends_with("01-loaded.png"));
    }

    #[tokio::test]
    async fn wait_condition_picks_up_late_elements() {
        let target = Strategy::Text { value: "Test.tex".into(), exact: false };
        let driver = ScriptedDriver::new().with_count_after_polls(&target, 1, 2);
        let mut session = session(driver);
        let (_dir, mut rec) = recorder();

        let step = Step::Wait {
            ms: None,
            condition: Some(WaitCondition {
                target: crate::locator::LocatorSpec::text("Test.tex"),
                state: ExpectedState::Visible,
                timeout_ms: Some(2000),
            }),
        };
        assert!(execute(&mut session, &mut rec, &step).await.unwrap().success);
    }

    #[tokio::test]
    async fn wait_condition_expiry_is_a_timeout() {
        let mut session = session(ScriptedDriver::new());
        let (_dir, mut rec) = recorder();

        let step = Step::Wait {
            ms: None,
            condition: Some(WaitCondition {
                target: crate::locator::LocatorSpec::text("never"),
                state: ExpectedState::Visible,
                timeout_ms: Some(200),
            }),
        };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn text_assertion_mismatch_reports_observed_text() {
        let target = Strategy::Css { value: ".title".into() };
        let driver = ScriptedDriver::new().with_text(&target, "Welcome to the editor");
        let mut session = session(driver);
        let (_dir, mut rec) = recorder();

        let step = Step::Assert {
            target: crate::locator::LocatorSpec::css(".title"),
            expect: ExpectedState::Text { value: "Start Page".into() },
            timeout_ms: fast(200),
        };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Welcome to the editor"));
    }

    #[tokio::test]
    async fn count_assertion_matches_first_rung() {
        let target = Strategy::Css { value: ".tab".into() };
        let driver = ScriptedDriver::new().with_count(&target, 3);
        let mut session = session(driver);
        let (_dir, mut rec) = recorder();

        let step = Step::Assert {
            target: crate::locator::LocatorSpec::css(".tab"),
            expect: ExpectedState::Count { value: 3 },
            timeout_ms: fast(200),
        };
        assert!(execute(&mut session, &mut rec, &step).await.unwrap().success);
    }

    #[tokio::test]
    async fn fill_resolves_then_writes() {
        let target = Strategy::Role { role: "textbox".into(), name: Some("Font Family".into()) };
        let driver = std::sync::Arc::new(ScriptedDriver::new().with_count(&target, 1));
        let mut session = Session::new(Box::new(driver.clone()), &SessionConfig::default());
        let (_dir, mut rec) = recorder();

        let step = Step::Fill {
            target: crate::locator::LocatorSpec::role("textbox", "Font Family"),
            text: "Fira Code".into(),
            timeout_ms: fast(300),
        };
        let outcome = execute(&mut session, &mut rec, &step).await.unwrap();
        assert!(outcome.success);
        assert_eq!(driver.fills(), vec![(target.to_string(), "Fira Code".to_string())]);
    }
}
