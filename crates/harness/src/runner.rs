//! Scenario orchestration - fresh session per scenario, guaranteed teardown
//!
//! Scenarios run in declaration order, each against its own session, so a
//! failure in one can never corrupt the starting state of the next. A
//! failing step aborts the remaining steps of its scenario only; cleanup
//! steps and release still run on every exit path.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::artifact::{Artifact, ArtifactRecorder};
use crate::error::HarnessResult;
use crate::executor::{self, StepOutcome};
use crate::probe::{self, ViewportOutcome};
use crate::scenario::Scenario;
use crate::session::{Session, SessionConfig, SessionController};

/// Final outcome of one scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed { reason: String },
    Error { message: String },
}

impl Outcome {
    pub fn passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    pub fn describe(&self) -> String {
        match self {
            Outcome::Passed => "passed".to_string(),
            Outcome::Failed { reason } => format!("failed: {}", reason),
            Outcome::Error { message } => format!("error: {}", message),
        }
    }
}

/// Immutable record of one completed scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub outcome: Outcome,
    pub steps: Vec<StepOutcome>,
    pub probes: Vec<ViewportOutcome>,
    pub artifacts: Vec<Artifact>,
    pub duration_ms: u64,
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub results: Vec<ScenarioResult>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Process exit status: 0 only when every scenario passed.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

/// Hands out isolated sessions, one per scenario.
///
/// The live provider launches a Playwright sidecar; tests substitute a
/// scripted provider.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self, config: &SessionConfig) -> HarnessResult<Session>;
}

/// Live provider backed by the Playwright sidecar.
pub struct PlaywrightSessions;

#[async_trait]
impl SessionProvider for PlaywrightSessions {
    async fn acquire(&self, config: &SessionConfig) -> HarnessResult<Session> {
        SessionController::acquire(config).await
    }
}

/// Configuration for a run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub session: SessionConfig,

    /// Shared artifact root; per-scenario subdirectories keep checkpoint
    /// labels from colliding across scenarios.
    pub artifact_dir: PathBuf,

    /// Where the JSON results file is written.
    pub output_dir: PathBuf,

    /// Capture DOM dumps alongside checkpoint screenshots.
    pub dom_dumps: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            artifact_dir: PathBuf::from("verification/artifacts"),
            output_dir: PathBuf::from("verification"),
            dom_dumps: false,
        }
    }
}

pub struct ScenarioRunner {
    provider: Box<dyn SessionProvider>,
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_provider(config, Box::new(PlaywrightSessions))
    }

    pub fn with_provider(config: RunnerConfig, provider: Box<dyn SessionProvider>) -> Self {
        Self { provider, config }
    }

    /// Run every scenario in declaration order.
    pub async fn run(&self, scenarios: &[Scenario]) -> RunSummary {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        info!("running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(scenario).await;
            if result.outcome.passed() {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!("✗ {} - {}", result.name, result.outcome.describe());
                for artifact in &result.artifacts {
                    info!("  artifact: {}", artifact.path.display());
                }
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "run finished: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        RunSummary {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            started_at,
            results,
        }
    }

    /// Run one scenario against a fresh session.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        info!("scenario: {}", scenario.name);

        let mut recorder = ArtifactRecorder::new(&self.config.artifact_dir, &scenario.name)
            .with_dom_dumps(self.config.dom_dumps);

        let mut session = match self.provider.acquire(&self.config.session).await {
            Ok(session) => session,
            Err(e) => {
                // Launch failure is fatal to this scenario only.
                return ScenarioResult {
                    name: scenario.name.clone(),
                    outcome: Outcome::Error { message: e.to_string() },
                    steps: Vec::new(),
                    probes: Vec::new(),
                    artifacts: Vec::new(),
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        };

        let mut steps = Vec::new();
        let mut outcome = Outcome::Passed;

        for step in &scenario.steps {
            match executor::execute(&mut session, &mut recorder, step).await {
                Ok(step_outcome) => {
                    let failed = !step_outcome.success;
                    if failed {
                        let reason = format!(
                            "{}: {}",
                            step_outcome.step,
                            step_outcome.error.as_deref().unwrap_or("unknown")
                        );
                        steps.push(step_outcome);
                        recorder.on_failure(session.driver(), &reason).await;
                        outcome = Outcome::Failed { reason };
                        break;
                    }
                    steps.push(step_outcome);
                }
                Err(e) => {
                    let message = e.to_string();
                    recorder.on_failure(session.driver(), &message).await;
                    outcome = Outcome::Error { message };
                    break;
                }
            }
        }

        let mut probes = Vec::new();
        if outcome.passed() {
            if let Some(responsive) = &scenario.responsive {
                match probe::probe(&mut session, &mut recorder, responsive).await {
                    Ok(viewport_outcomes) => {
                        if let Some(bad) = viewport_outcomes.iter().find(|o| !o.success) {
                            outcome = Outcome::Failed {
                                reason: format!(
                                    "responsive probe at {}: {}",
                                    bad.viewport,
                                    bad.failures.join("; ")
                                ),
                            };
                        }
                        probes = viewport_outcomes;
                    }
                    Err(e) => {
                        let message = e.to_string();
                        recorder.on_failure(session.driver(), &message).await;
                        outcome = Outcome::Error { message };
                    }
                }
            }
        }

        // Cleanup always runs; its failures are logged, never escalated.
        for step in &scenario.cleanup {
            match executor::execute(&mut session, &mut recorder, step).await {
                Ok(step_outcome) if !step_outcome.success => {
                    warn!(
                        "cleanup step '{}' failed: {}",
                        step_outcome.step,
                        step_outcome.error.as_deref().unwrap_or("unknown")
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("cleanup step errored: {}", e),
            }
        }

        session.release().await;

        ScenarioResult {
            name: scenario.name.clone(),
            outcome,
            steps,
            probes,
            artifacts: recorder.take_artifacts(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Write the run summary as JSON into the output directory.
    pub fn write_results(&self, summary: &RunSummary) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self.config.output_dir.join("results.json");
        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(&path, json)?;
        info!("results written to {}", path.display());
        Ok(path)
    }
}
