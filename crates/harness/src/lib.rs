//! Pagecheck Verification Harness
//!
//! This crate drives scenario-based end-to-end verification of a web
//! application frontend:
//! - Launches isolated browser sessions through a Playwright sidecar
//! - Locates elements through ordered fallback strategy ladders
//! - Parses declarative YAML scenarios
//! - Re-validates assertions across a responsive viewport matrix
//! - Captures screenshot and DOM artifacts at checkpoints and on failure
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Scenario Runner (Rust)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── SessionProvider::acquire() -> Session                │
//! │    ├── executor::execute(step) -> StepOutcome               │
//! │    ├── probe::probe(responsive) -> [ViewportOutcome]        │
//! │    └── ArtifactRecorder (checkpoints, failure capture)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, description, tags                              │
//! │    ├── steps: [Step]                                        │
//! │    │     ├── navigate { url, wait }                         │
//! │    │     ├── click / fill { target: [Strategy], ... }       │
//! │    │     ├── resize { width, height }                       │
//! │    │     ├── wait { ms | condition }                        │
//! │    │     ├── assert { target, expect }                      │
//! │    │     └── screenshot { label }                           │
//! │    ├── cleanup: [Step]                                      │
//! │    └── responsive: { viewports, assertions }                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver (trait)                                         │
//! │    ├── PlaywrightDriver  (Node sidecar, JSON lines)         │
//! │    └── ScriptedDriver    (in-memory, for tests)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod driver;
pub mod error;
pub mod executor;
pub mod locator;
pub mod probe;
pub mod runner;
pub mod scenario;
pub mod scripted;
pub mod session;

pub use error::{HarnessError, HarnessResult};
pub use runner::{Outcome, RunSummary, RunnerConfig, ScenarioRunner};
pub use scenario::{Scenario, Step};
pub use session::{Session, SessionConfig, SessionController};
