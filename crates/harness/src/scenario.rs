//! Declarative YAML scenario definitions

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::driver::{MouseButton, NavigationWait};
use crate::error::{HarnessError, HarnessResult};
use crate::locator::LocatorSpec;

/// A named, ordered sequence of steps representing one end-to-end check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Tags for filtering.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute strictly in order.
    pub steps: Vec<Step>,

    /// Steps that always run after the scenario, even on failure.
    #[serde(default)]
    pub cleanup: Vec<Step>,

    /// Optional responsive probe run after the steps pass.
    #[serde(default)]
    pub responsive: Option<ResponsiveSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to the session base URL).
    Navigate {
        url: String,
        #[serde(default)]
        wait: NavigationWait,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Click an element.
    Click {
        target: LocatorSpec,
        #[serde(default)]
        button: MouseButton,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fill an input field.
    Fill {
        target: LocatorSpec,
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Change the viewport without tearing down the session.
    Resize { width: u32, height: u32 },

    /// Wait for a fixed duration (last resort) or for a condition.
    Wait {
        #[serde(default)]
        ms: Option<u64>,
        #[serde(default)]
        condition: Option<WaitCondition>,
    },

    /// Assert something about an element.
    Assert {
        target: LocatorSpec,
        expect: ExpectedState,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Take a checkpoint screenshot. Never fails the scenario.
    Screenshot {
        label: String,
        #[serde(default)]
        full_page: bool,
    },
}

impl Step {
    /// Short label used in outcomes and the summary.
    pub fn label(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::Click { target, .. } => format!("click:{}", target),
            Step::Fill { target, .. } => format!("fill:{}", target),
            Step::Resize { width, height } => format!("resize:{}x{}", width, height),
            Step::Wait { ms: Some(ms), .. } => format!("wait:{}ms", ms),
            Step::Wait { condition: Some(c), .. } => format!("wait:{} {}", c.target, c.state),
            Step::Wait { .. } => "wait".to_string(),
            Step::Assert { target, expect, .. } => format!("assert:{} {}", target, expect),
            Step::Screenshot { label, .. } => format!("screenshot:{}", label),
        }
    }
}

/// Condition polled by a `wait` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitCondition {
    pub target: LocatorSpec,
    #[serde(flatten)]
    pub state: ExpectedState,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Expected observable state of a located element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExpectedState {
    Visible,
    Hidden,
    Text { value: String },
    TextContains { value: String },
    Count { value: usize },
}

impl fmt::Display for ExpectedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedState::Visible => write!(f, "visible"),
            ExpectedState::Hidden => write!(f, "hidden"),
            ExpectedState::Text { value } => write!(f, "text='{}'", value),
            ExpectedState::TextContains { value } => write!(f, "text contains '{}'", value),
            ExpectedState::Count { value } => write!(f, "count={}", value),
        }
    }
}

/// One assertion of the responsive probe subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionSpec {
    pub target: LocatorSpec,
    pub expect: ExpectedState,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Viewport matrix re-validated by the responsive probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsiveSpec {
    pub viewports: Vec<Viewport>,
    pub assertions: Vec<AssertionSpec>,
    /// Reflow settle interval after each resize.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    1000
}

impl Scenario {
    /// Parse a scenario from a YAML string.
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| {
            HarnessError::SpecParse(format!("{}: {}", path.display(), e))
        })
    }

    /// Load all scenarios from a directory, in file-name order.
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut scenarios: Vec<Self> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for path in paths {
            let scenario = Self::from_file(&path)?;
            // Artifact directories derive from the name; a duplicate would
            // overwrite its twin's captures.
            if !seen.insert(scenario.name.clone()) {
                return Err(HarnessError::SpecParse(format!(
                    "{}: duplicate scenario name '{}'",
                    path.display(),
                    scenario.name
                )));
            }
            scenarios.push(scenario);
        }
        Ok(scenarios)
    }

    /// Filter scenarios by tag.
    pub fn filter_by_tag(scenarios: Vec<Self>, tag: &str) -> Vec<Self> {
        scenarios
            .into_iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    fn validate(&self) -> HarnessResult<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::SpecParse("scenario name is empty".into()));
        }
        for step in self.steps.iter().chain(self.cleanup.iter()) {
            if let Step::Wait { ms: None, condition: None } = step {
                return Err(HarnessError::SpecParse(format!(
                    "scenario '{}': wait step needs either ms or condition",
                    self.name
                )));
            }
            match step {
                Step::Click { target, .. } | Step::Fill { target, .. } | Step::Assert { target, .. }
                    if target.is_empty() =>
                {
                    return Err(HarnessError::SpecParse(format!(
                        "scenario '{}': step '{}' has an empty locator ladder",
                        self.name,
                        step.label()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Strategy;

    #[test]
    fn parse_simple_scenario() {
        let yaml = r#"
name: start-page
description: The start page renders after hydration
tags:
  - smoke
steps:
  - action: navigate
    url: /
  - action: assert
    target:
      - by: text
        value: "Start Page"
        exact: true
    expect:
      state: visible
  - action: screenshot
    label: start-page
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "start-page");
        assert_eq!(scenario.steps.len(), 3);
        assert!(scenario.responsive.is_none());
    }

    #[test]
    fn parse_responsive_scenario() {
        let yaml = r#"
name: toolbar-overflow
steps:
  - action: navigate
    url: /
  - action: resize
    width: 600
    height: 720
  - action: assert
    target:
      - by: role
        role: button
        name: More
    expect:
      state: visible
responsive:
  viewports:
    - { width: 600, height: 720 }
    - { width: 1280, height: 720 }
  assertions:
    - target:
        - by: text
          value: "Test.tex"
      expect:
        state: visible
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        let responsive = scenario.responsive.unwrap();
        assert_eq!(responsive.viewports.len(), 2);
        assert_eq!(responsive.settle_ms, 1000);
        match &scenario.steps[2] {
            Step::Assert { target, expect, .. } => {
                assert_eq!(
                    target.strategies()[0],
                    Strategy::Role { role: "button".into(), name: Some("More".into()) }
                );
                assert_eq!(*expect, ExpectedState::Visible);
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn wait_step_without_ms_or_condition_is_rejected() {
        let yaml = r#"
name: bad-wait
steps:
  - action: wait
"#;
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn empty_locator_ladder_is_rejected() {
        let yaml = r#"
name: bad-click
steps:
  - action: click
    target: []
"#;
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn step_labels_are_stable() {
        let step = Step::Resize { width: 600, height: 720 };
        assert_eq!(step.label(), "resize:600x720");
    }

    #[test]
    fn duplicate_scenario_names_are_rejected() {
        let yaml = "name: twin\nsteps:\n  - action: navigate\n    url: /\n";
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), yaml).unwrap();
        std::fs::write(dir.path().join("b.yaml"), yaml).unwrap();

        let err = Scenario::load_all(dir.path()).unwrap_err();
        assert!(matches!(err, HarnessError::SpecParse(_)));
        assert!(err.to_string().contains("twin"));
    }

    #[test]
    fn distinct_scenario_names_load_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("02-second.yaml"),
            "name: second\nsteps:\n  - action: navigate\n    url: /\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("01-first.yaml"),
            "name: first\nsteps:\n  - action: navigate\n    url: /\n",
        )
        .unwrap();

        let scenarios = Scenario::load_all(dir.path()).unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn tag_filtering() {
        let yaml = r#"
name: tagged
tags: [responsive]
steps:
  - action: navigate
    url: /
"#;
        let scenarios = vec![Scenario::from_yaml(yaml).unwrap()];
        assert_eq!(Scenario::filter_by_tag(scenarios.clone(), "responsive").len(), 1);
        assert_eq!(Scenario::filter_by_tag(scenarios, "smoke").len(), 0);
    }
}
