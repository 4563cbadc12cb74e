//! Resilient element location
//!
//! A [`LocatorSpec`] is an ordered ladder of strategies for one logical UI
//! target ("the overflow menu button"). Resolution walks the ladder against
//! the live DOM: the first strategy matching exactly one element wins, a
//! strategy matching several is ambiguous and skipped so a later, more
//! specific strategy can disambiguate. The whole ladder re-polls until the
//! timeout, and nothing is ever cached across a navigation or re-render - a
//! stale handle is the dominant source of flaky UI scripts.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::PageDriver;
use crate::error::{HarnessError, HarnessResult};

/// Interval between polls of the strategy ladder.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One way of finding an element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Strategy {
    /// Visible text content.
    Text {
        value: String,
        #[serde(default)]
        exact: bool,
    },
    /// ARIA role, optionally filtered by accessible name.
    Role {
        role: String,
        #[serde(default)]
        name: Option<String>,
    },
    /// Form element by associated label text.
    Label { value: String },
    /// Input by placeholder attribute.
    Placeholder { value: String },
    /// `data-testid` attribute.
    TestId { value: String },
    /// Structural CSS path.
    Css { value: String },
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Text { value, exact: true } => write!(f, "text='{}'", value),
            Strategy::Text { value, exact: false } => write!(f, "text~'{}'", value),
            Strategy::Role { role, name: Some(name) } => {
                write!(f, "role={}[name='{}']", role, name)
            }
            Strategy::Role { role, name: None } => write!(f, "role={}", role),
            Strategy::Label { value } => write!(f, "label='{}'", value),
            Strategy::Placeholder { value } => write!(f, "placeholder='{}'", value),
            Strategy::TestId { value } => write!(f, "testid='{}'", value),
            Strategy::Css { value } => write!(f, "css='{}'", value),
        }
    }
}

/// An ordered, immutable list of candidate strategies for one UI target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LocatorSpec {
    strategies: Vec<Strategy>,
}

impl LocatorSpec {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    /// Start a ladder from visible text.
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(vec![Strategy::Text { value: value.into(), exact: false }])
    }

    /// Start a ladder from exact visible text.
    pub fn exact_text(value: impl Into<String>) -> Self {
        Self::new(vec![Strategy::Text { value: value.into(), exact: true }])
    }

    /// Start a ladder from an ARIA role and accessible name.
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(vec![Strategy::Role { role: role.into(), name: Some(name.into()) }])
    }

    /// Start a ladder from a CSS selector.
    pub fn css(value: impl Into<String>) -> Self {
        Self::new(vec![Strategy::Css { value: value.into() }])
    }

    pub fn or_text(mut self, value: impl Into<String>) -> Self {
        self.strategies.push(Strategy::Text { value: value.into(), exact: false });
        self
    }

    pub fn or_role(mut self, role: impl Into<String>, name: impl Into<String>) -> Self {
        self.strategies.push(Strategy::Role { role: role.into(), name: Some(name.into()) });
        self
    }

    pub fn or_label(mut self, value: impl Into<String>) -> Self {
        self.strategies.push(Strategy::Label { value: value.into() });
        self
    }

    pub fn or_css(mut self, value: impl Into<String>) -> Self {
        self.strategies.push(Strategy::Css { value: value.into() });
        self
    }

    pub fn or_test_id(mut self, value: impl Into<String>) -> Self {
        self.strategies.push(Strategy::TestId { value: value.into() });
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn describe(&self) -> String {
        self.strategies
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for LocatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// The winning strategy of a resolution. Consumed immediately by the action
/// that requested it; never held across another step.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub strategy: Strategy,
}

/// Outcome of a single, non-waiting pass over the ladder.
///
/// Expected absence is a result, not an exception: callers asserting that an
/// element is gone branch on `Absent` instead of catching an error.
#[derive(Debug, Clone)]
pub enum Presence {
    Unique(Strategy),
    /// Every matching strategy matched more than one element.
    Ambiguous,
    Absent,
}

/// Walk the ladder once against the live DOM.
pub async fn lookup(driver: &dyn PageDriver, spec: &LocatorSpec) -> HarnessResult<Presence> {
    let mut saw_ambiguous = false;
    for strategy in spec.strategies() {
        match driver.count(strategy).await? {
            1 => return Ok(Presence::Unique(strategy.clone())),
            0 => {}
            n => {
                debug!("{} matched {} elements, skipping as ambiguous", strategy, n);
                saw_ambiguous = true;
            }
        }
    }
    Ok(if saw_ambiguous {
        Presence::Ambiguous
    } else {
        Presence::Absent
    })
}

/// Resolve a spec to a unique element, re-polling the ladder until `timeout`.
pub async fn resolve(
    driver: &dyn PageDriver,
    spec: &LocatorSpec,
    timeout: Duration,
) -> HarnessResult<Resolved> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Presence::Unique(strategy) = lookup(driver, spec).await? {
            return Ok(Resolved { strategy });
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    Err(HarnessError::ElementNotFound {
        spec: spec.describe(),
        tried: spec.strategies().iter().map(|s| s.to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedDriver;

    fn short() -> Duration {
        Duration::from_millis(250)
    }

    #[tokio::test]
    async fn first_unique_strategy_wins() {
        let driver = ScriptedDriver::new()
            .with_count(&Strategy::Text { value: "More".into(), exact: false }, 1);

        let spec = LocatorSpec::text("More").or_role("button", "More");
        let resolved = resolve(&driver, &spec, short()).await.unwrap();
        assert_eq!(
            resolved.strategy,
            Strategy::Text { value: "More".into(), exact: false }
        );
    }

    #[tokio::test]
    async fn ambiguous_strategy_is_skipped_not_fatal() {
        // The text appears both in a menu item and a tooltip; only the role
        // ladder rung pins it down.
        let role = Strategy::Role { role: "button".into(), name: Some("More".into()) };
        let driver = ScriptedDriver::new()
            .with_count(&Strategy::Text { value: "More".into(), exact: false }, 2)
            .with_count(&role, 1);

        let spec = LocatorSpec::text("More").or_role("button", "More");
        let resolved = resolve(&driver, &spec, short()).await.unwrap();
        assert_eq!(resolved.strategy, role);
    }

    #[tokio::test]
    async fn strategy_order_among_non_matching_rungs_is_irrelevant() {
        let target = Strategy::Css { value: ".overflow-menu".into() };
        let driver = ScriptedDriver::new().with_count(&target, 1);

        let front = LocatorSpec::css(".overflow-menu").or_text("More").or_role("button", "More");
        let back = LocatorSpec::text("More").or_role("button", "More").or_css(".overflow-menu");

        let a = resolve(&driver, &front, short()).await.unwrap();
        let b = resolve(&driver, &back, short()).await.unwrap();
        assert_eq!(a.strategy, target);
        assert_eq!(b.strategy, target);
    }

    #[tokio::test]
    async fn exhausted_ladder_reports_every_strategy_tried() {
        let driver = ScriptedDriver::new()
            .with_count(&Strategy::Text { value: "More".into(), exact: false }, 3);

        let spec = LocatorSpec::text("More").or_css(".missing");
        let err = resolve(&driver, &spec, short()).await.unwrap_err();
        match err {
            HarnessError::ElementNotFound { tried, .. } => {
                assert_eq!(tried.len(), 2);
                assert!(tried[0].contains("More"));
                assert!(tried[1].contains(".missing"));
            }
            other => panic!("expected ElementNotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn resolution_fails_within_timeout_bound() {
        let driver = ScriptedDriver::new();
        let spec = LocatorSpec::text("never-there");

        let start = std::time::Instant::now();
        let err = resolve(&driver, &spec, Duration::from_millis(300)).await.unwrap_err();
        assert!(matches!(err, HarnessError::ElementNotFound { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn late_appearing_element_is_picked_up_by_polling() {
        let target = Strategy::Text { value: "Start Page".into(), exact: true };
        let driver = ScriptedDriver::new().with_count_after_polls(&target, 1, 2);

        let spec = LocatorSpec::exact_text("Start Page");
        let resolved = resolve(&driver, &spec, Duration::from_secs(2)).await.unwrap();
        assert_eq!(resolved.strategy, target);
    }

    #[tokio::test]
    async fn lookup_reports_absence_without_error() {
        let driver = ScriptedDriver::new();
        let spec = LocatorSpec::text("gone");
        assert!(matches!(lookup(&driver, &spec).await.unwrap(), Presence::Absent));
    }

    #[test]
    fn spec_describe_joins_strategies_in_order() {
        let spec = LocatorSpec::text("More").or_role("button", "More").or_css(".fa-gear");
        let described = spec.describe();
        assert!(described.starts_with("text~'More'"));
        assert!(described.ends_with("css='.fa-gear'"));
    }

    #[test]
    fn strategy_yaml_round_trip() {
        let yaml = r#"
- by: text
  value: "Start Page"
  exact: true
- by: role
  role: button
  name: More
- by: css
  value: ".fa-gear, .fa-cog"
"#;
        let spec: LocatorSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.strategies().len(), 3);
        assert_eq!(
            spec.strategies()[0],
            Strategy::Text { value: "Start Page".into(), exact: true }
        );
    }
}
