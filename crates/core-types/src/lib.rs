//! Shared vocabulary for the holdfast engine and its driver backends.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default deadline for waits and retried operations.
pub const DEFAULT_TTL: Duration = Duration::from_secs(20);

/// Default pause between poll attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Opaque reference to one element in the automated target.
///
/// Only the driver that minted a reference can interpret it, and only until
/// the underlying document changes out from under it. The engine treats the
/// payload as an identity and nothing more.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How to address elements. Interpreted by the driver, opaque to the engine.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// CSS selector.
    Css(String),
    /// XPath expression.
    XPath(String),
    /// Anchor text, matched exactly or as a substring.
    LinkText { text: String, exact: bool },
}

impl Selector {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    pub fn link_text(text: impl Into<String>, exact: bool) -> Self {
        Self::LinkText {
            text: text.into(),
            exact,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css:{}", s),
            Selector::XPath(x) => write!(f, "xpath:{}", x),
            Selector::LinkText { text, exact } => {
                let mode = if *exact { "exact" } else { "partial" };
                write!(f, "link:{}:'{}'", mode, text)
            }
        }
    }
}

impl From<&str> for Selector {
    fn from(selector: &str) -> Self {
        Self::Css(selector.to_string())
    }
}

impl From<String> for Selector {
    fn from(selector: String) -> Self {
        Self::Css(selector)
    }
}

/// Deadline policy: how long to keep trying, and how long to pause between
/// attempts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    pub ttl: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WaitConfig {
    pub fn new(ttl: Duration, poll_interval: Duration) -> Self {
        Self { ttl, poll_interval }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Options accepted by the sub-query operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    /// Block until the query yields at least one match, bounded by the wait
    /// policy.
    pub wait: bool,
    /// Keep only elements the driver reports as displayed.
    pub only_displayed: bool,
    /// Wait policy override for this query only.
    pub wait_config: Option<WaitConfig>,
}

impl FindOptions {
    pub fn waiting() -> Self {
        Self {
            wait: true,
            ..Self::default()
        }
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_only_displayed(mut self, only_displayed: bool) -> Self {
        self.only_displayed = only_displayed;
        self
    }

    pub fn with_wait_config(mut self, wait_config: WaitConfig) -> Self {
        self.wait_config = Some(wait_config);
        self
    }
}

/// Which option of a select element to address.
///
/// At most one form may be supplied. Absence is `None`: index 0 is a
/// legitimate first-option index and never means "not supplied".
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SelectSpec {
    pub text: Option<String>,
    pub value: Option<String>,
    pub index: Option<usize>,
}

impl SelectSpec {
    /// No form supplied. Valid only for "deselect all".
    pub fn none() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn index(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    /// Number of forms supplied.
    pub fn supplied(&self) -> usize {
        self.text.is_some() as usize + self.value.is_some() as usize + self.index.is_some() as usize
    }
}

/// A validated single-form choice handed to drivers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectChoice {
    Text(String),
    Value(String),
    Index(usize),
}

impl fmt::Display for SelectChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectChoice::Text(t) => write!(f, "text:'{}'", t),
            SelectChoice::Value(v) => write!(f, "value:'{}'", v),
            SelectChoice::Index(i) => write!(f, "index:{}", i),
        }
    }
}

/// Element geometry in page coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

/// Where to scroll the page viewport.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollTarget {
    Top,
    Bottom,
    To { x: i64, y: i64 },
}

impl fmt::Display for ScrollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollTarget::Top => write!(f, "top"),
            ScrollTarget::Bottom => write!(f, "bottom"),
            ScrollTarget::To { x, y } => write!(f, "({}, {})", x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_display_is_kind_prefixed() {
        assert_eq!(Selector::css("div.item").to_string(), "css:div.item");
        assert_eq!(Selector::xpath("//a[2]").to_string(), "xpath://a[2]");
        assert_eq!(
            Selector::link_text("Sign in", true).to_string(),
            "link:exact:'Sign in'"
        );
        assert_eq!(
            Selector::link_text("Sign", false).to_string(),
            "link:partial:'Sign'"
        );
    }

    #[test]
    fn bare_strings_become_css_selectors() {
        let selector: Selector = "button.primary".into();
        assert_eq!(selector, Selector::Css("button.primary".to_string()));
    }

    #[test]
    fn wait_config_defaults_are_documented_constants() {
        let config = WaitConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(20));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn select_spec_counts_supplied_forms() {
        assert_eq!(SelectSpec::none().supplied(), 0);
        assert_eq!(SelectSpec::text("one").supplied(), 1);
        assert_eq!(SelectSpec::index(0).supplied(), 1);

        let two = SelectSpec {
            text: Some("one".into()),
            index: Some(0),
            ..SelectSpec::default()
        };
        assert_eq!(two.supplied(), 2);
    }

    #[test]
    fn index_zero_is_supplied_not_absent() {
        let spec = SelectSpec::index(0);
        assert_eq!(spec.index, Some(0));
        assert_eq!(spec.supplied(), 1);
    }
}
