// src/filter.rs

//! Test-name filter handed to the test runner.
//!
//! The runner receives the filter anchored as `^<filter>$`. Anchoring is
//! textual, so a filter containing top-level alternation (`A|B`) anchors the
//! first and last branch only, exactly as the runner would see it.

use std::fmt;

use regex::Regex;

use crate::errors::{FlakeError, Result};

/// Placeholder substituted into command argument templates.
pub const FILTER_PLACEHOLDER: &str = "{filter}";

/// Pattern used in place of an empty filter.
pub const MATCH_ALL: &str = ".*";

#[derive(Debug, Clone)]
pub struct TestFilter {
    raw: String,
    anchored: Regex,
}

impl TestFilter {
    /// Build a filter from the raw CLI argument. An empty string matches
    /// every test.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let pattern = anchor(&raw);
        let anchored = Regex::new(&pattern).map_err(|e| {
            FlakeError::Usage(format!("invalid test filter {raw:?}: {e}"))
        })?;
        Ok(Self { raw, anchored })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_all(&self) -> bool {
        self.raw.is_empty()
    }

    /// Value substituted for [`FILTER_PLACEHOLDER`].
    pub fn template_value(&self) -> &str {
        if self.raw.is_empty() {
            MATCH_ALL
        } else {
            &self.raw
        }
    }

    /// The full anchored pattern, e.g. `^TestFoo$`.
    pub fn anchored_pattern(&self) -> &str {
        self.anchored.as_str()
    }

    /// Whether a test with this full name would be selected by the runner.
    pub fn matches(&self, test_name: &str) -> bool {
        self.anchored.is_match(test_name)
    }
}

impl fmt::Display for TestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            write!(f, "all tests")
        } else {
            write!(f, "{:?}", self.raw)
        }
    }
}

fn anchor(raw: &str) -> String {
    let body = if raw.is_empty() { MATCH_ALL } else { raw };
    format!("^{body}$")
}
