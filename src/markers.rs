// src/markers.rs

//! Output-line classification.
//!
//! A [`MarkerSet`] is an ordered list of `(label, matcher)` pairs. Drainers
//! run every line through [`MarkerSet::classify`]; the first matching marker
//! decides how (and whether) the line is reported.

use regex::Regex;

#[derive(Debug, Clone)]
pub enum Matcher {
    Contains(String),
    Regex(Regex),
}

impl Matcher {
    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Contains(needle) => line.contains(needle.as_str()),
            Matcher::Regex(re) => re.is_match(line),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Marker {
    pub label: String,
    pub matcher: Matcher,
    /// When set, reported in place of the matching line.
    pub announce: Option<String>,
}

impl Marker {
    pub fn contains(label: &str, needle: &str) -> Self {
        Self {
            label: label.to_string(),
            matcher: Matcher::Contains(needle.to_string()),
            announce: None,
        }
    }

    pub fn with_announce(mut self, text: &str) -> Self {
        self.announce = Some(text.to_string());
        self
    }

    /// Text to report for a line this marker matched.
    pub fn render<'a>(&'a self, line: &'a str) -> &'a str {
        self.announce.as_deref().unwrap_or(line)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkerSet {
    markers: Vec<Marker>,
}

impl MarkerSet {
    pub fn new(markers: Vec<Marker>) -> Self {
        Self { markers }
    }

    /// Markers for `go test -v` output.
    pub fn go_test() -> Self {
        Self::new(vec![
            Marker::contains("no-tests", "testing: warning: no tests to run")
                .with_announce("NO TESTS RUN"),
            Marker::contains("run", "=== RUN"),
            Marker::contains("fail", "--- FAIL"),
            Marker::contains("pass", "--- PASS"),
            Marker::contains("source", "_test.go"),
        ])
    }

    pub fn classify(&self, line: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.matcher.is_match(line))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
