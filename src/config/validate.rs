// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use crate::config::model::{MarkerSection, RawConfigFile, Settings};
use crate::errors::{FlakeError, Result};
use crate::exec::CommandSpec;
use crate::filter::FILTER_PLACEHOLDER;
use crate::markers::{Marker, MarkerSet, Matcher};

impl TryFrom<RawConfigFile> for Settings {
    type Error = FlakeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let round_timeout = parse_positive_duration("round.timeout", &raw.round.timeout)?;
        let drain_grace = parse_positive_duration("round.drain_grace", &raw.round.drain_grace)?;
        let kill_grace = parse_positive_duration("round.kill_grace", &raw.round.kill_grace)?;

        if raw.round.log_path.file_name().is_none() {
            return Err(FlakeError::Config(format!(
                "[round].log_path must name a file (got {:?})",
                raw.round.log_path
            )));
        }

        let command = validate_command(raw.command)?;
        let markers = match raw.marker {
            Some(sections) => build_markers(sections)?,
            None => MarkerSet::go_test(),
        };

        Ok(Settings {
            round_timeout,
            drain_grace,
            kill_grace,
            log_path: raw.round.log_path,
            command,
            markers,
        })
    }
}

fn validate_command(section: crate::config::model::CommandSection) -> Result<CommandSpec> {
    if section.program.trim().is_empty() {
        return Err(FlakeError::Config(
            "[command].program must not be empty".to_string(),
        ));
    }

    if !section.args.iter().any(|a| a.contains(FILTER_PLACEHOLDER)) {
        warn!(
            args = ?section.args,
            "[command].args has no {FILTER_PLACEHOLDER} placeholder; the test filter will be ignored"
        );
    }

    let mut spec = CommandSpec::new(section.program, section.args);
    if let Some(dir) = section.working_dir {
        spec = spec.working_dir(dir);
    }
    Ok(spec)
}

fn build_markers(sections: Vec<MarkerSection>) -> Result<MarkerSet> {
    let mut seen = HashSet::new();
    let mut markers = Vec::with_capacity(sections.len());

    for section in sections {
        if section.label.trim().is_empty() {
            return Err(FlakeError::Config(
                "[[marker]] entries need a non-empty label".to_string(),
            ));
        }
        if !seen.insert(section.label.clone()) {
            return Err(FlakeError::Config(format!(
                "duplicate marker label '{}'",
                section.label
            )));
        }

        let matcher = match (section.contains, section.regex) {
            (Some(needle), None) => Matcher::Contains(needle),
            (None, Some(pattern)) => Matcher::Regex(Regex::new(&pattern).map_err(|e| {
                FlakeError::Config(format!(
                    "marker '{}' has an invalid regex: {e}",
                    section.label
                ))
            })?),
            _ => {
                return Err(FlakeError::Config(format!(
                    "marker '{}' must set exactly one of `contains` or `regex`",
                    section.label
                )));
            }
        };

        markers.push(Marker {
            label: section.label,
            matcher,
            announce: section.announce,
        });
    }

    Ok(MarkerSet::new(markers))
}

fn parse_positive_duration(key: &str, value: &str) -> Result<Duration> {
    let dur = parse_duration(value)
        .map_err(|e| FlakeError::Config(format!("invalid {key}: {e}")))?;
    if dur.is_zero() {
        return Err(FlakeError::Config(format!("{key} must be greater than zero")));
    }
    Ok(dur)
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn overflowing_duration_is_an_error() {
        let err = parse_duration("18446744073709551615h").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("18446744073709551615m").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn defaults_validate() {
        let settings = Settings::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(settings.round_timeout, Duration::from_secs(30));
        assert_eq!(settings.log_path, std::path::PathBuf::from("/tmp/test.log"));
        assert_eq!(settings.command.program(), "go");
        assert_eq!(settings.markers.len(), 5);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.round.timeout = "0s".into();
        match Settings::try_from(raw) {
            Err(FlakeError::Config(msg)) => assert!(msg.contains("round.timeout")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn marker_needs_exactly_one_matcher() {
        let mut raw = RawConfigFile::default();
        raw.marker = Some(vec![MarkerSection {
            label: "both".into(),
            contains: Some("x".into()),
            regex: Some("y".into()),
            announce: None,
        }]);
        assert!(matches!(Settings::try_from(raw), Err(FlakeError::Config(_))));
    }

    #[test]
    fn duplicate_marker_labels_are_rejected() {
        let section = MarkerSection {
            label: "fail".into(),
            contains: Some("FAIL".into()),
            regex: None,
            announce: None,
        };
        let mut raw = RawConfigFile::default();
        raw.marker = Some(vec![section.clone(), section]);
        match Settings::try_from(raw) {
            Err(FlakeError::Config(msg)) => assert!(msg.contains("duplicate")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn empty_program_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.command.program = "  ".into();
        assert!(matches!(Settings::try_from(raw), Err(FlakeError::Config(_))));
    }
}
