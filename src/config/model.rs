// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::CommandSpec;
use crate::markers::MarkerSet;

pub const DEFAULT_LOG_PATH: &str = "/tmp/test.log";
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [round]
/// timeout = "30s"
/// log_path = "/tmp/test.log"
///
/// [command]
/// program = "go"
/// args = ["test", "-v", "-run", "^{filter}$"]
///
/// [[marker]]
/// label = "fail"
/// contains = "--- FAIL"
/// ```
///
/// Every section is optional. Omitting `[[marker]]` entirely keeps the
/// built-in `go test` markers; listing any replaces them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub round: RoundSection,

    #[serde(default)]
    pub command: CommandSection,

    #[serde(default)]
    pub marker: Option<Vec<MarkerSection>>,
}

/// `[round]` section. Durations use the `250ms` / `3s` / `1m` / `2h` forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoundSection {
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// How long to wait for the output streams to close after the process
    /// group has been terminated.
    #[serde(default = "default_grace")]
    pub drain_grace: String,

    /// Delay between SIGTERM and SIGKILL when terminating the process group.
    #[serde(default = "default_grace")]
    pub kill_grace: String,

    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

fn default_timeout() -> String {
    "30s".to_string()
}

fn default_grace() -> String {
    "2s".to_string()
}

fn default_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_PATH)
}

impl Default for RoundSection {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            drain_grace: default_grace(),
            kill_grace: default_grace(),
            log_path: default_log_path(),
        }
    }
}

/// `[command]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSection {
    #[serde(default = "default_program")]
    pub program: String,

    /// Argument template; `{filter}` is replaced with the test filter.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_program() -> String {
    "go".to_string()
}

fn default_args() -> Vec<String> {
    ["test", "-v", "-run", "^{filter}$"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for CommandSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: None,
        }
    }
}

/// One `[[marker]]` entry. Exactly one of `contains` / `regex` must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerSection {
    pub label: String,

    #[serde(default)]
    pub contains: Option<String>,

    #[serde(default)]
    pub regex: Option<String>,

    /// Fixed text reported instead of the matching line.
    #[serde(default)]
    pub announce: Option<String>,
}

/// Validated settings for a whole session of rounds.
#[derive(Debug, Clone)]
pub struct Settings {
    pub round_timeout: Duration,
    pub drain_grace: Duration,
    pub kill_grace: Duration,
    pub log_path: PathBuf,
    pub command: CommandSpec,
    pub markers: MarkerSet,
}

impl Default for Settings {
    fn default() -> Self {
        let command = CommandSection::default();
        Self {
            round_timeout: DEFAULT_ROUND_TIMEOUT,
            drain_grace: DEFAULT_DRAIN_GRACE,
            kill_grace: DEFAULT_KILL_GRACE,
            log_path: default_log_path(),
            command: CommandSpec::new(command.program, command.args),
            markers: MarkerSet::go_test(),
        }
    }
}
