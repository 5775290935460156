// src/exec/mod.rs

//! Round execution engine.
//!
//! One round runs the test command once under a deadline:
//!
//! - [`launcher`] builds the command and starts it in its own process group.
//! - [`drainer`] consumes stdout / stderr line by line, teeing every byte into
//!   the round log and reporting lines that match a marker.
//! - [`persist`] owns the swap file and publishes it over the canonical log.
//! - [`round`] ties these together and reconciles the exit status with the
//!   deadline.
//! - [`backend`] provides the `RoundExecutor` trait the driver talks to, so
//!   tests can swap in a fake.

pub mod backend;
pub mod drainer;
pub mod launcher;
pub mod persist;
pub mod round;

use std::fmt;

pub use backend::{RoundExecutor, RoundFuture};
pub use drainer::{DrainEnd, DrainSummary, Drainer};
pub use launcher::{CommandSpec, Launched, LaunchedProcess, ProcessLauncher};
pub use persist::LogPersister;
pub use round::{
    ExitOutcome, MAX_BUDGET, ProcessRoundExecutor, Round, RoundError, RoundReport,
};

/// Which output stream of the test process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
