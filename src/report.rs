// src/report.rs

//! Human-facing progress lines.
//!
//! This is separate from `tracing`: tracing carries diagnostics to stderr,
//! the [`Reporter`] carries the round-by-round narrative a user watches on
//! stdout while waiting for a flaky test to fail.

use std::io::Write;

use crate::exec::StreamSource;

/// Importance of a harness line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportLevel {
    /// Internal step-by-step progress (`cmd start`, `scanner complete`, ...).
    Verbose,
    /// Round starts and outcomes, classified test output.
    Info,
}

/// Sink for leveled text lines.
pub trait Reporter: Send + Sync {
    /// A line produced by flakeloop itself.
    fn harness(&self, level: ReportLevel, text: &str);

    /// A classified line from the test process.
    fn output(&self, source: StreamSource, text: &str);
}

/// Writes to stdout, dropping harness lines below `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    threshold: ReportLevel,
}

impl ConsoleReporter {
    pub fn new(threshold: ReportLevel) -> Self {
        Self { threshold }
    }

    pub fn verbose(verbose: bool) -> Self {
        Self::new(if verbose {
            ReportLevel::Verbose
        } else {
            ReportLevel::Info
        })
    }

    fn write_line(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        // A closed stdout must not take the round down with it.
        let _ = writeln!(lock, "{line}");
    }
}

impl Reporter for ConsoleReporter {
    fn harness(&self, level: ReportLevel, text: &str) {
        if level >= self.threshold {
            self.write_line(&format!("[H] {text}"));
        }
    }

    fn output(&self, source: StreamSource, text: &str) {
        match source {
            StreamSource::Stdout => self.write_line(text),
            StreamSource::Stderr => self.write_line(&format!("[H] (stderr) {text}")),
        }
    }
}
