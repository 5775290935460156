use std::sync::Mutex;

use flakeloop::exec::StreamSource;
use flakeloop::report::{ReportLevel, Reporter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedLine {
    Harness(ReportLevel, String),
    Output(StreamSource, String),
}

/// Reporter that keeps every line for later assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<RecordedLine>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<RecordedLine> {
        self.lines.lock().unwrap().clone()
    }

    /// Harness lines at `Info` level, in order.
    pub fn info_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|l| match l {
                RecordedLine::Harness(ReportLevel::Info, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Classified test output from one stream, in order.
    pub fn output_from(&self, source: StreamSource) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|l| match l {
                RecordedLine::Output(s, text) if s == source => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn harness(&self, level: ReportLevel, text: &str) {
        self.lines
            .lock()
            .unwrap()
            .push(RecordedLine::Harness(level, text.to_string()));
    }

    fn output(&self, source: StreamSource, text: &str) {
        self.lines
            .lock()
            .unwrap()
            .push(RecordedLine::Output(source, text.to_string()));
    }
}
