#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use flakeloop::config::Settings;
use flakeloop::exec::{ProcessRoundExecutor, Round, RoundError, RoundReport};
use flakeloop::filter::TestFilter;

pub use flakeloop_test_utils::{init_tracing, with_timeout, RecordingReporter, SettingsBuilder};

/// Run one real round with `settings`, recording everything reported.
pub async fn run_one(
    settings: &Settings,
    filter: &str,
) -> (Result<RoundReport, RoundError>, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::new());
    let executor = ProcessRoundExecutor::new(settings, reporter.clone());
    let round = Round::new(0, TestFilter::new(filter).unwrap(), settings.round_timeout);
    let res = executor.run_round(&round, &CancellationToken::new()).await;
    (res, reporter)
}

pub fn read_log(path: &Path) -> String {
    String::from_utf8(std::fs::read(path).unwrap()).unwrap()
}
