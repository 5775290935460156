// src/engine/driver.rs

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::exec::{Round, RoundError, RoundExecutor};
use crate::filter::TestFilter;
use crate::report::{ReportLevel, Reporter};

/// The round that ended the loop, and why.
#[derive(Debug, Error)]
#[error("round {round}: {error}")]
pub struct RoundFailure {
    pub round: u64,
    pub error: RoundError,
}

/// Runs rounds back to back until one fails.
///
/// Rounds are strictly sequential: the next one starts only after the
/// executor has fully returned from the previous one. The only state carried
/// between rounds is the index.
pub struct RoundDriver<E> {
    executor: E,
    reporter: Arc<dyn Reporter>,
    filter: TestFilter,
    round_timeout: Duration,
    shutdown: CancellationToken,
    next_index: u64,
}

impl<E: RoundExecutor> RoundDriver<E> {
    pub fn new(
        executor: E,
        reporter: Arc<dyn Reporter>,
        filter: TestFilter,
        round_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            reporter,
            filter,
            round_timeout,
            shutdown: CancellationToken::new(),
            next_index: 0,
        }
    }

    /// Token that, once cancelled, interrupts the current round and stops
    /// the loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Index of the next round to run (equals the number of passed rounds).
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Loop until a round fails. Only returns with that failure.
    pub async fn run(&mut self) -> RoundFailure {
        self.reporter.harness(ReportLevel::Verbose, "start");
        self.reporter
            .harness(ReportLevel::Info, &format!("filter: {}", self.filter));

        loop {
            let index = self.next_index;
            self.reporter
                .harness(ReportLevel::Info, &format!("round {index}"));

            let round = Round::new(index, self.filter.clone(), self.round_timeout);
            match self.executor.execute(&round, &self.shutdown).await {
                Ok(report) => {
                    info!(
                        round = index,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        log_published = report.log_published,
                        "round passed"
                    );
                    self.reporter
                        .harness(ReportLevel::Info, &format!("round {index} -> OK"));
                    self.next_index += 1;
                }
                Err(error) => {
                    info!(round = index, error = %error, "round failed; stopping");
                    self.reporter
                        .harness(ReportLevel::Info, &format!("round {index} -> Error: {error}"));
                    return RoundFailure {
                        round: index,
                        error,
                    };
                }
            }
        }
    }
}
