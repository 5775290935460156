// src/exec/backend.rs

//! Pluggable round executor.
//!
//! The driver talks to a `RoundExecutor` instead of spawning processes
//! itself. [`ProcessRoundExecutor`] is the production implementation; tests
//! provide scripted fakes to exercise the driver loop without a test runner.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::exec::round::{ProcessRoundExecutor, Round, RoundError, RoundReport};

pub type RoundFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RoundReport, RoundError>> + Send + 'a>>;

/// Executes a single round.
///
/// Implementations must not return until the round is completely over:
/// process reaped, streams joined and the log published or abandoned.
pub trait RoundExecutor: Send {
    fn execute<'a>(
        &'a mut self,
        round: &'a Round,
        shutdown: &'a CancellationToken,
    ) -> RoundFuture<'a>;
}

impl RoundExecutor for ProcessRoundExecutor {
    fn execute<'a>(
        &'a mut self,
        round: &'a Round,
        shutdown: &'a CancellationToken,
    ) -> RoundFuture<'a> {
        Box::pin(self.run_round(round, shutdown))
    }
}
