use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use flakeloop::exec::{
    DrainEnd, DrainSummary, ExitOutcome, Round, RoundError, RoundExecutor, RoundFuture,
    RoundReport, StreamSource,
};

/// What the fake was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRound {
    pub index: u64,
    pub filter: String,
    pub budget: Duration,
}

/// A scripted executor that:
/// - records every round it is handed
/// - replays the scripted failures in order, passing every other round.
///
/// `FakeExecutor::failing_after(n, err)` passes `n` rounds and then returns
/// `err`.
pub struct FakeExecutor {
    script: VecDeque<Option<RoundError>>,
    seen: Arc<Mutex<Vec<SeenRound>>>,
}

impl FakeExecutor {
    pub fn failing_after(passes: usize, error: RoundError) -> Self {
        let mut script: VecDeque<Option<RoundError>> =
            std::iter::repeat_with(|| None).take(passes).collect();
        script.push_back(Some(error));
        Self {
            script,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<SeenRound>>> {
        Arc::clone(&self.seen)
    }
}

impl RoundExecutor for FakeExecutor {
    fn execute<'a>(
        &'a mut self,
        round: &'a Round,
        shutdown: &'a CancellationToken,
    ) -> RoundFuture<'a> {
        self.seen.lock().unwrap().push(SeenRound {
            index: round.index,
            filter: round.filter.raw().to_string(),
            budget: round.budget(),
        });
        // An exhausted script keeps failing so a broken driver cannot spin.
        let next = self
            .script
            .pop_front()
            .unwrap_or(Some(RoundError::Interrupted));
        let cancelled = shutdown.is_cancelled();

        Box::pin(async move {
            if cancelled {
                return Err(RoundError::Interrupted);
            }
            match next {
                Some(err) => Err(err),
                None => Ok(RoundReport {
                    index: round.index,
                    exit: ExitOutcome::Code(0),
                    elapsed: Duration::ZERO,
                    stdout: empty_drain(StreamSource::Stdout),
                    stderr: empty_drain(StreamSource::Stderr),
                    log_published: true,
                }),
            }
        })
    }
}

fn empty_drain(source: StreamSource) -> DrainSummary {
    DrainSummary {
        source,
        lines: 0,
        bytes: 0,
        end: DrainEnd::Eof,
    }
}
