// src/exec/round.rs

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::exec::StreamSource;
use crate::exec::drainer::{DrainEnd, DrainSummary, Drainer};
use crate::exec::launcher::{Launched, LaunchedProcess, ProcessLauncher};
use crate::exec::persist::LogPersister;
use crate::filter::TestFilter;
use crate::markers::MarkerSet;
use crate::report::{ReportLevel, Reporter};

/// Longest round budget honoured; larger ones are clamped.
pub const MAX_BUDGET: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// One bounded attempt at running the test command.
#[derive(Debug, Clone)]
pub struct Round {
    pub index: u64,
    pub filter: TestFilter,
    pub started: Instant,
    pub deadline: Instant,
}

impl Round {
    /// A budget too large to represent as an instant is clamped to
    /// [`MAX_BUDGET`], which no test run will ever reach.
    pub fn new(index: u64, filter: TestFilter, budget: Duration) -> Self {
        let started = Instant::now();
        let deadline = started
            .checked_add(budget.min(MAX_BUDGET))
            .unwrap_or(started);
        Self {
            index,
            filter,
            started,
            deadline,
        }
    }

    pub fn budget(&self) -> Duration {
        self.deadline.saturating_duration_since(self.started)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// How the test process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Code(i32),
    Signal(i32),
    /// Never collected (the process could not be reaped after termination).
    Unknown,
}

impl ExitOutcome {
    pub fn success(self) -> bool {
        self == ExitOutcome::Code(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitOutcome::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitOutcome::Signal(signal);
            }
        }
        ExitOutcome::Unknown
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(code) => write!(f, "exit status {code}"),
            ExitOutcome::Signal(signal) => write!(f, "killed by signal {signal}"),
            ExitOutcome::Unknown => write!(f, "exit status unknown"),
        }
    }
}

/// Why a round did not pass.
#[derive(Debug, Error)]
pub enum RoundError {
    #[error("error creating test log file {}: {error}", .path.display())]
    CreateLog { path: PathBuf, error: io::Error },

    #[error("failed to start {program}: {error}")]
    Launch { program: String, error: io::Error },

    #[error("no {0} pipe for the test process")]
    MissingPipe(StreamSource),

    #[error("failed waiting for the test process: {0}")]
    Wait(io::Error),

    /// The test command ran and reported failure: the flake was caught.
    #[error("test failed: {exit}")]
    ProcessFailed { exit: ExitOutcome },

    #[error("round timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("interrupted")]
    Interrupted,
}

impl RoundError {
    /// The round never got as far as running the tests.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            RoundError::CreateLog { .. }
                | RoundError::Launch { .. }
                | RoundError::MissingPipe(_)
                | RoundError::Wait(_)
        )
    }
}

/// Details of a round that passed.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub index: u64,
    pub exit: ExitOutcome,
    pub elapsed: Duration,
    pub stdout: DrainSummary,
    pub stderr: DrainSummary,
    pub log_published: bool,
}

/// What cut a round short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Deadline,
    Shutdown,
}

enum Phase<T> {
    Finished(T),
    Expired(Expiry),
}

/// Runs rounds against a real test process.
pub struct ProcessRoundExecutor {
    launcher: ProcessLauncher,
    log_path: PathBuf,
    markers: Arc<MarkerSet>,
    reporter: Arc<dyn Reporter>,
    drain_grace: Duration,
    kill_grace: Duration,
}

impl ProcessRoundExecutor {
    pub fn new(settings: &Settings, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            launcher: ProcessLauncher::new(settings.command.clone()),
            log_path: settings.log_path.clone(),
            markers: Arc::new(settings.markers.clone()),
            reporter,
            drain_grace: settings.drain_grace,
            kill_grace: settings.kill_grace,
        }
    }

    /// Run one round to completion.
    ///
    /// Steps, in order:
    /// 1. Launch: open the swap log and start the process.
    /// 2. Drain: join both stream drainers. Output is consumed before the
    ///    exit status is collected so the child can never stall on a full
    ///    pipe. If the deadline or shutdown fires first, the process group is
    ///    terminated and the drainers get `drain_grace` to reach EOF before
    ///    they are aborted.
    /// 3. Publish the log, but only if both streams were fully drained.
    /// 4. Await exit, still bounded by the deadline.
    /// 5. Reconcile: an expired deadline wins over any exit status.
    pub async fn run_round(
        &self,
        round: &Round,
        shutdown: &CancellationToken,
    ) -> Result<RoundReport, RoundError> {
        let persister = Arc::new(LogPersister::create(&self.log_path).await?);

        self.reporter.harness(ReportLevel::Verbose, "cmd start");
        let Launched {
            mut process,
            stdout,
            stderr,
        } = self.launcher.launch(&round.filter)?;
        info!(round = round.index, pid = ?process.pid(), "round started");

        let drain_cancel = shutdown.child_token();
        let stdout_task = tokio::spawn(
            self.drainer(StreamSource::Stdout, &persister, &drain_cancel)
                .run(stdout),
        );
        let stderr_task = tokio::spawn(
            self.drainer(StreamSource::Stderr, &persister, &drain_cancel)
                .run(stderr),
        );

        let mut expiry = None;

        self.reporter
            .harness(ReportLevel::Verbose, "waiting for output streams");
        let joined = async { tokio::join!(stdout_task, stderr_task) };
        tokio::pin!(joined);

        let phase = tokio::select! {
            res = &mut joined => Phase::Finished(res),
            () = sleep_until(round.deadline) => Phase::Expired(Expiry::Deadline),
            () = shutdown.cancelled() => Phase::Expired(Expiry::Shutdown),
        };

        let (stdout_res, stderr_res) = match phase {
            Phase::Finished(res) => res,
            Phase::Expired(why) => {
                expiry = Some(why);
                warn!(round = round.index, ?why, "round cut short while draining output; terminating process group");
                process.terminate(self.kill_grace).await;

                match timeout(self.drain_grace, &mut joined).await {
                    Ok(res) => res,
                    Err(_) => {
                        warn!(
                            round = round.index,
                            "output streams still open after termination; aborting drainers"
                        );
                        drain_cancel.cancel();
                        joined.await
                    }
                }
            }
        };

        let stdout = summary_of(StreamSource::Stdout, stdout_res);
        let stderr = summary_of(StreamSource::Stderr, stderr_res);

        let log_published = self.publish(&persister, &stdout, &stderr).await;

        self.reporter.harness(ReportLevel::Verbose, "cmd wait");
        let exit = match expiry {
            Some(_) => self.reap_terminated(&mut process).await,
            None => {
                let waited = tokio::select! {
                    res = process.wait() => Phase::Finished(res),
                    () = sleep_until(round.deadline) => Phase::Expired(Expiry::Deadline),
                    () = shutdown.cancelled() => Phase::Expired(Expiry::Shutdown),
                };
                match waited {
                    Phase::Finished(res) => ExitOutcome::from(res.map_err(RoundError::Wait)?),
                    Phase::Expired(why) => {
                        expiry = Some(why);
                        warn!(round = round.index, ?why, "round cut short waiting for exit; terminating process group");
                        process.terminate(self.kill_grace).await;
                        self.reap_terminated(&mut process).await
                    }
                }
            }
        };

        // An exit that merely raced the deadline is not a trustworthy pass.
        if expiry.is_none() && round.is_expired() {
            expiry = Some(Expiry::Deadline);
        }

        let elapsed = round.started.elapsed();
        info!(
            round = round.index,
            %exit,
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_lines = stdout.lines,
            stderr_lines = stderr.lines,
            log_published,
            "round finished"
        );

        match expiry {
            Some(Expiry::Deadline) => {
                self.reporter.harness(
                    ReportLevel::Info,
                    &format!("cmd done & canceled: {exit}"),
                );
                Err(RoundError::TimedOut {
                    after: round.budget(),
                })
            }
            Some(Expiry::Shutdown) => Err(RoundError::Interrupted),
            None if !exit.success() => Err(RoundError::ProcessFailed { exit }),
            None => {
                self.reporter.harness(ReportLevel::Verbose, "cmd done");
                Ok(RoundReport {
                    index: round.index,
                    exit,
                    elapsed,
                    stdout,
                    stderr,
                    log_published,
                })
            }
        }
    }

    fn drainer(
        &self,
        source: StreamSource,
        persister: &Arc<LogPersister>,
        cancel: &CancellationToken,
    ) -> Drainer {
        Drainer::new(
            source,
            Arc::clone(persister),
            Arc::clone(&self.markers),
            Arc::clone(&self.reporter),
            cancel.clone(),
        )
    }

    async fn publish(
        &self,
        persister: &LogPersister,
        stdout: &DrainSummary,
        stderr: &DrainSummary,
    ) -> bool {
        if !(stdout.is_complete() && stderr.is_complete() && persister.is_intact()) {
            warn!(
                swap = %persister.swap_path().display(),
                stdout = ?stdout.end,
                stderr = ?stderr.end,
                "round output incomplete; canonical log left untouched"
            );
            return false;
        }

        self.reporter.harness(ReportLevel::Verbose, "moving log file");
        match persister.publish().await {
            Ok(()) => true,
            Err(e) => {
                self.reporter.harness(
                    ReportLevel::Info,
                    &format!(
                        "could not publish {}: {e}",
                        persister.canonical_path().display()
                    ),
                );
                false
            }
        }
    }

    /// Collect the exit status of a process that has just been terminated.
    async fn reap_terminated(&self, process: &mut LaunchedProcess) -> ExitOutcome {
        match timeout(self.kill_grace, process.wait()).await {
            Ok(Ok(status)) => ExitOutcome::from(status),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to reap terminated test process");
                ExitOutcome::Unknown
            }
            Err(_) => {
                warn!(pid = ?process.pid(), "terminated test process did not exit");
                ExitOutcome::Unknown
            }
        }
    }
}

fn summary_of(source: StreamSource, res: Result<DrainSummary, JoinError>) -> DrainSummary {
    res.unwrap_or_else(|e| {
        debug!(stream = %source, error = %e, "drainer task failed");
        DrainSummary {
            source,
            lines: 0,
            bytes: 0,
            end: DrainEnd::ReadError(format!("drainer task failed: {e}")),
        }
    })
}
