// src/exec/launcher.rs

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::exec::StreamSource;
use crate::exec::round::RoundError;
use crate::filter::{FILTER_PLACEHOLDER, TestFilter};

/// Program plus argument template for the test command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn working_dir_path(&self) -> Option<&std::path::Path> {
        self.working_dir.as_deref()
    }

    /// Arguments with every `{filter}` replaced by the filter, or `.*` when
    /// the filter is empty.
    pub fn render_args(&self, filter: &TestFilter) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(FILTER_PLACEHOLDER, filter.template_value()))
            .collect()
    }

    /// Shell-ish rendering for logs and `--dry-run`.
    pub fn display(&self, filter: &TestFilter) -> String {
        std::iter::once(self.program.clone())
            .chain(self.render_args(filter))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Starts the test command for a round.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    spec: CommandSpec,
}

/// A freshly started process together with its output pipes.
#[derive(Debug)]
pub struct Launched {
    pub process: LaunchedProcess,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl ProcessLauncher {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    /// Spawn the command as the leader of a new process group.
    ///
    /// The test runner may fork helpers (compilers, test binaries), so
    /// termination has to target the group, not just the leader.
    pub fn launch(&self, filter: &TestFilter) -> Result<Launched, RoundError> {
        let args = self.spec.render_args(filter);

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|error| RoundError::Launch {
            program: self.spec.program.clone(),
            error,
        })?;

        // `child` is killed on drop if either pipe is missing.
        let stdout = child
            .stdout
            .take()
            .ok_or(RoundError::MissingPipe(StreamSource::Stdout))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(RoundError::MissingPipe(StreamSource::Stderr))?;

        let pid = child.id();
        info!(pid = ?pid, program = %self.spec.program, args = ?args, "test process started");

        Ok(Launched {
            process: LaunchedProcess { child, pid },
            stdout,
            stderr,
        })
    }
}

/// A running test process. The process is killed if this is dropped before
/// it has been reaped.
#[derive(Debug)]
pub struct LaunchedProcess {
    child: Child,
    pid: Option<u32>,
}

impl LaunchedProcess {
    /// PID of the leader, which is also the process group id on Unix.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the leader to exit. Safe to call again after it returned.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Terminate the whole process group: SIGTERM, up to `grace` for the
    /// leader to exit, then SIGKILL for anything left in the group.
    pub async fn terminate(&mut self, grace: Duration) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                use nix::sys::signal::Signal;

                signal_group(pid, Signal::SIGTERM);
                match timeout(grace, self.child.wait()).await {
                    Ok(Ok(status)) => {
                        debug!(pid, %status, "process group leader exited after SIGTERM")
                    }
                    Ok(Err(e)) => warn!(pid, error = %e, "failed waiting for terminated process"),
                    Err(_) => debug!(pid, "process group leader ignored SIGTERM"),
                }
                // Grandchildren may still hold the output pipes open.
                signal_group(pid, Signal::SIGKILL);
                return;
            }
        }

        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "failed to kill test process");
        }
        let _ = timeout(grace, self.child.wait()).await;
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => debug!(pgid = pid, ?signal, "signalled process group"),
        // Whole group already gone.
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid = pid, ?signal, error = %e, "failed to signal process group"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn go_spec() -> CommandSpec {
        CommandSpec::new("go", ["test", "-v", "-run", "^{filter}$"])
    }

    #[test]
    fn empty_filter_renders_match_all() {
        let filter = TestFilter::new("").unwrap();
        assert_eq!(
            go_spec().render_args(&filter),
            vec!["test", "-v", "-run", "^.*$"]
        );
    }

    #[test]
    fn filter_is_substituted_verbatim() {
        let filter = TestFilter::new("TestFoo/sub_.*").unwrap();
        assert_eq!(
            go_spec().display(&filter),
            "go test -v -run ^TestFoo/sub_.*$"
        );
    }

    #[test]
    fn every_placeholder_is_replaced() {
        let spec = CommandSpec::new("sh", ["-c", "echo {filter} {filter}"]);
        let filter = TestFilter::new("X").unwrap();
        assert_eq!(spec.render_args(&filter), vec!["-c", "echo X X"]);
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let launcher = ProcessLauncher::new(CommandSpec::new(
            "/definitely/not/a/real/flakeloop-binary",
            Vec::<String>::new(),
        ));
        match launcher.launch(&TestFilter::new("").unwrap()) {
            Err(RoundError::Launch { program, .. }) => {
                assert!(program.ends_with("flakeloop-binary"))
            }
            other => panic!("expected launch error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_kills_a_sleeping_group() {
        let launcher = ProcessLauncher::new(CommandSpec::new("sh", ["-c", "sleep 30"]));
        let Launched { mut process, .. } = launcher.launch(&TestFilter::new("").unwrap()).unwrap();

        process.terminate(Duration::from_millis(500)).await;
        let status = timeout(Duration::from_secs(5), process.wait())
            .await
            .expect("process should be reaped after termination")
            .unwrap();
        assert!(!status.success());
    }
}
