#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use flakeloop::config::Settings;
use flakeloop::exec::CommandSpec;
use flakeloop::markers::MarkerSet;

/// Builder for `Settings` around a stub test runner.
///
/// The stub is `sh -c <script> stub '^{filter}$'`, so inside the script `$1`
/// is the anchored filter exactly as `go test -run` would receive it.
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Settings logging to `log_path`, with short timeouts suited to tests.
    pub fn new(log_path: &Path) -> Self {
        Self {
            settings: Settings {
                round_timeout: Duration::from_secs(5),
                drain_grace: Duration::from_millis(300),
                kill_grace: Duration::from_millis(300),
                log_path: log_path.to_path_buf(),
                command: stub_runner("exit 0"),
                markers: MarkerSet::go_test(),
            },
        }
    }

    pub fn script(mut self, script: &str) -> Self {
        self.settings.command = stub_runner(script);
        self
    }

    pub fn command(mut self, command: CommandSpec) -> Self {
        self.settings.command = command;
        self
    }

    pub fn working_dir(mut self, dir: &Path) -> Self {
        self.settings.command = self.settings.command.working_dir(dir);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.round_timeout = timeout;
        self
    }

    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.settings.drain_grace = grace;
        self
    }

    pub fn markers(mut self, markers: MarkerSet) -> Self {
        self.settings.markers = markers;
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

/// `CommandSpec` running `script` under `sh`, with the anchored filter as `$1`.
pub fn stub_runner(script: &str) -> CommandSpec {
    CommandSpec::new("sh", ["-c", script, "stub", "^{filter}$"])
}
