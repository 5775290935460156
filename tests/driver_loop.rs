// tests/driver_loop.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use flakeloop::engine::RoundDriver;
use flakeloop::exec::{ExitOutcome, RoundError};
use flakeloop::filter::TestFilter;
use flakeloop_test_utils::{FakeExecutor, RecordingReporter, SeenRound};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn stops_on_first_failure_and_returns_it() -> TestResult {
    init_tracing();
    let executor = FakeExecutor::failing_after(
        3,
        RoundError::ProcessFailed {
            exit: ExitOutcome::Code(1),
        },
    );
    let seen = executor.seen();
    let reporter = Arc::new(RecordingReporter::new());
    let mut driver = RoundDriver::new(
        executor,
        reporter.clone(),
        TestFilter::new("TestFlaky")?,
        Duration::from_secs(30),
    );

    let failure = with_timeout(driver.run()).await;

    assert_eq!(failure.round, 3);
    assert!(matches!(
        failure.error,
        RoundError::ProcessFailed {
            exit: ExitOutcome::Code(1)
        }
    ));
    assert_eq!(failure.to_string(), "round 3: test failed: exit status 1");
    assert_eq!(driver.next_index(), 3);

    assert_eq!(
        reporter.info_lines(),
        vec![
            "filter: \"TestFlaky\"",
            "round 0",
            "round 0 -> OK",
            "round 1",
            "round 1 -> OK",
            "round 2",
            "round 2 -> OK",
            "round 3",
            "round 3 -> Error: test failed: exit status 1",
        ]
    );

    let seen = seen.lock().unwrap().clone();
    let expected: Vec<SeenRound> = (0..4)
        .map(|index| SeenRound {
            index,
            filter: "TestFlaky".to_string(),
            budget: Duration::from_secs(30),
        })
        .collect();
    assert_eq!(seen, expected);
    Ok(())
}

#[tokio::test]
async fn timeout_is_reported_distinctly() -> TestResult {
    init_tracing();
    let executor = FakeExecutor::failing_after(
        1,
        RoundError::TimedOut {
            after: Duration::from_secs(30),
        },
    );
    let reporter = Arc::new(RecordingReporter::new());
    let mut driver = RoundDriver::new(
        executor,
        reporter.clone(),
        TestFilter::new("")?,
        Duration::from_secs(30),
    );

    let failure = with_timeout(driver.run()).await;

    assert_eq!(failure.round, 1);
    assert!(matches!(failure.error, RoundError::TimedOut { .. }));
    let info = reporter.info_lines();
    assert_eq!(info.first().map(String::as_str), Some("filter: all tests"));
    assert_eq!(
        info.last().map(String::as_str),
        Some("round 1 -> Error: round timed out after 30s")
    );
    Ok(())
}

#[tokio::test]
async fn setup_failure_stops_before_any_pass() -> TestResult {
    init_tracing();
    let executor = FakeExecutor::failing_after(
        0,
        RoundError::Launch {
            program: "go".into(),
            error: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        },
    );
    let seen = executor.seen();
    let mut driver = RoundDriver::new(
        executor,
        Arc::new(RecordingReporter::new()),
        TestFilter::new("")?,
        Duration::from_secs(30),
    );

    let failure = with_timeout(driver.run()).await;

    assert_eq!(failure.round, 0);
    assert!(failure.error.is_setup());
    assert_eq!(seen.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn cancelled_shutdown_token_interrupts_the_loop() -> TestResult {
    init_tracing();
    let executor = FakeExecutor::failing_after(
        5,
        RoundError::ProcessFailed {
            exit: ExitOutcome::Code(1),
        },
    );
    let mut driver = RoundDriver::new(
        executor,
        Arc::new(RecordingReporter::new()),
        TestFilter::new("")?,
        Duration::from_secs(30),
    );
    driver.shutdown_token().cancel();

    let failure = with_timeout(driver.run()).await;
    assert_eq!(failure.round, 0);
    assert!(matches!(failure.error, RoundError::Interrupted));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn real_flaky_runner_is_caught_on_its_third_round() -> TestResult {
    use flakeloop::exec::ProcessRoundExecutor;
    use flakeloop_test_utils::SettingsBuilder;

    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("test.log");
    // Passes twice, then fails. State lives in a counter file.
    let script = r#"
n=$(cat counter 2>/dev/null || echo 0)
n=$((n+1))
echo $n > counter
echo "=== RUN   TestFlaky (run $n)"
if [ $n -ge 3 ]; then
  echo "--- FAIL: TestFlaky"
  exit 1
fi
echo "--- PASS: TestFlaky"
"#;
    let settings = SettingsBuilder::new(&log)
        .script(script)
        .working_dir(dir.path())
        .build();

    let reporter = Arc::new(RecordingReporter::new());
    let executor = ProcessRoundExecutor::new(&settings, reporter.clone());
    let mut driver = RoundDriver::new(
        executor,
        reporter.clone(),
        TestFilter::new("TestFlaky")?,
        settings.round_timeout,
    );

    let failure = with_timeout(driver.run()).await;

    assert_eq!(failure.round, 2);
    assert!(matches!(
        failure.error,
        RoundError::ProcessFailed {
            exit: ExitOutcome::Code(1)
        }
    ));
    assert_eq!(
        std::fs::read_to_string(&log)?,
        "=== RUN   TestFlaky (run 3)\n--- FAIL: TestFlaky\n"
    );
    assert!(
        reporter
            .info_lines()
            .contains(&"round 1 -> OK".to_string())
    );
    Ok(())
}
