// src/exec/drainer.rs

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::exec::StreamSource;
use crate::exec::persist::LogPersister;
use crate::markers::MarkerSet;
use crate::report::{ReportLevel, Reporter};

/// Longest chunk read as one line. A longer line reaches the log unchanged
/// but is classified piecewise.
pub const MAX_LINE_BYTES: u64 = 64 * 1024;

/// How a drainer stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainEnd {
    /// The stream was consumed to the end.
    Eof,
    /// Reading failed part-way; the message is the IO error.
    ReadError(String),
    /// The round's cancellation token fired before end-of-stream.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    pub source: StreamSource,
    /// Lines read; a line over [`MAX_LINE_BYTES`] counts once per chunk.
    pub lines: usize,
    pub bytes: u64,
    pub end: DrainEnd,
}

impl DrainSummary {
    /// Every byte of the stream reached the log.
    pub fn is_complete(&self) -> bool {
        self.end == DrainEnd::Eof
    }
}

/// Consumes one output stream of the test process.
///
/// Each raw line (newline included) is appended to the round log before it
/// is classified, so the log is a byte-for-byte tee of the stream. Lines
/// matching a marker are reported straight away; everything else only goes
/// to the log.
pub struct Drainer {
    source: StreamSource,
    persister: Arc<LogPersister>,
    markers: Arc<MarkerSet>,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
}

impl Drainer {
    pub fn new(
        source: StreamSource,
        persister: Arc<LogPersister>,
        markers: Arc<MarkerSet>,
        reporter: Arc<dyn Reporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            persister,
            markers,
            reporter,
            cancel,
        }
    }

    /// Drain `stream` until EOF, a read error, or cancellation.
    ///
    /// Never fails: a read error is reported and ends this stream only.
    pub async fn run<R>(self, stream: R) -> DrainSummary
    where
        R: AsyncRead + Unpin,
    {
        let source = self.source;
        self.reporter
            .harness(ReportLevel::Verbose, &format!("({source}) scanner start"));

        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(256);
        let mut lines = 0usize;
        let mut bytes = 0u64;
        let mut write_failed = false;

        let end = loop {
            buf.clear();
            let mut chunk = (&mut reader).take(MAX_LINE_BYTES);
            let read = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break DrainEnd::Aborted,
                res = chunk.read_until(b'\n', &mut buf) => res,
            };

            match read {
                Ok(0) => break DrainEnd::Eof,
                Ok(n) => {
                    lines += 1;
                    bytes += n as u64;

                    if let Err(e) = self.persister.append(&buf).await {
                        if !write_failed {
                            warn!(stream = %source, error = %e, "failed to write round log; it will not be published");
                            write_failed = true;
                        }
                    }

                    self.classify(&buf);
                }
                Err(e) => {
                    self.reporter.harness(
                        ReportLevel::Info,
                        &format!("({source}) scanner error: {e}"),
                    );
                    break DrainEnd::ReadError(e.to_string());
                }
            }
        };

        match &end {
            DrainEnd::Eof => self
                .reporter
                .harness(ReportLevel::Verbose, &format!("({source}) scanner complete")),
            DrainEnd::Aborted => {
                debug!(stream = %source, lines, "drainer aborted before end of stream")
            }
            DrainEnd::ReadError(_) => {}
        }

        DrainSummary {
            source,
            lines,
            bytes,
            end,
        }
    }

    fn classify(&self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches(['\n', '\r']);
        trace!(stream = %self.source, "{}", line);

        if let Some(marker) = self.markers.classify(line) {
            self.reporter.output(self.source, marker.render(line));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::io::AsyncWriteExt;

    use super::*;

    #[derive(Default)]
    struct Lines(Mutex<Vec<(StreamSource, String)>>);

    impl Reporter for Lines {
        fn harness(&self, _level: ReportLevel, _text: &str) {}

        fn output(&self, source: StreamSource, text: &str) {
            self.0.lock().unwrap().push((source, text.to_string()));
        }
    }

    async fn persister(dir: &tempfile::TempDir) -> Arc<LogPersister> {
        Arc::new(LogPersister::create(&dir.path().join("test.log")).await.unwrap())
    }

    #[tokio::test]
    async fn tees_bytes_and_reports_marked_lines() {
        let dir = tempfile::tempdir().unwrap();
        let persister = persister(&dir).await;
        let reporter = Arc::new(Lines::default());

        let input: &[u8] = b"=== RUN   TestA\nnoise\r\n--- FAIL: TestA (0.00s)\nno newline";
        let drainer = Drainer::new(
            StreamSource::Stdout,
            persister.clone(),
            Arc::new(MarkerSet::go_test()),
            reporter.clone(),
            CancellationToken::new(),
        );
        let summary = drainer.run(input).await;

        assert_eq!(summary.end, DrainEnd::Eof);
        assert_eq!(summary.lines, 4);
        assert_eq!(summary.bytes, input.len() as u64);
        assert_eq!(std::fs::read(persister.swap_path()).unwrap(), input);

        let seen = reporter.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (StreamSource::Stdout, "=== RUN   TestA".to_string()),
                (StreamSource::Stdout, "--- FAIL: TestA (0.00s)".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_logged_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let persister = persister(&dir).await;
        let input: &[u8] = b"\xff\xfe--- PASS: TestB\n";

        let drainer = Drainer::new(
            StreamSource::Stderr,
            persister.clone(),
            Arc::new(MarkerSet::go_test()),
            Arc::new(Lines::default()),
            CancellationToken::new(),
        );
        assert!(drainer.run(input).await.is_complete());
        assert_eq!(std::fs::read(persister.swap_path()).unwrap(), input);
    }

    #[tokio::test]
    async fn overlong_line_is_split_into_bounded_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let persister = persister(&dir).await;
        let input = vec![b'x'; 3 * MAX_LINE_BYTES as usize + 10];

        let drainer = Drainer::new(
            StreamSource::Stdout,
            persister.clone(),
            Arc::new(MarkerSet::go_test()),
            Arc::new(Lines::default()),
            CancellationToken::new(),
        );
        let summary = drainer.run(input.as_slice()).await;

        assert!(summary.is_complete());
        assert_eq!(summary.lines, 4);
        assert_eq!(std::fs::read(persister.swap_path()).unwrap(), input);
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_stalled_stream() {
        let dir = tempfile::tempdir().unwrap();
        let persister = persister(&dir).await;

        // Keep the write half alive so the read side never sees EOF.
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"=== RUN   TestStuck\n").await.unwrap();

        let cancel = CancellationToken::new();
        let drainer = Drainer::new(
            StreamSource::Stdout,
            persister,
            Arc::new(MarkerSet::go_test()),
            Arc::new(Lines::default()),
            cancel.clone(),
        );
        let handle = tokio::spawn(drainer.run(reader));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        let summary = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("drainer should stop once cancelled")
            .unwrap();
        assert_eq!(summary.end, DrainEnd::Aborted);
        assert_eq!(summary.lines, 1);
        drop(writer);
    }
}
