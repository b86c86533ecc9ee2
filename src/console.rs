//! Line-oriented console harness.
//!
//! Every input line triggers one admission decision; the outcome is written
//! as `"<elapsed> ms: passed"` or `"<elapsed> ms: limited"`, where elapsed is
//! measured since the previous decision. An empty line, a `quit` line or end
//! of input stops the loop, as does the caller's shutdown future.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::ratelimit::AdmissionControl;

/// Counts of the decisions taken during one console session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleSummary {
    pub passed: u64,
    pub limited: u64,
    pub errors: u64,
}

impl ConsoleSummary {
    pub fn total(&self) -> u64 {
        self.passed + self.limited + self.errors
    }
}

/// Only an empty line or the exact word `quit` ends a session; other
/// whitespace is input like any other.
fn is_terminator(line: &str) -> bool {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.is_empty() || line == "quit"
}

/// Drive `limiter` from `reader`, reporting each decision to `writer`.
///
/// A failed admission is logged and reported as `error`; the loop goes on.
/// I/O failures on either stream end the session with an error. The session
/// also ends once `shutdown` completes, even while a read is still pending.
pub async fn run_console<A, R, W, S>(
    limiter: &A,
    reader: R,
    mut writer: W,
    shutdown: S,
) -> Result<ConsoleSummary>
where
    A: AdmissionControl + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = reader.lines();
    let mut summary = ConsoleSummary::default();
    let mut previous = Instant::now();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => {
                debug!(label = %limiter.label(), "Console stopped by shutdown");
                break;
            }
        };
        let Some(line) = line else { break };

        if is_terminator(&line) {
            debug!(label = %limiter.label(), "Console terminated by input");
            break;
        }

        let outcome = limiter.admit().await;
        let now = Instant::now();
        let elapsed_ms = now.duration_since(previous).as_millis();
        previous = now;

        let verdict = match outcome {
            Ok(true) => {
                summary.passed += 1;
                "passed"
            }
            Ok(false) => {
                summary.limited += 1;
                "limited"
            }
            Err(e) => {
                if e.is_store_error() {
                    warn!(label = %limiter.label(), error = %e, "Store failure during admission");
                } else {
                    error!(label = %limiter.label(), error = %e, "Admission check failed");
                }
                summary.errors += 1;
                "error"
            }
        };

        writer
            .write_all(format!("{elapsed_ms} ms: {verdict}\n").as_bytes())
            .await?;
        writer.flush().await?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RateWindowError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::future::pending;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::BufReader;

    /// Plays back a fixed list of outcomes.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<bool>>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<bool>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
            }
        }

        fn remaining(&self) -> usize {
            self.outcomes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AdmissionControl for Scripted {
        fn label(&self) -> &str {
            "scripted"
        }

        async fn admit(&self) -> Result<bool> {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("admit called more often than scripted")
        }
    }

    fn verdicts(output: &[u8]) -> Vec<String> {
        String::from_utf8(output.to_vec())
            .unwrap()
            .lines()
            .map(|line| {
                let (elapsed, verdict) = line.split_once(" ms: ").unwrap();
                elapsed.parse::<u128>().unwrap();
                verdict.to_string()
            })
            .collect()
    }

    #[test]
    fn test_terminators() {
        assert!(is_terminator(""));
        assert!(is_terminator("\r"));
        assert!(is_terminator("quit"));
        assert!(is_terminator("quit\r"));
        assert!(!is_terminator("   "));
        assert!(!is_terminator(" quit "));
        assert!(!is_terminator("q"));
        assert!(!is_terminator("quit now"));
        assert!(!is_terminator("x"));
    }

    #[tokio::test]
    async fn test_each_line_is_one_decision() {
        let limiter = Scripted::new(vec![Ok(true), Ok(false), Ok(true)]);
        let mut output = Vec::new();

        let reader = BufReader::new(&b"a\nb\nc\n"[..]);
        let summary = run_console(&limiter, reader, &mut output, pending())
            .await
            .unwrap();

        assert_eq!(verdicts(&output), vec!["passed", "limited", "passed"]);
        assert_eq!(
            summary,
            ConsoleSummary {
                passed: 2,
                limited: 1,
                errors: 0
            }
        );
    }

    #[tokio::test]
    async fn test_quit_stops_before_admission() {
        let limiter = Scripted::new(vec![Ok(true), Ok(true)]);
        let mut output = Vec::new();

        let reader = BufReader::new(&b"go\nquit\ngo\n"[..]);
        let summary = run_console(&limiter, reader, &mut output, pending())
            .await
            .unwrap();

        assert_eq!(summary.total(), 1);
        assert_eq!(limiter.remaining(), 1);
    }

    #[tokio::test]
    async fn test_empty_line_stops() {
        let limiter = Scripted::new(vec![Ok(true)]);
        let mut output = Vec::new();

        let reader = BufReader::new(&b"\r\nignored\n"[..]);
        let summary = run_console(&limiter, reader, &mut output, pending())
            .await
            .unwrap();

        assert_eq!(summary.total(), 0);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_lines_are_decisions() {
        let limiter = Scripted::new(vec![Ok(true), Ok(false)]);
        let mut output = Vec::new();

        let reader = BufReader::new(&b"   \n quit \nquit\n"[..]);
        let summary = run_console(&limiter, reader, &mut output, pending())
            .await
            .unwrap();

        assert_eq!(verdicts(&output), vec!["passed", "limited"]);
        assert_eq!(summary.total(), 2);
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_session_while_read_is_pending() {
        // The writing half stays open, so the next read never completes.
        let (mut input, console_side) = tokio::io::duplex(64);
        input.write_all(b"first\n").await.unwrap();
        let limiter = Scripted::new(vec![Ok(true), Ok(true)]);
        let mut output = Vec::new();

        let session = run_console(
            &limiter,
            BufReader::new(console_side),
            &mut output,
            tokio::time::sleep(Duration::from_millis(50)),
        );
        let summary = tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .expect("session ignored shutdown")
            .unwrap();

        assert_eq!(verdicts(&output), vec!["passed"]);
        assert_eq!(summary.total(), 1);
        assert_eq!(limiter.remaining(), 1);
        drop(input);
    }

    #[tokio::test]
    async fn test_clock_error_is_reported_and_loop_continues() {
        let limiter = Scripted::new(vec![
            Err(RateWindowError::Clock(crate::clock::ClockError::BeforeEpoch)),
            Ok(false),
        ]);
        let mut output = Vec::new();

        let reader = BufReader::new(&b"1\n2\n"[..]);
        let summary = run_console(&limiter, reader, &mut output, pending())
            .await
            .unwrap();

        assert_eq!(verdicts(&output), vec!["error", "limited"]);
        assert_eq!(summary.errors, 1);
    }

    #[tokio::test]
    async fn test_store_error_is_reported_and_loop_continues() {
        let limiter = Scripted::new(vec![
            Err(RateWindowError::StoreUnavailable("connection refused".into())),
            Ok(true),
        ]);
        let mut output = Vec::new();

        let reader = BufReader::new(&b"1\n2\n"[..]);
        let summary = run_console(&limiter, reader, &mut output, pending())
            .await
            .unwrap();

        assert_eq!(verdicts(&output), vec!["error", "passed"]);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.passed, 1);
    }

    #[tokio::test]
    async fn test_input_arriving_in_chunks() {
        let reader = tokio_test::io::Builder::new()
            .read(b"fir")
            .read(b"st\nsec")
            .read(b"ond\n")
            .build();
        let limiter = Scripted::new(vec![Ok(true), Ok(false)]);
        let mut output = Vec::new();

        let summary = run_console(&limiter, BufReader::new(reader), &mut output, pending())
            .await
            .unwrap();

        assert_eq!(verdicts(&output), vec!["passed", "limited"]);
        assert_eq!(summary.total(), 2);
    }

    #[tokio::test]
    async fn test_read_failure_ends_session() {
        let reader = tokio_test::io::Builder::new()
            .read(b"one\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let limiter = Scripted::new(vec![Ok(true)]);
        let mut output = Vec::new();

        let err = run_console(&limiter, BufReader::new(reader), &mut output, pending())
            .await
            .unwrap_err();

        assert!(matches!(err, RateWindowError::Io(_)));
        assert_eq!(verdicts(&output), vec!["passed"]);
    }
}
