//! Connection supervision.
//!
//! ```text
//!            dial ok                 other session error
//! Connecting ───────▶ Streaming ──────────────────────────▶ Connecting
//!     │                   │
//!     │ dial failed       │ end of data
//!     ▼                   ▼
//!  Backoff ──▶ Connecting   Terminated
//!     │
//!     │ more than `max_failures` in a row
//!     ▼
//! Terminated
//! ```
//!
//! Only failed dials count towards termination. A session that breaks for any
//! reason other than end of data is redialled immediately.

use crate::error::Error;
use crate::pipeline::SessionEnd;
use crate::transport::Dial;
use log::*;
use std::time::Duration;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_DIAL_FAILURES: u32 = 60;

#[derive(Debug, Clone)]
pub struct Supervisor {
    max_failures: u32,
    retry_interval: Duration,
    failures: u32,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIAL_FAILURES, DEFAULT_RETRY_INTERVAL)
    }
}

impl Supervisor {
    pub fn new(max_failures: u32, retry_interval: Duration) -> Self {
        Self {
            max_failures,
            retry_interval,
            failures: 0,
        }
    }

    /// Consecutive failed dials since the last successful one.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Dials and hands every connection to `session` until a terminal
    /// condition occurs, which is returned.
    pub fn run<D, F>(&mut self, dialer: &mut D, mut session: F) -> Error
    where
        D: Dial,
        F: FnMut(D::Stream) -> SessionEnd,
    {
        loop {
            match dialer.dial() {
                Ok(stream) => {
                    info!("Connected to {}", dialer.peer());
                    self.failures = 0;
                    match session(stream) {
                        SessionEnd::EndOfStream => {
                            error!("End of data from {}", dialer.peer());
                            return Error::EndOfStream(dialer.peer().to_string());
                        }
                        SessionEnd::Failed(err) => {
                            error!("Error reading stream from {}: {err}", dialer.peer());
                        }
                    }
                }
                Err(err) => {
                    self.failures += 1;
                    error!(
                        "Error '{err}' trying to connect to '{}' ({}/{})",
                        dialer.peer(),
                        self.failures,
                        self.max_failures
                    );
                    if self.failures > self.max_failures {
                        return Error::DialBudgetExhausted {
                            address: dialer.peer().to_string(),
                            failures: self.failures,
                        };
                    }
                    std::thread::sleep(self.retry_interval);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::ScriptedStream;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;
    use std::io;

    /// Dialer succeeding or failing as scripted; fails once the script runs out.
    struct ScriptedDialer {
        script: VecDeque<bool>,
        attempts: u32,
    }

    impl ScriptedDialer {
        fn new(script: impl IntoIterator<Item = bool>) -> Self {
            Self {
                script: script.into_iter().collect(),
                attempts: 0,
            }
        }
    }

    impl Dial for ScriptedDialer {
        type Stream = ScriptedStream;

        fn dial(&mut self) -> io::Result<ScriptedStream> {
            self.attempts += 1;
            if self.script.pop_front().unwrap_or(false) {
                Ok(ScriptedStream::default())
            } else {
                Err(io::ErrorKind::ConnectionRefused.into())
            }
        }

        fn peer(&self) -> &str {
            "heatpump:502"
        }
    }

    fn supervisor(max_failures: u32) -> Supervisor {
        Supervisor::new(max_failures, Duration::ZERO)
    }

    #[test]
    fn terminates_after_budget_plus_one_failures() {
        let mut dialer = ScriptedDialer::new([]);
        let error = supervisor(3).run(&mut dialer, |_| unreachable!("never connected"));
        assert_matches!(error, Error::DialBudgetExhausted { failures: 4, .. });
        assert_eq!(dialer.attempts, 4);
    }

    #[test]
    fn success_resets_failure_count() {
        let mut dialer = ScriptedDialer::new([false, false, false, true]);
        let mut sessions = 0;
        let mut supervisor = supervisor(3);
        let error = supervisor.run(&mut dialer, |_| {
            sessions += 1;
            SessionEnd::Failed(io::ErrorKind::ConnectionReset.into())
        });
        assert_matches!(error, Error::DialBudgetExhausted { failures: 4, .. });
        assert_eq!(sessions, 1);
        assert_eq!(dialer.attempts, 8);
        assert_eq!(supervisor.failures(), 4);
    }

    #[test]
    fn session_errors_do_not_count() {
        let mut dialer = ScriptedDialer::new([true; 10]);
        let mut sessions = 0;
        let error = supervisor(0).run(&mut dialer, |_| {
            sessions += 1;
            SessionEnd::Failed(io::ErrorKind::BrokenPipe.into())
        });
        assert_eq!(sessions, 10);
        assert_matches!(error, Error::DialBudgetExhausted { failures: 1, .. });
    }

    #[test]
    fn end_of_stream_terminates() {
        let mut dialer = ScriptedDialer::new([false, true, true]);
        let error = supervisor(5).run(&mut dialer, |_| SessionEnd::EndOfStream);
        assert_matches!(error, Error::EndOfStream(peer) if peer == "heatpump:502");
        assert_eq!(dialer.attempts, 2);
    }
}
