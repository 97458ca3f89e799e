//! Operator-driven error recovery for copy operations.
//!
//! When a file fails to copy, the engine asks an [`ErrorHandler`] what to do
//! and blocks until it answers. A [`RecoverySession`] tracks the answers for
//! one invocation: once the operator picks `SkipAll`, the session is latched
//! and every later failure is skipped without asking again.

use crate::error::FileOpError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The operator's answer to a failure prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDecision {
    /// Try the same entry again
    Retry,
    /// Abandon this entry and continue
    Skip,
    /// Abandon this entry and every later failing one without asking
    SkipAll,
    /// Stop the whole operation
    Abort,
    /// Dismiss the completion prompt; not an answer to a failure
    Done,
}

/// What the engine does next after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Retry,
    Skip,
    Abort,
}

/// Where a session stands in the recovery protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryState {
    #[default]
    Idle,
    AwaitingDecision,
    Latched,
    Aborted,
}

/// A failure presented to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct CopyFailure {
    /// Source path being copied when the failure happened
    pub path: PathBuf,
    /// Rendered error message
    pub message: String,
    /// How many times this entry has been retried already
    pub attempt: u32,
}

/// Something that can answer failure prompts.
pub trait ErrorHandler {
    /// Block until the operator decides what to do about `failure`.
    fn decide(&mut self, failure: &CopyFailure) -> ErrorDecision;
}

impl<F> ErrorHandler for F
where
    F: FnMut(&CopyFailure) -> ErrorDecision,
{
    fn decide(&mut self, failure: &CopyFailure) -> ErrorDecision {
        self(failure)
    }
}

/// Handler that aborts on the first failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnError;

impl ErrorHandler for AbortOnError {
    fn decide(&mut self, _failure: &CopyFailure) -> ErrorDecision {
        ErrorDecision::Abort
    }
}

/// Handler that skips every failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipErrors;

impl ErrorHandler for SkipErrors {
    fn decide(&mut self, _failure: &CopyFailure) -> ErrorDecision {
        ErrorDecision::Skip
    }
}

/// Recovery state owned by a single copy invocation.
#[derive(Debug, Default)]
pub struct RecoverySession {
    state: RecoveryState,
    ignore_all: bool,
    /// Files processed so far
    pub file_count: u64,
    /// Directories processed so far
    pub directory_count: u64,
    /// Prompts actually shown to the operator
    pub prompts: u64,
    /// Failures resolved by skipping, with the message that caused them
    pub skipped: Vec<(PathBuf, String)>,
}

impl RecoverySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Whether SkipAll has been chosen in this session.
    pub fn is_latched(&self) -> bool {
        self.ignore_all
    }

    /// Resolve a failure, asking `handler` unless the session is latched.
    pub fn resolve(
        &mut self,
        path: &Path,
        error: &FileOpError,
        attempt: u32,
        handler: &mut dyn ErrorHandler,
    ) -> Resolution {
        if self.ignore_all {
            tracing::debug!(path = %path.display(), error = %error, "auto-skipping after SkipAll");
            self.record_skip(path, error);
            return Resolution::Skip;
        }

        let failure = CopyFailure {
            path: path.to_path_buf(),
            message: error.to_string(),
            attempt,
        };

        loop {
            self.state = RecoveryState::AwaitingDecision;
            self.prompts += 1;

            match handler.decide(&failure) {
                ErrorDecision::Retry => {
                    self.state = RecoveryState::Idle;
                    return Resolution::Retry;
                }
                ErrorDecision::Skip => {
                    self.state = RecoveryState::Idle;
                    self.record_skip(path, error);
                    return Resolution::Skip;
                }
                ErrorDecision::SkipAll => {
                    self.state = RecoveryState::Latched;
                    self.ignore_all = true;
                    self.record_skip(path, error);
                    return Resolution::Skip;
                }
                ErrorDecision::Abort => {
                    self.state = RecoveryState::Aborted;
                    return Resolution::Abort;
                }
                ErrorDecision::Done => {
                    tracing::warn!(path = %path.display(), "Done is not a failure decision, asking again");
                }
            }
        }
    }

    fn record_skip(&mut self, path: &Path, error: &FileOpError) {
        self.skipped.push((path.to_path_buf(), error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn io_error() -> FileOpError {
        FileOpError::Io(std::io::Error::other("disk on fire"))
    }

    struct Scripted {
        answers: VecDeque<ErrorDecision>,
        asked: usize,
    }

    impl Scripted {
        fn new(answers: &[ErrorDecision]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                asked: 0,
            }
        }
    }

    impl ErrorHandler for Scripted {
        fn decide(&mut self, _failure: &CopyFailure) -> ErrorDecision {
            self.asked += 1;
            self.answers.pop_front().unwrap_or(ErrorDecision::Abort)
        }
    }

    #[test]
    fn test_retry_and_skip_return_to_idle() {
        let mut session = RecoverySession::new();
        let mut handler = Scripted::new(&[ErrorDecision::Retry, ErrorDecision::Skip]);
        let err = io_error();

        let first = session.resolve(Path::new("a"), &err, 0, &mut handler);
        assert_eq!(first, Resolution::Retry);
        assert_eq!(session.state(), RecoveryState::Idle);

        let second = session.resolve(Path::new("a"), &err, 1, &mut handler);
        assert_eq!(second, Resolution::Skip);
        assert_eq!(session.state(), RecoveryState::Idle);
        assert_eq!(session.skipped.len(), 1);
    }

    #[test]
    fn test_skip_all_latches() {
        let mut session = RecoverySession::new();
        let mut handler = Scripted::new(&[ErrorDecision::SkipAll]);
        let err = io_error();

        assert_eq!(
            session.resolve(Path::new("a"), &err, 0, &mut handler),
            Resolution::Skip
        );
        assert!(session.is_latched());
        assert_eq!(session.state(), RecoveryState::Latched);

        for name in ["b", "c", "d"] {
            assert_eq!(
                session.resolve(Path::new(name), &err, 0, &mut handler),
                Resolution::Skip
            );
        }
        assert_eq!(handler.asked, 1);
        assert_eq!(session.prompts, 1);
        assert_eq!(session.skipped.len(), 4);
    }

    #[test]
    fn test_abort_is_terminal() {
        let mut session = RecoverySession::new();
        let err = io_error();

        let resolution = session.resolve(Path::new("a"), &err, 0, &mut AbortOnError);
        assert_eq!(resolution, Resolution::Abort);
        assert_eq!(session.state(), RecoveryState::Aborted);
    }

    #[test]
    fn test_done_reprompts() {
        let mut session = RecoverySession::new();
        let mut handler = Scripted::new(&[ErrorDecision::Done, ErrorDecision::Skip]);
        let err = io_error();

        let resolution = session.resolve(Path::new("a"), &err, 0, &mut handler);
        assert_eq!(resolution, Resolution::Skip);
        assert_eq!(handler.asked, 2);
        assert!(!session.is_latched());
    }

    #[test]
    fn test_new_session_is_not_latched() {
        let mut latched = RecoverySession::new();
        latched.resolve(
            Path::new("a"),
            &io_error(),
            0,
            &mut |_: &CopyFailure| ErrorDecision::SkipAll,
        );
        assert!(latched.is_latched());

        let fresh = RecoverySession::new();
        assert!(!fresh.is_latched());
        assert_eq!(fresh.state(), RecoveryState::Idle);
    }
}
