//! Errors from the player and game store.

use derive_more::{Display, Error};
use tracing::instrument;
use uttt_rules::RuleError;

/// A player or game record could not be read or written.
///
/// Carries the source location that raised it, so a failed flush in a
/// background timer can still be traced to the call that failed.
#[derive(Debug, Clone, Display, Error)]
#[display("Game store error: {} at {}:{}", message, file, line)]
pub struct StoreError {
    /// What failed, including the game or player id when known.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StoreError {
    /// Creates an error located at the caller.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<diesel::result::Error> for StoreError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        Self::new(format!("Diesel error: {}", err))
    }
}

impl From<diesel::ConnectionError> for StoreError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::new(format!("Connection error: {}", err))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(format!("Blocking task failed: {}", err))
    }
}

// A stored game that no longer loads is corrupt data, not a rejected move.
impl From<RuleError> for StoreError {
    #[track_caller]
    fn from(err: RuleError) -> Self {
        Self::new(format!("Stored game is invalid: {}", err))
    }
}
