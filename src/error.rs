//! Errors returned by sessions, the manager and connections.

use uttt_rules::RuleError;

use crate::db::{GameId, StoreError};

/// Failure of a session-level operation.
#[derive(Debug, Clone, derive_more::Display)]
pub enum SessionError {
    /// The move was rejected by the rules.
    #[display("{}", _0)]
    Rule(RuleError),

    /// The subscription is not registered on the session.
    #[display("invalid subscription handle")]
    InvalidHandle,

    /// The store failed.
    #[display("{}", _0)]
    Store(StoreError),

    /// The connection does not hold this game.
    #[display("game {} is not open on this connection", _0)]
    UnknownGame(GameId),

    /// The fan-in task is no longer running.
    #[display("fan-in task stopped")]
    FanInStopped,

    /// The owning manager has been dropped.
    #[display("session manager is gone")]
    ManagerGone,
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Rule(err) => Some(err),
            SessionError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RuleError> for SessionError {
    fn from(err: RuleError) -> Self {
        SessionError::Rule(err)
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Store(err)
    }
}

impl SessionError {
    /// Returns true for errors a client caused and can recover from.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SessionError::Rule(_) | SessionError::InvalidHandle | SessionError::UnknownGame(_)
        )
    }
}
