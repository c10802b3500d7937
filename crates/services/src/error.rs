//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use study_core::attendance::AttendanceError;
use study_core::model::{CardId, ReviewError, SessionId, TopicId};

/// Errors emitted by the scheduling engine.
///
/// Every variant except `StorageUnavailable` and `WorkerStopped` is raised
/// before any state is touched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    InvalidGrade(#[from] ReviewError),

    #[error(transparent)]
    DuplicateRecord(#[from] AttendanceError),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    #[error("card {0} not found")]
    CardNotFound(CardId),

    #[error("topic {0} not found")]
    TopicNotFound(TopicId),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {0} is already history")]
    SessionClosed(SessionId),

    #[error(transparent)]
    InvalidInput(#[from] study_core::Error),

    #[error("{0} worker stopped")]
    WorkerStopped(&'static str),
}

impl EngineError {
    pub(crate) fn invalid(err: impl Into<study_core::Error>) -> Self {
        Self::InvalidInput(err.into())
    }
}
