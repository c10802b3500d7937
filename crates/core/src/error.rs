use thiserror::Error;

use crate::attendance::AttendanceError;
use crate::model::{CardError, GradeError, ReviewError, SessionError, TopicError};
use crate::settings::SettingsError;

/// Any validation failure raised by the domain layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error(transparent)]
    Card(#[from] CardError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Grade(#[from] GradeError),
    #[error(transparent)]
    Attendance(#[from] AttendanceError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
