use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{SessionId, TopicId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("unknown session status: {0}")]
    UnknownStatus(String),

    #[error("session duration must be > 0 minutes")]
    ZeroDuration,
}

/// Where a study session is in its life.
///
/// `Completed` and `Missed` sessions are history and never rewritten by a re-plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Planned,
    Completed,
    Missed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Planned => "planned",
            SessionStatus::Completed => "completed",
            SessionStatus::Missed => "missed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "completed" => Ok(Self::Completed),
            "missed" => Ok(Self::Missed),
            other => Err(SessionError::UnknownStatus(other.to_owned())),
        }
    }
}

/// A block of study time allocated to one topic on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySession {
    pub id: SessionId,
    pub topic_id: TopicId,
    pub scheduled_date: NaiveDate,
    pub duration_minutes: u32,
    pub status: SessionStatus,
}

impl StudySession {
    #[must_use]
    pub fn planned(
        id: SessionId,
        topic_id: TopicId,
        scheduled_date: NaiveDate,
        duration_minutes: u32,
    ) -> Self {
        Self {
            id,
            topic_id,
            scheduled_date,
            duration_minutes,
            status: SessionStatus::Planned,
        }
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ZeroDuration` for an empty session.
    pub fn from_persisted(
        id: SessionId,
        topic_id: TopicId,
        scheduled_date: NaiveDate,
        duration_minutes: u32,
        status: SessionStatus,
    ) -> Result<Self, SessionError> {
        if duration_minutes == 0 {
            return Err(SessionError::ZeroDuration);
        }
        Ok(Self {
            id,
            topic_id,
            scheduled_date,
            duration_minutes,
            status,
        })
    }

    /// Completed and missed sessions are immutable history.
    #[must_use]
    pub fn is_history(&self) -> bool {
        !matches!(self.status, SessionStatus::Planned)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.status, SessionStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_today;

    #[test]
    fn planned_sessions_are_not_history() {
        let session =
            StudySession::planned(SessionId::new(1), TopicId::new(1), fixed_today(), 60);
        assert!(!session.is_history());
        assert!(!session.is_completed());
    }

    #[test]
    fn persisted_session_requires_duration() {
        let err = StudySession::from_persisted(
            SessionId::new(1),
            TopicId::new(1),
            fixed_today(),
            0,
            SessionStatus::Missed,
        )
        .unwrap_err();
        assert_eq!(err, SessionError::ZeroDuration);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            SessionStatus::Planned,
            SessionStatus::Completed,
            SessionStatus::Missed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
    }
}
