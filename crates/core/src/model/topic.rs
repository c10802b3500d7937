use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{CourseId, TopicId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TopicError {
    #[error("topic title cannot be empty")]
    EmptyTitle,

    #[error("estimated effort must be > 0 minutes")]
    ZeroEffort,

    #[error("unknown topic status: {0}")]
    UnknownStatus(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a syllabus topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Pending,
    InProgress,
    Done,
}

impl TopicStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TopicStatus::Pending => "pending",
            TopicStatus::InProgress => "in_progress",
            TopicStatus::Done => "done",
        }
    }

    /// Whether the planner should still allocate time to a topic in this state.
    #[must_use]
    pub fn is_open(self) -> bool {
        !matches!(self, TopicStatus::Done)
    }
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicStatus {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(TopicError::UnknownStatus(other.to_owned())),
        }
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Topic as extracted from a syllabus import or typed in by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDraft {
    pub title: String,
    #[serde(default)]
    pub course_id: Option<CourseId>,
    pub estimated_effort_minutes: u32,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

impl TopicDraft {
    #[must_use]
    pub fn new(title: impl Into<String>, estimated_effort_minutes: u32) -> Self {
        Self {
            title: title.into(),
            course_id: None,
            estimated_effort_minutes,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: NaiveDate) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }

    /// Validate the draft and assign it an id. New topics always start `Pending`.
    ///
    /// # Errors
    ///
    /// Returns `TopicError::EmptyTitle` for a blank title and
    /// `TopicError::ZeroEffort` when no effort is estimated.
    pub fn into_topic(self, id: TopicId) -> Result<Topic, TopicError> {
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(TopicError::EmptyTitle);
        }
        if self.estimated_effort_minutes == 0 {
            return Err(TopicError::ZeroEffort);
        }

        Ok(Topic {
            id,
            course_id: self.course_id,
            title,
            estimated_effort_minutes: self.estimated_effort_minutes,
            deadline: self.deadline,
            status: TopicStatus::Pending,
            archived: false,
        })
    }
}

//
// ─── TOPIC ─────────────────────────────────────────────────────────────────────
//

/// A unit of syllabus work the planner allocates study time to.
///
/// Topics are never deleted; [`Topic::archive`] removes them from planning
/// while keeping their session history addressable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topic {
    id: TopicId,
    course_id: Option<CourseId>,
    title: String,
    estimated_effort_minutes: u32,
    deadline: Option<NaiveDate>,
    status: TopicStatus,
    archived: bool,
}

impl Topic {
    /// Rehydrate a topic from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `TopicError` if the persisted title or effort is invalid.
    pub fn from_persisted(
        id: TopicId,
        course_id: Option<CourseId>,
        title: String,
        estimated_effort_minutes: u32,
        deadline: Option<NaiveDate>,
        status: TopicStatus,
        archived: bool,
    ) -> Result<Self, TopicError> {
        let mut topic = TopicDraft {
            title,
            course_id,
            estimated_effort_minutes,
            deadline,
        }
        .into_topic(id)?;
        topic.status = status;
        topic.archived = archived;
        Ok(topic)
    }

    #[must_use]
    pub fn id(&self) -> TopicId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> Option<CourseId> {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn estimated_effort_minutes(&self) -> u32 {
        self.estimated_effort_minutes
    }

    #[must_use]
    pub fn deadline(&self) -> Option<NaiveDate> {
        self.deadline
    }

    #[must_use]
    pub fn status(&self) -> TopicStatus {
        self.status
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived
    }

    /// True when the planner should consider this topic at all.
    #[must_use]
    pub fn is_schedulable(&self) -> bool {
        self.status.is_open() && !self.archived
    }

    /// Replace title, course, effort and deadline from an edited draft.
    /// Status and archive flag are kept.
    ///
    /// # Errors
    ///
    /// Returns `TopicError` if the edited values are invalid; the topic is left unchanged.
    pub fn apply_edit(&mut self, draft: TopicDraft) -> Result<(), TopicError> {
        let edited = draft.into_topic(self.id)?;
        self.title = edited.title;
        self.course_id = edited.course_id;
        self.estimated_effort_minutes = edited.estimated_effort_minutes;
        self.deadline = edited.deadline;
        Ok(())
    }

    pub fn set_deadline(&mut self, deadline: Option<NaiveDate>) {
        self.deadline = deadline;
    }

    /// Moves a pending topic to in-progress; other states are unchanged.
    pub fn start(&mut self) {
        if self.status == TopicStatus::Pending {
            self.status = TopicStatus::InProgress;
        }
    }

    pub fn mark_done(&mut self) {
        self.status = TopicStatus::Done;
    }

    pub fn archive(&mut self) {
        self.archived = true;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_today;

    #[test]
    fn draft_trims_title_and_starts_pending() {
        let topic = TopicDraft::new("  Linear algebra ", 90)
            .into_topic(TopicId::new(1))
            .unwrap();

        assert_eq!(topic.title(), "Linear algebra");
        assert_eq!(topic.status(), TopicStatus::Pending);
        assert!(topic.is_schedulable());
    }

    #[test]
    fn draft_rejects_blank_title_and_zero_effort() {
        assert_eq!(
            TopicDraft::new("   ", 30).into_topic(TopicId::new(1)),
            Err(TopicError::EmptyTitle)
        );
        assert_eq!(
            TopicDraft::new("Sets", 0).into_topic(TopicId::new(1)),
            Err(TopicError::ZeroEffort)
        );
    }

    #[test]
    fn edit_keeps_status_and_rejects_invalid_values() {
        let mut topic = TopicDraft::new("Graphs", 60)
            .into_topic(TopicId::new(4))
            .unwrap();
        topic.start();

        topic
            .apply_edit(TopicDraft::new("Graph theory", 120).with_deadline(fixed_today()))
            .unwrap();
        assert_eq!(topic.title(), "Graph theory");
        assert_eq!(topic.deadline(), Some(fixed_today()));
        assert_eq!(topic.status(), TopicStatus::InProgress);

        let err = topic.apply_edit(TopicDraft::new("", 10)).unwrap_err();
        assert_eq!(err, TopicError::EmptyTitle);
        assert_eq!(topic.title(), "Graph theory");
    }

    #[test]
    fn start_only_moves_pending_topics() {
        let mut topic = TopicDraft::new("Trees", 30)
            .into_topic(TopicId::new(2))
            .unwrap();
        topic.mark_done();
        topic.start();
        assert_eq!(topic.status(), TopicStatus::Done);
        assert!(!topic.is_schedulable());
    }

    #[test]
    fn archived_topics_are_not_schedulable() {
        let mut topic = TopicDraft::new("Old unit", 30)
            .into_topic(TopicId::new(3))
            .unwrap();
        topic.archive();
        assert!(!topic.is_schedulable());
    }

    #[test]
    fn status_parses_its_own_string_form() {
        for status in [
            TopicStatus::Pending,
            TopicStatus::InProgress,
            TopicStatus::Done,
        ] {
            assert_eq!(status.as_str().parse::<TopicStatus>().unwrap(), status);
        }
        assert!("archived".parse::<TopicStatus>().is_err());
    }
}
