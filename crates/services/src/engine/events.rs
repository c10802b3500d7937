use chrono::NaiveDate;
use serde::Serialize;

use study_core::attendance::GradeStanding;
use study_core::model::{
    AttendanceSummary, CardDraft, CardId, CourseId, Flashcard, GradeDraft, SessionId,
    StudySession, TopicDraft, TopicId,
};
use study_core::planner::PlanWarning;

/// Why a re-plan was requested. Variants that change a topic or session
/// are applied before the planner runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplanReason {
    TopicAdded(TopicDraft),
    TopicEdited { topic_id: TopicId, draft: TopicDraft },
    TopicCompleted(TopicId),
    TopicArchived(TopicId),
    DeadlineChanged {
        topic_id: TopicId,
        deadline: Option<NaiveDate>,
    },
    SessionCompleted(SessionId),
    /// Time moved on; planned sessions in the past become missed.
    TimeTick,
    Manual,
}

impl ReplanReason {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::TopicAdded(_) => "topic_added",
            Self::TopicEdited { .. } => "topic_edited",
            Self::TopicCompleted(_) => "topic_completed",
            Self::TopicArchived(_) => "topic_archived",
            Self::DeadlineChanged { .. } => "deadline_changed",
            Self::SessionCompleted(_) => "session_completed",
            Self::TimeTick => "time_tick",
            Self::Manual => "manual",
        }
    }
}

/// Outcome of a committed re-plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    /// Full session list, history included, ordered by date then id.
    pub sessions: Vec<StudySession>,
    pub warnings: Vec<PlanWarning>,
    /// Topic created or changed by the triggering event, if any.
    pub touched_topic: Option<TopicId>,
    pub version: u64,
}

/// Domain event accepted by [`Engine::dispatch`](super::Engine::dispatch).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CardReviewed { card_id: CardId, quality: u8 },
    CardAdded(CardDraft),
    Replan(ReplanReason),
    AttendanceMarked {
        course_id: CourseId,
        date: NaiveDate,
        present: bool,
    },
    GradeRecorded(GradeDraft),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EngineOutcome {
    Card(Flashcard),
    Plan(PlanReport),
    Attendance(AttendanceSummary),
    Grade(GradeStanding),
}
