use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use study_core::attendance::{RiskAlert, RiskTracker};
use study_core::model::{AttendanceSummary, Flashcard, StudySession, Topic};
use study_core::planner::{Plan, PlanWarning};
use study_core::scheduler::CardDeck;

/// Immutable state published by a worker after each commit.
#[derive(Debug)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

impl<T> Versioned<T> {
    pub(crate) fn initial(value: T) -> Arc<Self> {
        Arc::new(Self { version: 0, value })
    }

    pub(crate) fn succeed(&self, value: T) -> Arc<Self> {
        Arc::new(Self {
            version: self.version + 1,
            value,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewState {
    pub deck: CardDeck,
}

#[derive(Debug, Clone, Default)]
pub struct PlanState {
    /// Topics in id order, archived ones included.
    pub topics: Vec<Topic>,
    pub plan: Plan,
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceState {
    pub tracker: RiskTracker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FamilyVersions {
    pub review: u64,
    pub planner: u64,
    pub attendance: u64,
}

/// Read-only view across the three families, assembled from their latest
/// published snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub as_of: NaiveDate,
    pub due_cards: Vec<Flashcard>,
    pub upcoming_sessions: Vec<StudySession>,
    pub at_risk_courses: Vec<AttendanceSummary>,
    pub alerts: Vec<RiskAlert>,
    pub warnings: Vec<PlanWarning>,
    pub versions: FamilyVersions,
}

impl DashboardSnapshot {
    pub(crate) fn assemble(
        as_of: NaiveDate,
        review: &Versioned<ReviewState>,
        plan: &Versioned<PlanState>,
        attendance: &Versioned<AttendanceState>,
    ) -> Self {
        let tracker = &attendance.value.tracker;
        Self {
            as_of,
            due_cards: review.value.deck.peek_due(as_of).cloned().collect(),
            upcoming_sessions: plan.value.plan.upcoming(as_of).cloned().collect(),
            at_risk_courses: tracker.at_risk_courses().collect(),
            alerts: tracker.alerts(),
            warnings: plan.value.plan.warnings.clone(),
            versions: FamilyVersions {
                review: review.version,
                planner: plan.version,
                attendance: attendance.version,
            },
        }
    }
}
