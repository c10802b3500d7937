use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use storage::repository::{StateDelta, StateStore};
use study_core::attendance::GradeStanding;
use study_core::model::{AttendanceSummary, CourseId, GradeDraft};

use super::review_worker::Reply;
use super::snapshot::{AttendanceState, Versioned};
use crate::error::EngineError;

pub(crate) enum AttendanceCommand {
    Record {
        course_id: CourseId,
        date: NaiveDate,
        present: bool,
        reply: Reply<AttendanceSummary>,
    },
    Grade {
        draft: GradeDraft,
        reply: Reply<GradeStanding>,
    },
}

/// Owns attendance records and grades; the only writer of either.
pub(crate) struct AttendanceWorker {
    store: Arc<dyn StateStore>,
    published: watch::Sender<Arc<Versioned<AttendanceState>>>,
}

impl AttendanceWorker {
    pub(crate) fn new(
        store: Arc<dyn StateStore>,
        published: watch::Sender<Arc<Versioned<AttendanceState>>>,
    ) -> Self {
        Self { store, published }
    }

    pub(crate) async fn run(self, mut commands: mpsc::Receiver<AttendanceCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                AttendanceCommand::Record {
                    course_id,
                    date,
                    present,
                    reply,
                } => {
                    let result = self.record(course_id, date, present).await;
                    let _ = reply.send(result);
                }
                AttendanceCommand::Grade { draft, reply } => {
                    let result = self.grade(draft).await;
                    let _ = reply.send(result);
                }
            }
        }
        debug!("attendance worker stopped");
    }

    async fn record(
        &self,
        course_id: CourseId,
        date: NaiveDate,
        present: bool,
    ) -> Result<AttendanceSummary, EngineError> {
        let current = self.published.borrow().clone();
        let mut next = current.value.clone();
        let record = next.tracker.add_record(course_id, date, present)?;

        if let Err(err) = self.store.save_state(&StateDelta::attendance(record)).await {
            warn!(course_id = %course_id, %date, error = %err, "attendance write failed");
            return Err(err.into());
        }

        let summary = next.tracker.summary(course_id);
        if summary.at_risk {
            warn!(
                course_id = %course_id,
                percentage = summary.percentage,
                cutoff = summary.cutoff,
                classes_needed = ?next.tracker.classes_needed(course_id),
                "course attendance below cutoff"
            );
        } else {
            info!(course_id = %course_id, percentage = summary.percentage, "attendance recorded");
        }
        self.published.send_replace(current.succeed(next));
        Ok(summary)
    }

    async fn grade(&self, draft: GradeDraft) -> Result<GradeStanding, EngineError> {
        let current = self.published.borrow().clone();
        let mut next = current.value.clone();
        let entry = draft
            .into_entry(next.tracker.grades().next_grade_id())
            .map_err(EngineError::invalid)?;
        let course_id = entry.course_id();

        if let Err(err) = self.store.save_state(&StateDelta::grade(entry.clone())).await {
            warn!(course_id = %course_id, error = %err, "grade write failed");
            return Err(err.into());
        }
        next.tracker.add_grade(entry);

        let standing = next.tracker.standing(course_id);
        info!(
            course_id = %course_id,
            current_percent = standing.current_percent,
            required_percent = standing.required_percent,
            below_target = standing.below_target,
            "grade recorded"
        );
        self.published.send_replace(current.succeed(next));
        Ok(standing)
    }
}
