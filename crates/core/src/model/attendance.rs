use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, RecordId};

/// One class meeting for one course. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub course_id: CourseId,
    pub date: NaiveDate,
    pub present: bool,
}

impl AttendanceRecord {
    #[must_use]
    pub fn new(id: RecordId, course_id: CourseId, date: NaiveDate, present: bool) -> Self {
        Self {
            id,
            course_id,
            date,
            present,
        }
    }
}

/// Derived attendance state for a course; recomputed from records on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub course_id: CourseId,
    pub present_count: u32,
    pub total_count: u32,
    /// Fraction in `[0, 1]`; `0` when no classes are recorded.
    pub percentage: f64,
    pub cutoff: f64,
    pub at_risk: bool,
}
