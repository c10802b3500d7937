//! Attendance tallies, grade standing and the risk alerts derived from them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::model::{AttendanceRecord, AttendanceSummary, CourseId, GradeEntry, GradeId, RecordId};
use crate::settings::AttendancePolicy;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttendanceError {
    #[error("attendance for course {course_id} on {date} is already recorded")]
    DuplicateRecord { course_id: CourseId, date: NaiveDate },
}

//
// ─── LEDGER ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    present: u64,
    total: u64,
}

#[allow(clippy::cast_precision_loss)]
impl Tally {
    fn ratio(self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.present as f64 / self.total as f64
        }
    }

    fn meets(self, cutoff: f64) -> bool {
        if cutoff <= 0.0 {
            return true;
        }
        self.total > 0 && self.present as f64 + EPSILON >= cutoff * self.total as f64
    }

    fn attend(self, classes: u64) -> Self {
        Self {
            present: self.present.saturating_add(classes),
            total: self.total.saturating_add(classes),
        }
    }

    fn miss(self, classes: u64) -> Self {
        Self {
            present: self.present,
            total: self.total.saturating_add(classes),
        }
    }
}

fn saturate(count: u64) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Append-only attendance records, at most one per course per day.
#[derive(Debug, Clone, Default)]
pub struct AttendanceLedger {
    courses: BTreeMap<CourseId, BTreeMap<NaiveDate, AttendanceRecord>>,
    next_id: u64,
}

impl AttendanceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            courses: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// # Errors
    ///
    /// Returns `DuplicateRecord` if two records share a course and date.
    pub fn from_records(
        records: impl IntoIterator<Item = AttendanceRecord>,
    ) -> Result<Self, AttendanceError> {
        let mut ledger = Self::new();
        for record in records {
            ledger.insert(record)?;
        }
        Ok(ledger)
    }

    /// Append a record with the next free id.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRecord` when the course already has a record for
    /// `date`; the ledger is left unchanged.
    pub fn add_record(
        &mut self,
        course_id: CourseId,
        date: NaiveDate,
        present: bool,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let record = AttendanceRecord::new(self.next_record_id(), course_id, date, present);
        self.insert(record.clone())?;
        Ok(record)
    }

    fn insert(&mut self, record: AttendanceRecord) -> Result<(), AttendanceError> {
        let days = self.courses.entry(record.course_id).or_default();
        if days.contains_key(&record.date) {
            return Err(AttendanceError::DuplicateRecord {
                course_id: record.course_id,
                date: record.date,
            });
        }
        self.next_id = self.next_id.max(record.id.value() + 1);
        days.insert(record.date, record);
        Ok(())
    }

    #[must_use]
    pub fn next_record_id(&self) -> RecordId {
        RecordId::new(self.next_id.max(1))
    }

    pub fn courses(&self) -> impl Iterator<Item = CourseId> + '_ {
        self.courses.keys().copied()
    }

    /// Records for one course in date order.
    pub fn records(&self, course_id: CourseId) -> impl Iterator<Item = &AttendanceRecord> + '_ {
        self.courses
            .get(&course_id)
            .into_iter()
            .flat_map(|days| days.values())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.courses.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tally(&self, course_id: CourseId) -> Tally {
        self.records(course_id).fold(Tally::default(), |mut tally, record| {
            tally.total += 1;
            if record.present {
                tally.present += 1;
            }
            tally
        })
    }

    #[must_use]
    pub fn summary(&self, course_id: CourseId, cutoff: f64) -> AttendanceSummary {
        let tally = self.tally(course_id);
        let percentage = tally.ratio();
        AttendanceSummary {
            course_id,
            present_count: saturate(tally.present),
            total_count: saturate(tally.total),
            percentage,
            cutoff,
            at_risk: !tally.meets(cutoff),
        }
    }

    /// Attendance fraction after `additional` more classes of which
    /// `attended` are attended. Does not touch the ledger.
    #[must_use]
    pub fn projected_percentage(&self, course_id: CourseId, additional: u32, attended: u32) -> f64 {
        let attended = attended.min(additional);
        self.tally(course_id)
            .attend(u64::from(attended))
            .miss(u64::from(additional - attended))
            .ratio()
    }

    /// Fewest consecutive attended classes that bring the course back to
    /// `cutoff`. `None` when no number of classes can (a cutoff of 1 with
    /// an absence on record) or when the count does not fit in a `u32`.
    #[must_use]
    pub fn classes_needed(&self, course_id: CourseId, cutoff: f64) -> Option<u32> {
        let tally = self.tally(course_id);
        if tally.meets(cutoff) {
            return Some(0);
        }
        if cutoff >= 1.0 {
            return (tally.present == tally.total).then_some(1);
        }

        // (p + k + e) >= c (t + k)  <=>  k >= (c t - p - e) / (1 - c)
        #[allow(clippy::cast_precision_loss)]
        let estimate =
            (cutoff * tally.total as f64 - tally.present as f64 - EPSILON) / (1.0 - cutoff);
        if !estimate.is_finite() || estimate > f64::from(u32::MAX) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut k = estimate.ceil().max(0.0) as u64;
        while k > 0 && tally.attend(k - 1).meets(cutoff) {
            k -= 1;
        }
        while !tally.attend(k).meets(cutoff) {
            k += 1;
        }
        u32::try_from(k).ok()
    }

    /// Most further absences the course can take while staying at `cutoff`.
    /// `None` means unlimited (cutoff of zero). Counts beyond `u32::MAX`
    /// saturate.
    #[must_use]
    pub fn safe_absences(&self, course_id: CourseId, cutoff: f64) -> Option<u32> {
        if cutoff <= 0.0 {
            return None;
        }
        let tally = self.tally(course_id);
        if !tally.meets(cutoff) {
            return Some(0);
        }
        // p / (t + m) >= c  <=>  m <= p / c - t
        #[allow(clippy::cast_precision_loss)]
        let estimate = tally.present as f64 / cutoff - tally.total as f64;
        if !estimate.is_finite() || estimate >= f64::from(u32::MAX) {
            return Some(u32::MAX);
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut m = estimate.floor().max(0.0) as u64;
        while m > 0 && !tally.miss(m).meets(cutoff) {
            m -= 1;
        }
        while tally.miss(m + 1).meets(cutoff) {
            m += 1;
        }
        Some(saturate(m))
    }
}

//
// ─── GRADES ────────────────────────────────────────────────────────────────────
//

/// Weighted grade position of a course against its target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeStanding {
    pub course_id: CourseId,
    /// Weighted average of graded work, in percent.
    pub current_percent: f64,
    /// Share of the final grade already assessed.
    pub completed_weight: f64,
    pub target_percent: f64,
    /// Average needed on the remaining work to reach the target, in `[0, 100]`.
    pub required_percent: f64,
    pub below_target: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GradeBook {
    courses: BTreeMap<CourseId, Vec<GradeEntry>>,
    next_id: u64,
}

impl GradeBook {
    #[must_use]
    pub fn new() -> Self {
        Self {
            courses: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = GradeEntry>) -> Self {
        let mut book = Self::new();
        for entry in entries {
            book.add(entry);
        }
        book
    }

    pub fn add(&mut self, entry: GradeEntry) {
        self.next_id = self.next_id.max(entry.id().value() + 1);
        self.courses.entry(entry.course_id()).or_default().push(entry);
    }

    #[must_use]
    pub fn next_grade_id(&self) -> GradeId {
        GradeId::new(self.next_id.max(1))
    }

    pub fn courses(&self) -> impl Iterator<Item = CourseId> + '_ {
        self.courses.keys().copied()
    }

    pub fn entries(&self, course_id: CourseId) -> impl Iterator<Item = &GradeEntry> + '_ {
        self.courses.get(&course_id).into_iter().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.courses.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Weighted average percent; `0` when nothing is graded.
    #[must_use]
    pub fn weighted_current(&self, course_id: CourseId) -> f64 {
        let (weighted, weight) = self
            .entries(course_id)
            .fold((0.0, 0.0), |(sum, weight), entry| {
                (sum + entry.percent() * entry.weight(), weight + entry.weight())
            });
        if weight <= 0.0 { 0.0 } else { weighted / weight }
    }

    #[must_use]
    pub fn standing(&self, course_id: CourseId, target_percent: f64) -> GradeStanding {
        let current = self.weighted_current(course_id);
        let completed: f64 = self.entries(course_id).map(GradeEntry::weight).sum();
        GradeStanding {
            course_id,
            current_percent: current,
            completed_weight: completed,
            target_percent,
            required_percent: required_score(current, target_percent, completed),
            below_target: completed > 0.0 && current < target_percent,
        }
    }
}

/// Average needed on the ungraded share of the course to finish at
/// `target`, clamped to `[0, 100]`. With nothing left to grade the current
/// average is returned.
#[must_use]
pub fn required_score(current: f64, target: f64, completed_weight: f64) -> f64 {
    let remaining = 1.0 - completed_weight;
    if remaining <= EPSILON {
        return current;
    }
    ((target - current * completed_weight) / remaining).clamp(0.0, 100.0)
}

//
// ─── RISK ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskAlert {
    AttendanceBelowCutoff {
        summary: AttendanceSummary,
        classes_needed: Option<u32>,
    },
    GradeBelowTarget {
        standing: GradeStanding,
    },
}

impl RiskAlert {
    #[must_use]
    pub fn course_id(&self) -> CourseId {
        match self {
            Self::AttendanceBelowCutoff { summary, .. } => summary.course_id,
            Self::GradeBelowTarget { standing } => standing.course_id,
        }
    }
}

/// Attendance ledger and grade book evaluated against one policy.
#[derive(Debug, Clone, Default)]
pub struct RiskTracker {
    policy: AttendancePolicy,
    ledger: AttendanceLedger,
    grades: GradeBook,
}

impl RiskTracker {
    #[must_use]
    pub fn new(policy: AttendancePolicy) -> Self {
        Self {
            policy,
            ledger: AttendanceLedger::new(),
            grades: GradeBook::new(),
        }
    }

    /// # Errors
    ///
    /// Returns `DuplicateRecord` if the stored records repeat a course and date.
    pub fn from_parts(
        policy: AttendancePolicy,
        records: impl IntoIterator<Item = AttendanceRecord>,
        grades: impl IntoIterator<Item = GradeEntry>,
    ) -> Result<Self, AttendanceError> {
        Ok(Self {
            policy,
            ledger: AttendanceLedger::from_records(records)?,
            grades: GradeBook::from_entries(grades),
        })
    }

    #[must_use]
    pub fn policy(&self) -> &AttendancePolicy {
        &self.policy
    }

    #[must_use]
    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    #[must_use]
    pub fn grades(&self) -> &GradeBook {
        &self.grades
    }

    /// # Errors
    ///
    /// Returns `DuplicateRecord`; the tracker is left unchanged.
    pub fn add_record(
        &mut self,
        course_id: CourseId,
        date: NaiveDate,
        present: bool,
    ) -> Result<AttendanceRecord, AttendanceError> {
        self.ledger.add_record(course_id, date, present)
    }

    pub fn add_grade(&mut self, entry: GradeEntry) {
        self.grades.add(entry);
    }

    #[must_use]
    pub fn summary(&self, course_id: CourseId) -> AttendanceSummary {
        self.ledger
            .summary(course_id, self.policy.cutoff_for(course_id))
    }

    #[must_use]
    pub fn classes_needed(&self, course_id: CourseId) -> Option<u32> {
        self.ledger
            .classes_needed(course_id, self.policy.cutoff_for(course_id))
    }

    /// What-if attendance fraction for `course_id`; see
    /// [`AttendanceLedger::projected_percentage`].
    #[must_use]
    pub fn projected_percentage(&self, course_id: CourseId, additional: u32, attended: u32) -> f64 {
        self.ledger
            .projected_percentage(course_id, additional, attended)
    }

    #[must_use]
    pub fn safe_absences(&self, course_id: CourseId) -> Option<u32> {
        self.ledger
            .safe_absences(course_id, self.policy.cutoff_for(course_id))
    }

    #[must_use]
    pub fn standing(&self, course_id: CourseId) -> GradeStanding {
        self.grades
            .standing(course_id, self.policy.grade_target_for(course_id))
    }

    /// Summaries for every course with at least one record.
    pub fn summaries(&self) -> impl Iterator<Item = AttendanceSummary> + '_ {
        self.ledger.courses().map(|course| self.summary(course))
    }

    pub fn at_risk_courses(&self) -> impl Iterator<Item = AttendanceSummary> + '_ {
        self.summaries().filter(|s| s.at_risk)
    }

    /// Attendance alerts first, then grade alerts, each in course order.
    #[must_use]
    pub fn alerts(&self) -> Vec<RiskAlert> {
        let attendance = self.at_risk_courses().map(|summary| RiskAlert::AttendanceBelowCutoff {
            classes_needed: self.classes_needed(summary.course_id),
            summary,
        });
        let grades = self
            .grades
            .courses()
            .map(|course| self.standing(course))
            .filter(|standing| standing.below_target)
            .map(|standing| RiskAlert::GradeBelowTarget { standing });
        attendance.chain(grades).collect()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GradeDraft;
    use crate::settings::EngineSettings;
    use crate::time::fixed_today;
    use chrono::Duration;

    const COURSE: CourseId = CourseId::new(7);

    fn ledger_with(marks: &[bool]) -> AttendanceLedger {
        let mut ledger = AttendanceLedger::new();
        for (offset, &present) in marks.iter().enumerate() {
            let date = fixed_today() + Duration::days(offset as i64);
            ledger.add_record(COURSE, date, present).unwrap();
        }
        ledger
    }

    fn grade(id: u64, score: f64, weight: f64) -> GradeEntry {
        GradeDraft {
            course_id: COURSE,
            name: format!("Quiz {id}"),
            score,
            max_score: 100.0,
            weight,
        }
        .into_entry(GradeId::new(id))
        .unwrap()
    }

    #[test]
    fn cutoff_is_inclusive_and_an_absence_tips_the_course() {
        let mut ledger = ledger_with(&[true, true, false, true]);
        let summary = ledger.summary(COURSE, 0.75);
        assert_eq!((summary.present_count, summary.total_count), (3, 4));
        assert!((summary.percentage - 0.75).abs() < f64::EPSILON);
        assert!(!summary.at_risk);

        ledger
            .add_record(COURSE, fixed_today() + Duration::days(10), false)
            .unwrap();
        let summary = ledger.summary(COURSE, 0.75);
        assert!((summary.percentage - 0.6).abs() < 1e-9);
        assert!(summary.at_risk);
        assert_eq!(ledger.classes_needed(COURSE, 0.75), Some(3));
        assert!((ledger.projected_percentage(COURSE, 3, 3) - 0.75).abs() < 1e-9);
        assert!(ledger.projected_percentage(COURSE, 2, 2) < 0.75);
    }

    #[test]
    fn duplicate_day_is_rejected_and_summary_is_unchanged() {
        let mut ledger = ledger_with(&[true, false]);
        let before = ledger.summary(COURSE, 0.75);

        let err = ledger.add_record(COURSE, fixed_today(), true).unwrap_err();
        assert_eq!(
            err,
            AttendanceError::DuplicateRecord {
                course_id: COURSE,
                date: fixed_today(),
            }
        );
        assert_eq!(ledger.summary(COURSE, 0.75), before);
        assert_eq!(ledger.len(), 2);

        // Same date, different course is fine.
        ledger
            .add_record(CourseId::new(8), fixed_today(), true)
            .unwrap();
    }

    #[test]
    fn empty_course_has_zero_percentage() {
        let ledger = AttendanceLedger::new();
        let summary = ledger.summary(COURSE, 0.75);
        assert_eq!(summary.total_count, 0);
        assert!(summary.percentage.abs() < f64::EPSILON);
        assert!(summary.at_risk);
        assert_eq!(ledger.classes_needed(COURSE, 0.75), Some(1));
    }

    #[test]
    fn percentage_stays_in_unit_interval() {
        for marks in [&[true][..], &[false][..], &[true, false, false][..], &[true; 9][..]] {
            let pct = ledger_with(marks).summary(COURSE, 0.75).percentage;
            assert!((0.0..=1.0).contains(&pct));
        }
    }

    #[test]
    fn full_cutoff_with_an_absence_cannot_recover() {
        let ledger = ledger_with(&[true, false]);
        assert_eq!(ledger.classes_needed(COURSE, 1.0), None);
    }

    #[test]
    fn safe_absences_keep_course_at_cutoff() {
        let ledger = ledger_with(&[true; 6]);
        // 6 / 8 = 0.75, 6 / 9 < 0.75
        assert_eq!(ledger.safe_absences(COURSE, 0.75), Some(2));
        assert_eq!(ledger.safe_absences(COURSE, 0.0), None);

        let behind = ledger_with(&[true, false, false]);
        assert_eq!(behind.safe_absences(COURSE, 0.75), Some(0));
    }

    #[test]
    fn record_ids_continue_after_loaded_records() {
        let records = vec![AttendanceRecord::new(
            RecordId::new(41),
            COURSE,
            fixed_today(),
            true,
        )];
        let mut ledger = AttendanceLedger::from_records(records).unwrap();
        let next = ledger
            .add_record(COURSE, fixed_today() + Duration::days(1), true)
            .unwrap();
        assert_eq!(next.id, RecordId::new(42));
    }

    #[test]
    fn weighted_grade_and_required_score() {
        let book = GradeBook::from_entries([grade(1, 80.0, 0.2), grade(2, 50.0, 0.2)]);
        assert!((book.weighted_current(COURSE) - 65.0).abs() < 1e-9);

        let standing = book.standing(COURSE, 70.0);
        assert!((standing.completed_weight - 0.4).abs() < 1e-9);
        // (70 - 65 * 0.4) / 0.6
        assert!((standing.required_percent - 73.333_333_333).abs() < 1e-6);
        assert!(standing.below_target);

        assert!((required_score(20.0, 95.0, 0.9) - 100.0).abs() < f64::EPSILON);
        assert!(required_score(100.0, 40.0, 0.5).abs() < f64::EPSILON);
        assert!((required_score(82.0, 90.0, 1.0) - 82.0).abs() < f64::EPSILON);
    }

    #[test]
    fn alerts_cover_attendance_and_grades() {
        let policy = AttendancePolicy::default();
        let records = ledger_with(&[true, false, false]).records(COURSE).cloned().collect::<Vec<_>>();
        let tracker = RiskTracker::from_parts(policy, records, [grade(1, 40.0, 0.5)]).unwrap();

        let alerts = tracker.alerts();
        assert_eq!(alerts.len(), 2);
        assert!(matches!(
            &alerts[0],
            RiskAlert::AttendanceBelowCutoff { classes_needed: Some(5), .. }
        ));
        assert!(matches!(&alerts[1], RiskAlert::GradeBelowTarget { .. }));
        assert!(alerts.iter().all(|a| a.course_id() == COURSE));
    }

    #[test]
    fn near_full_cutoff_beyond_u32_reports_unreachable() {
        let mut settings = EngineSettings::default();
        settings.attendance.default_cutoff = 0.999_999_999_999;
        settings.validate().unwrap();

        let ledger = ledger_with(&[true, true, false]);
        assert_eq!(ledger.classes_needed(COURSE, 0.999_999_999_999), None);

        let records = ledger.records(COURSE).cloned().collect::<Vec<_>>();
        let tracker =
            RiskTracker::from_parts(settings.attendance, records, Vec::<GradeEntry>::new())
                .unwrap();
        let alerts = tracker.alerts();
        assert!(matches!(
            alerts.as_slice(),
            [RiskAlert::AttendanceBelowCutoff { classes_needed: None, .. }]
        ));
    }

    #[test]
    fn tiny_cutoff_saturates_safe_absences() {
        let ledger = ledger_with(&[true]);
        assert_eq!(ledger.safe_absences(COURSE, 1e-12), Some(u32::MAX));
    }

    #[test]
    fn projection_accepts_the_full_u32_range() {
        let ledger = ledger_with(&[true]);
        let all_attended = ledger.projected_percentage(COURSE, u32::MAX, u32::MAX);
        assert!((all_attended - 1.0).abs() < f64::EPSILON);

        let none_attended = ledger.projected_percentage(COURSE, u32::MAX, 0);
        assert!((0.0..1e-9).contains(&none_attended));

        // attended is capped at additional
        assert!((ledger.projected_percentage(COURSE, 1, u32::MAX) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tracker_projection_uses_the_ledger() {
        let records = ledger_with(&[true, false]).records(COURSE).cloned().collect::<Vec<_>>();
        let tracker = RiskTracker::from_parts(
            AttendancePolicy::default(),
            records,
            Vec::<GradeEntry>::new(),
        )
        .unwrap();
        // (1 + 2) / (2 + 2)
        assert!((tracker.projected_percentage(COURSE, 2, 2) - 0.75).abs() < 1e-9);
    }
}
