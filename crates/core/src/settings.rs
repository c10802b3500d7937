//! Tunable defaults for the scheduling engine.
//!
//! Every constant the algorithms use lives here so callers can load a
//! different set from configuration. [`EngineSettings::validate`] must pass
//! before settings reach a scheduler.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{CourseId, DEFAULT_EASE_FACTOR, MIN_EASE_FACTOR};
use crate::planner::AvailableSlot;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("minimum ease must be >= 1.3, got {0}")]
    InvalidMinEase(f64),

    #[error("initial ease must be >= minimum ease ({min}), got {provided}")]
    InvalidInitialEase { provided: f64, min: f64 },

    #[error("planning horizon must be between 1 and 366 days, got {0}")]
    InvalidHorizon(u32),

    #[error("no-deadline urgency must be in (0, 1), got {0}")]
    InvalidNoDeadlineUrgency(f64),

    #[error("study minutes per day must be <= 1440, got {0}")]
    InvalidDailyMinutes(u32),

    #[error("attendance cutoff must be in [0, 1], got {0}")]
    InvalidCutoff(f64),

    #[error("grade target must be in [0, 100], got {0}")]
    InvalidGradeTarget(f64),
}

//
// ─── SM-2 ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sm2Settings {
    pub initial_ease: f64,
    /// Floor for the ease factor. May be raised, never lowered below 1.3.
    pub min_ease: f64,
}

impl Default for Sm2Settings {
    fn default() -> Self {
        Self {
            initial_ease: DEFAULT_EASE_FACTOR,
            min_ease: MIN_EASE_FACTOR,
        }
    }
}

//
// ─── PLANNER ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Number of days, starting today, that a re-plan fills.
    pub horizon_days: u32,
    /// Urgency given to topics without a deadline.
    pub no_deadline_urgency: f64,
    /// Study minutes available per weekday, Monday first.
    pub weekly_minutes: [u32; 7],
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            horizon_days: 14,
            no_deadline_urgency: 0.05,
            weekly_minutes: [120, 120, 120, 120, 120, 180, 180],
        }
    }
}

impl PlannerSettings {
    /// Study minutes available on `date`.
    #[must_use]
    pub fn minutes_on(&self, date: NaiveDate) -> u32 {
        let index = date.weekday().num_days_from_monday() as usize;
        self.weekly_minutes[index]
    }

    /// Available slots for every day of the horizon starting at `from`.
    /// Days without study time are skipped.
    #[must_use]
    pub fn slots_from(&self, from: NaiveDate) -> Vec<AvailableSlot> {
        (0..i64::from(self.horizon_days))
            .map(|offset| from + Duration::days(offset))
            .filter_map(|date| {
                let minutes = self.minutes_on(date);
                (minutes > 0).then_some(AvailableSlot { date, minutes })
            })
            .collect()
    }
}

//
// ─── ATTENDANCE & GRADES ───────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendancePolicy {
    /// Fraction of classes that must be attended, e.g. `0.75`.
    pub default_cutoff: f64,
    pub cutoffs: BTreeMap<CourseId, f64>,
    /// Target final grade in percent.
    pub default_grade_target: f64,
    pub grade_targets: BTreeMap<CourseId, f64>,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            default_cutoff: 0.75,
            cutoffs: BTreeMap::new(),
            default_grade_target: 60.0,
            grade_targets: BTreeMap::new(),
        }
    }
}

impl AttendancePolicy {
    #[must_use]
    pub fn cutoff_for(&self, course_id: CourseId) -> f64 {
        self.cutoffs
            .get(&course_id)
            .copied()
            .unwrap_or(self.default_cutoff)
    }

    #[must_use]
    pub fn grade_target_for(&self, course_id: CourseId) -> f64 {
        self.grade_targets
            .get(&course_id)
            .copied()
            .unwrap_or(self.default_grade_target)
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub sm2: Sm2Settings,
    pub planner: PlannerSettings,
    pub attendance: AttendancePolicy,
}

impl EngineSettings {
    /// Check every value against the range its algorithm accepts.
    ///
    /// # Errors
    ///
    /// Returns the first `SettingsError` found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let sm2 = &self.sm2;
        if !sm2.min_ease.is_finite() || sm2.min_ease < MIN_EASE_FACTOR {
            return Err(SettingsError::InvalidMinEase(sm2.min_ease));
        }
        if !sm2.initial_ease.is_finite() || sm2.initial_ease < sm2.min_ease {
            return Err(SettingsError::InvalidInitialEase {
                provided: sm2.initial_ease,
                min: sm2.min_ease,
            });
        }

        let planner = &self.planner;
        if !(1..=366).contains(&planner.horizon_days) {
            return Err(SettingsError::InvalidHorizon(planner.horizon_days));
        }
        let urgency = planner.no_deadline_urgency;
        if !urgency.is_finite() || urgency <= 0.0 || urgency >= 1.0 {
            return Err(SettingsError::InvalidNoDeadlineUrgency(urgency));
        }
        if let Some(&minutes) = planner.weekly_minutes.iter().find(|&&m| m > 1440) {
            return Err(SettingsError::InvalidDailyMinutes(minutes));
        }

        let attendance = &self.attendance;
        for cutoff in std::iter::once(&attendance.default_cutoff).chain(attendance.cutoffs.values())
        {
            if !(0.0..=1.0).contains(cutoff) {
                return Err(SettingsError::InvalidCutoff(*cutoff));
            }
        }
        for target in std::iter::once(&attendance.default_grade_target)
            .chain(attendance.grade_targets.values())
        {
            if !(0.0..=100.0).contains(target) {
                return Err(SettingsError::InvalidGradeTarget(*target));
            }
        }

        Ok(())
    }
}
