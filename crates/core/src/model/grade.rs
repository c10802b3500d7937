use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, GradeId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum GradeError {
    #[error("assessment name cannot be empty")]
    EmptyName,

    #[error("max score must be > 0, got {0}")]
    InvalidMaxScore(f64),

    #[error("score must be between 0 and the max score, got {score} of {max_score}")]
    InvalidScore { score: f64, max_score: f64 },

    #[error("weight must be in (0, 1], got {0}")]
    InvalidWeight(f64),
}

/// A graded assessment as entered by the user.
///
/// `weight` is the assessment's share of the final course grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeDraft {
    pub course_id: CourseId,
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub weight: f64,
}

impl GradeDraft {
    /// # Errors
    ///
    /// Returns `GradeError` when the name is blank, the score is outside
    /// `[0, max_score]`, or the weight is outside `(0, 1]`.
    pub fn into_entry(self, id: GradeId) -> Result<GradeEntry, GradeError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(GradeError::EmptyName);
        }
        if !self.max_score.is_finite() || self.max_score <= 0.0 {
            return Err(GradeError::InvalidMaxScore(self.max_score));
        }
        if !self.score.is_finite() || self.score < 0.0 || self.score > self.max_score {
            return Err(GradeError::InvalidScore {
                score: self.score,
                max_score: self.max_score,
            });
        }
        if !self.weight.is_finite() || self.weight <= 0.0 || self.weight > 1.0 {
            return Err(GradeError::InvalidWeight(self.weight));
        }

        Ok(GradeEntry {
            id,
            course_id: self.course_id,
            name,
            score: self.score,
            max_score: self.max_score,
            weight: self.weight,
        })
    }
}

/// A validated, persisted grade. Append-only like attendance records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeEntry {
    id: GradeId,
    course_id: CourseId,
    name: String,
    score: f64,
    max_score: f64,
    weight: f64,
}

impl GradeEntry {
    /// # Errors
    ///
    /// Returns `GradeError` if the persisted values fail validation.
    pub fn from_persisted(
        id: GradeId,
        course_id: CourseId,
        name: String,
        score: f64,
        max_score: f64,
        weight: f64,
    ) -> Result<Self, GradeError> {
        GradeDraft {
            course_id,
            name,
            score,
            max_score,
            weight,
        }
        .into_entry(id)
    }

    #[must_use]
    pub fn id(&self) -> GradeId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn max_score(&self) -> f64 {
        self.max_score
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Score as a percentage of the maximum.
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.score / self.max_score * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(score: f64, max_score: f64, weight: f64) -> GradeDraft {
        GradeDraft {
            course_id: CourseId::new(1),
            name: "Midterm".into(),
            score,
            max_score,
            weight,
        }
    }

    #[test]
    fn valid_draft_becomes_entry() {
        let entry = draft(45.0, 50.0, 0.3).into_entry(GradeId::new(1)).unwrap();
        assert!((entry.percent() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            draft(10.0, 0.0, 0.2).into_entry(GradeId::new(1)),
            Err(GradeError::InvalidMaxScore(_))
        ));
        assert!(matches!(
            draft(60.0, 50.0, 0.2).into_entry(GradeId::new(1)),
            Err(GradeError::InvalidScore { .. })
        ));
        assert!(matches!(
            draft(10.0, 50.0, 1.5).into_entry(GradeId::new(1)),
            Err(GradeError::InvalidWeight(_))
        ));
    }
}
