use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur during review operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("invalid review grade value: {0} (expected 0-5)")]
    InvalidGrade(u8),
}

//
// ─── REVIEW QUALITY ───────────────────────────────────────────────────────────
//

/// SM-2 recall quality on the 0–5 scale.
///
/// - 0: complete blackout
/// - 1: incorrect, but the answer was recognised
/// - 2: incorrect, but the answer seemed easy to recall
/// - 3: correct with serious difficulty
/// - 4: correct after hesitation
/// - 5: perfect recall
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ReviewQuality(u8);

impl ReviewQuality {
    pub const MAX: u8 = 5;

    /// Lowest quality that still counts as successful recall.
    pub const PASSING: u8 = 3;

    /// Converts a numeric grade (0-5) to a `ReviewQuality`.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidGrade` if the value is not in the range 0-5.
    pub fn from_u8(value: u8) -> Result<Self, ReviewError> {
        if value > Self::MAX {
            return Err(ReviewError::InvalidGrade(value));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_passing(self) -> bool {
        self.0 >= Self::PASSING
    }
}

impl TryFrom<u8> for ReviewQuality {
    type Error = ReviewError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value)
    }
}

impl From<ReviewQuality> for u8 {
    fn from(quality: ReviewQuality) -> Self {
        quality.0
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_grade_conversion_works() {
        assert_eq!(ReviewQuality::from_u8(0).unwrap().value(), 0);
        assert_eq!(ReviewQuality::from_u8(5).unwrap().value(), 5);
        let err = ReviewQuality::from_u8(6).unwrap_err();
        assert!(matches!(err, ReviewError::InvalidGrade(6)));
    }

    #[test]
    fn passing_starts_at_three() {
        assert!(!ReviewQuality::from_u8(2).unwrap().is_passing());
        assert!(ReviewQuality::from_u8(3).unwrap().is_passing());
    }

    #[test]
    fn deserialization_rejects_out_of_range() {
        assert!(serde_json::from_str::<ReviewQuality>("4").is_ok());
        assert!(serde_json::from_str::<ReviewQuality>("9").is_err());
    }
}
