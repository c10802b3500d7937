use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }

            /// The id following this one; used when assigning ids in sequence.
            #[must_use]
            pub const fn next(&self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                    })
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a syllabus topic.
    TopicId
);
entity_id!(
    /// Unique identifier for a planned or historical study session.
    SessionId
);
entity_id!(
    /// Unique identifier for a flashcard.
    CardId
);
entity_id!(
    /// Unique identifier for a course.
    CourseId
);
entity_id!(
    /// Unique identifier for an attendance record.
    RecordId
);
entity_id!(
    /// Unique identifier for a recorded grade.
    GradeId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_bare_number() {
        assert_eq!(CardId::new(42).to_string(), "42");
        assert_eq!(CourseId::new(7).to_string(), "7");
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", TopicId::new(3)), "TopicId(3)");
    }

    #[test]
    fn from_str_accepts_padded_numbers() {
        let id: SessionId = " 123 ".parse().unwrap();
        assert_eq!(id, SessionId::new(123));
    }

    #[test]
    fn from_str_rejects_garbage() {
        let err = "not-a-number".parse::<RecordId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse RecordId from string");
    }

    #[test]
    fn next_increments() {
        assert_eq!(GradeId::new(9).next(), GradeId::new(10));
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&CardId::new(5)).unwrap();
        assert_eq!(json, "5");
    }
}
