mod attendance;
mod card;
mod grade;
mod ids;
mod review;
mod session;
mod topic;

pub use ids::{CardId, CourseId, GradeId, ParseIdError, RecordId, SessionId, TopicId};

pub use attendance::{AttendanceRecord, AttendanceSummary};
pub use card::{CardDraft, CardError, DEFAULT_EASE_FACTOR, Flashcard, MIN_EASE_FACTOR};
pub use grade::{GradeDraft, GradeEntry, GradeError};
pub use review::{ReviewError, ReviewQuality};
pub use session::{SessionError, SessionStatus, StudySession};
pub use topic::{Topic, TopicDraft, TopicError, TopicStatus};
