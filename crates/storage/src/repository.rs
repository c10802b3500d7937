use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use study_core::model::{
    AttendanceRecord, CardId, CourseId, Flashcard, GradeEntry, GradeId, RecordId, SessionId,
    StudySession, Topic, TopicId,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Everything the engine needs to rebuild its in-memory state.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub topics: Vec<Topic>,
    pub sessions: Vec<StudySession>,
    pub cards: Vec<Flashcard>,
    pub attendance: Vec<AttendanceRecord>,
    pub grades: Vec<GradeEntry>,
}

/// Changes produced by one engine command, saved as a unit.
///
/// Topics, sessions and cards are upserted by id. Sessions listed in
/// `removed_sessions` are deleted. Attendance records and grade entries are
/// append-only and must not already exist.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub topics: Vec<Topic>,
    pub sessions: Vec<StudySession>,
    pub removed_sessions: Vec<SessionId>,
    pub cards: Vec<Flashcard>,
    pub attendance: Vec<AttendanceRecord>,
    pub grades: Vec<GradeEntry>,
}

impl StateDelta {
    #[must_use]
    pub fn card(card: Flashcard) -> Self {
        Self {
            cards: vec![card],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn attendance(record: AttendanceRecord) -> Self {
        Self {
            attendance: vec![record],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn grade(entry: GradeEntry) -> Self {
        Self {
            grades: vec![entry],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
            && self.sessions.is_empty()
            && self.removed_sessions.is_empty()
            && self.cards.is_empty()
            && self.attendance.is_empty()
            && self.grades.is_empty()
    }
}

/// Storage contract for the scheduling engine.
///
/// `save_state` must apply a delta atomically: either every change lands or
/// none does.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load every persisted entity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read or a row fails validation.
    async fn load_state(&self) -> Result<EngineState, StorageError>;

    /// Apply one delta.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when an appended record already
    /// exists, or other storage errors. Nothing is written on error.
    async fn save_state(&self, delta: &StateDelta) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    topics: BTreeMap<TopicId, Topic>,
    sessions: BTreeMap<SessionId, StudySession>,
    cards: BTreeMap<CardId, Flashcard>,
    attendance: BTreeMap<RecordId, AttendanceRecord>,
    attendance_days: BTreeSet<(CourseId, chrono::NaiveDate)>,
    grades: BTreeMap<GradeId, GradeEntry>,
}

impl MemoryState {
    fn check_appends(&self, delta: &StateDelta) -> Result<(), StorageError> {
        let mut days = BTreeSet::new();
        for record in &delta.attendance {
            let day = (record.course_id, record.date);
            if self.attendance.contains_key(&record.id)
                || self.attendance_days.contains(&day)
                || !days.insert(day)
            {
                return Err(StorageError::Conflict(format!(
                    "attendance for course {} on {}",
                    record.course_id, record.date
                )));
            }
        }
        for entry in &delta.grades {
            if self.grades.contains_key(&entry.id()) {
                return Err(StorageError::Conflict(format!("grade {}", entry.id())));
            }
        }
        Ok(())
    }

    fn apply(&mut self, delta: &StateDelta) {
        for topic in &delta.topics {
            self.topics.insert(topic.id(), topic.clone());
        }
        for id in &delta.removed_sessions {
            self.sessions.remove(id);
        }
        for session in &delta.sessions {
            self.sessions.insert(session.id, session.clone());
        }
        for card in &delta.cards {
            self.cards.insert(card.id(), card.clone());
        }
        for record in &delta.attendance {
            self.attendance_days.insert((record.course_id, record.date));
            self.attendance.insert(record.id, record.clone());
        }
        for entry in &delta.grades {
            self.grades.insert(entry.id(), entry.clone());
        }
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryRepository {
    async fn load_state(&self) -> Result<EngineState, StorageError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(EngineState {
            topics: guard.topics.values().cloned().collect(),
            sessions: guard.sessions.values().cloned().collect(),
            cards: guard.cards.values().cloned().collect(),
            attendance: guard.attendance.values().cloned().collect(),
            grades: guard.grades.values().cloned().collect(),
        })
    }

    async fn save_state(&self, delta: &StateDelta) -> Result<(), StorageError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.check_appends(delta)?;
        guard.apply(delta);
        Ok(())
    }
}

/// Wraps the state store behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub state: Arc<dyn StateStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(InMemoryRepository::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_core::model::{CardDraft, TopicDraft};
    use study_core::time::fixed_today;

    fn topic(id: u64) -> Topic {
        TopicDraft::new(format!("Topic {id}"), 90)
            .into_topic(TopicId::new(id))
            .unwrap()
    }

    fn session(id: u64, topic_id: u64) -> StudySession {
        StudySession::planned(SessionId::new(id), TopicId::new(topic_id), fixed_today(), 45)
    }

    #[tokio::test]
    async fn applies_upserts_and_removals() {
        let repo = InMemoryRepository::new();
        let card = CardDraft::new("Q", "A")
            .into_card(CardId::new(1), 2.5, fixed_today())
            .unwrap();
        repo.save_state(&StateDelta {
            topics: vec![topic(1)],
            sessions: vec![session(1, 1), session(2, 1)],
            cards: vec![card],
            ..StateDelta::default()
        })
        .await
        .unwrap();

        repo.save_state(&StateDelta {
            removed_sessions: vec![SessionId::new(2)],
            sessions: vec![session(3, 1)],
            ..StateDelta::default()
        })
        .await
        .unwrap();

        let state = repo.load_state().await.unwrap();
        assert_eq!(state.topics.len(), 1);
        assert_eq!(state.cards.len(), 1);
        let ids: Vec<_> = state.sessions.iter().map(|s| s.id.value()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn duplicate_attendance_day_is_a_conflict_and_nothing_is_written() {
        let repo = InMemoryRepository::new();
        let course = CourseId::new(3);
        repo.save_state(&StateDelta::attendance(AttendanceRecord::new(
            RecordId::new(1),
            course,
            fixed_today(),
            true,
        )))
        .await
        .unwrap();

        let delta = StateDelta {
            topics: vec![topic(9)],
            attendance: vec![AttendanceRecord::new(
                RecordId::new(2),
                course,
                fixed_today(),
                false,
            )],
            ..StateDelta::default()
        };
        let err = repo.save_state(&delta).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let state = repo.load_state().await.unwrap();
        assert!(state.topics.is_empty());
        assert_eq!(state.attendance.len(), 1);
    }
}
