use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CardId, TopicId};

/// Lowest ease factor a card may ever carry.
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Ease factor given to brand-new cards unless configured otherwise.
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum CardError {
    #[error("card front cannot be empty")]
    EmptyFront,

    #[error("card back cannot be empty")]
    EmptyBack,

    #[error("ease factor must be a finite value >= 1.3, got {0}")]
    InvalidEaseFactor(f64),
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// User- or import-supplied flashcard content before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDraft {
    #[serde(default)]
    pub topic_id: Option<TopicId>,
    pub front: String,
    pub back: String,
}

impl CardDraft {
    #[must_use]
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            topic_id: None,
            front: front.into(),
            back: back.into(),
        }
    }

    #[must_use]
    pub fn for_topic(mut self, topic_id: TopicId) -> Self {
        self.topic_id = Some(topic_id);
        self
    }

    /// Validate the content and produce a new card that is due on `today`.
    ///
    /// # Errors
    ///
    /// Returns `CardError::EmptyFront`/`EmptyBack` for blank sides and
    /// `CardError::InvalidEaseFactor` if `initial_ease` is below the floor.
    pub fn into_card(
        self,
        id: CardId,
        initial_ease: f64,
        today: NaiveDate,
    ) -> Result<Flashcard, CardError> {
        let front = self.front.trim().to_owned();
        if front.is_empty() {
            return Err(CardError::EmptyFront);
        }
        let back = self.back.trim().to_owned();
        if back.is_empty() {
            return Err(CardError::EmptyBack);
        }
        validate_ease(initial_ease)?;

        Ok(Flashcard {
            id,
            topic_id: self.topic_id,
            front,
            back,
            ease_factor: initial_ease,
            interval_days: 0,
            repetitions: 0,
            due_date: today,
            last_reviewed_at: None,
        })
    }
}

fn validate_ease(ease_factor: f64) -> Result<(), CardError> {
    if !ease_factor.is_finite() || ease_factor < MIN_EASE_FACTOR {
        return Err(CardError::InvalidEaseFactor(ease_factor));
    }
    Ok(())
}

//
// ─── FLASHCARD ─────────────────────────────────────────────────────────────────
//

/// A flashcard with its SM-2 review state.
///
/// Review state is only changed by [`crate::scheduler::Scheduler`]; the
/// constructor and persisted path both enforce `ease_factor >= 1.3`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flashcard {
    id: CardId,
    topic_id: Option<TopicId>,
    front: String,
    back: String,
    ease_factor: f64,
    interval_days: u32,
    repetitions: u32,
    due_date: NaiveDate,
    last_reviewed_at: Option<DateTime<Utc>>,
}

impl Flashcard {
    /// Rehydrate a card from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `CardError` if content is blank or the ease factor is below the floor.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: CardId,
        topic_id: Option<TopicId>,
        front: String,
        back: String,
        ease_factor: f64,
        interval_days: u32,
        repetitions: u32,
        due_date: NaiveDate,
        last_reviewed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, CardError> {
        let mut card = CardDraft {
            topic_id,
            front,
            back,
        }
        .into_card(id, ease_factor, due_date)?;
        card.interval_days = interval_days;
        card.repetitions = repetitions;
        card.last_reviewed_at = last_reviewed_at;
        Ok(card)
    }

    #[must_use]
    pub fn id(&self) -> CardId {
        self.id
    }

    #[must_use]
    pub fn topic_id(&self) -> Option<TopicId> {
        self.topic_id
    }

    #[must_use]
    pub fn front(&self) -> &str {
        &self.front
    }

    #[must_use]
    pub fn back(&self) -> &str {
        &self.back
    }

    #[must_use]
    pub fn ease_factor(&self) -> f64 {
        self.ease_factor
    }

    #[must_use]
    pub fn interval_days(&self) -> u32 {
        self.interval_days
    }

    #[must_use]
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    #[must_use]
    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.last_reviewed_at
    }

    #[must_use]
    pub fn is_due(&self, as_of: NaiveDate) -> bool {
        self.due_date <= as_of
    }

    /// Overwrite the review state. Callers clamp the ease factor first.
    pub(crate) fn set_review_state(
        &mut self,
        ease_factor: f64,
        interval_days: u32,
        repetitions: u32,
        due_date: NaiveDate,
        reviewed_at: DateTime<Utc>,
    ) {
        debug_assert!(ease_factor >= MIN_EASE_FACTOR);
        self.ease_factor = ease_factor;
        self.interval_days = interval_days;
        self.repetitions = repetitions;
        self.due_date = due_date;
        self.last_reviewed_at = Some(reviewed_at);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
