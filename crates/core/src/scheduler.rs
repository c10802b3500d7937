use std::collections::btree_set;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::model::{CardId, Flashcard, ReviewError, ReviewQuality};
use crate::settings::Sm2Settings;

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// SM-2 scheduler for flashcard reviews.
///
/// A failed recall (quality below 3) restarts the learning curve: the card
/// is due again tomorrow. A successful recall grows the interval 1 → 6 →
/// `round(previous × ease)`. The ease factor moves with every review and
/// never drops below the configured floor (1.3 by default).
///
/// # Examples
///
/// ```
/// # use study_core::model::{CardDraft, CardId, ReviewQuality};
/// # use study_core::scheduler::Scheduler;
/// # use study_core::time::fixed_now;
/// let scheduler = Scheduler::new();
/// let now = fixed_now();
/// let card = CardDraft::new("Q", "A")
///     .into_card(CardId::new(1), 2.5, now.date_naive())
///     .unwrap();
///
/// let reviewed = scheduler.apply(&card, ReviewQuality::from_u8(4)?, now);
/// assert_eq!(reviewed.repetitions(), 1);
/// assert_eq!(reviewed.interval_days(), 1);
/// # Ok::<(), study_core::model::ReviewError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    settings: Sm2Settings,
}

impl Scheduler {
    /// Scheduler with the classic SM-2 constants (ease 2.5, floor 1.3).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler with caller-supplied constants. Validate them with
    /// [`crate::settings::EngineSettings::validate`] first.
    #[must_use]
    pub fn with_settings(settings: Sm2Settings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &Sm2Settings {
        &self.settings
    }

    /// Review a card with a raw 0–5 grade.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidGrade` if `quality > 5`; the card is not touched.
    pub fn review(
        &self,
        card: &Flashcard,
        quality: u8,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Flashcard, ReviewError> {
        let quality = ReviewQuality::from_u8(quality)?;
        Ok(self.apply(card, quality, reviewed_at))
    }

    /// Apply an already-validated quality and return the updated card.
    #[must_use]
    pub fn apply(
        &self,
        card: &Flashcard,
        quality: ReviewQuality,
        reviewed_at: DateTime<Utc>,
    ) -> Flashcard {
        let (repetitions, interval_days) = if quality.is_passing() {
            let repetitions = card.repetitions().saturating_add(1);
            let interval = match repetitions {
                1 => 1,
                2 => 6,
                _ => grow_interval(card.interval_days(), card.ease_factor()),
            };
            (repetitions, interval)
        } else {
            (0, 1)
        };

        let ease_factor = self.next_ease(card.ease_factor(), quality);
        let due_date = reviewed_at.date_naive() + Duration::days(i64::from(interval_days));

        let mut updated = card.clone();
        updated.set_review_state(
            ease_factor,
            interval_days,
            repetitions,
            due_date,
            reviewed_at,
        );
        updated
    }

    /// `EF' = max(floor, EF + (0.1 − (5−q)(0.08 + (5−q)·0.02)))`
    #[must_use]
    pub fn next_ease(&self, ease_factor: f64, quality: ReviewQuality) -> f64 {
        let miss = f64::from(ReviewQuality::MAX - quality.value());
        let next = ease_factor + (0.1 - miss * (0.08 + miss * 0.02));
        next.max(self.settings.min_ease)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn grow_interval(previous: u32, ease_factor: f64) -> u32 {
    let grown = (f64::from(previous) * ease_factor).round();
    if grown >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        (grown as u32).max(1)
    }
}

//
// ─── CARD DECK ─────────────────────────────────────────────────────────────────
//

type DueKey = (NaiveDate, u32, CardId);

/// All flashcards plus an index ordered by `(due_date, repetitions, id)`.
///
/// The index makes [`CardDeck::peek_due`] lazy: it walks the ordered set and
/// stops at the first card due after `as_of`.
#[derive(Debug, Clone, Default)]
pub struct CardDeck {
    cards: HashMap<CardId, Flashcard>,
    due_index: BTreeSet<DueKey>,
}

fn due_key(card: &Flashcard) -> DueKey {
    (card.due_date(), card.repetitions(), card.id())
}

impl CardDeck {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a card, keeping the due index in step.
    pub fn upsert(&mut self, card: Flashcard) -> Option<Flashcard> {
        let key = due_key(&card);
        let previous = self.cards.insert(card.id(), card);
        if let Some(old) = &previous {
            let old_key = due_key(old);
            if old_key != key {
                self.due_index.remove(&old_key);
            }
        }
        self.due_index.insert(key);
        previous
    }

    #[must_use]
    pub fn get(&self, id: CardId) -> Option<&Flashcard> {
        self.cards.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Id to give the next created card.
    #[must_use]
    pub fn next_id(&self) -> CardId {
        self.cards
            .keys()
            .max()
            .map_or(CardId::new(1), CardId::next)
    }

    /// Cards due on or before `as_of`, earliest due first, least-rehearsed
    /// first on equal dates. Read-only; clone the iterator to restart it.
    #[must_use]
    pub fn peek_due(&self, as_of: NaiveDate) -> DueCards<'_> {
        DueCards {
            keys: self
                .due_index
                .range(..=(as_of, u32::MAX, CardId::new(u64::MAX))),
            cards: &self.cards,
        }
    }
}

impl FromIterator<Flashcard> for CardDeck {
    fn from_iter<I: IntoIterator<Item = Flashcard>>(iter: I) -> Self {
        let mut deck = Self::new();
        for card in iter {
            deck.upsert(card);
        }
        deck
    }
}

/// Lazy iterator returned by [`CardDeck::peek_due`].
#[derive(Clone)]
pub struct DueCards<'a> {
    keys: btree_set::Range<'a, DueKey>,
    cards: &'a HashMap<CardId, Flashcard>,
}

impl<'a> Iterator for DueCards<'a> {
    type Item = &'a Flashcard;

    fn next(&mut self) -> Option<Self::Item> {
        let (_, _, id) = self.keys.next()?;
        self.cards.get(id)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardDraft, DEFAULT_EASE_FACTOR, MIN_EASE_FACTOR};
    use crate::time::{fixed_now, fixed_today};

    fn q(value: u8) -> ReviewQuality {
        ReviewQuality::from_u8(value).unwrap()
    }

    fn new_card(id: u64) -> Flashcard {
        CardDraft::new("Q", "A")
            .into_card(CardId::new(id), DEFAULT_EASE_FACTOR, fixed_today())
            .unwrap()
    }

    fn card_with(
        id: u64,
        ease: f64,
        interval: u32,
        repetitions: u32,
        due: NaiveDate,
    ) -> Flashcard {
        Flashcard::from_persisted(
            CardId::new(id),
            None,
            "Q".into(),
            "A".into(),
            ease,
            interval,
            repetitions,
            due,
            None,
        )
        .unwrap()
    }

    #[test]
    fn third_successful_review_multiplies_by_ease() {
        let s = Scheduler::new();
        let card = card_with(1, 2.5, 6, 2, fixed_today());

        let reviewed = s.apply(&card, q(4), fixed_now());

        assert_eq!(reviewed.repetitions(), 3);
        assert_eq!(reviewed.interval_days(), 15);
        assert!(reviewed.ease_factor() >= 2.5);
        assert_eq!(reviewed.due_date(), fixed_today() + Duration::days(15));
        assert_eq!(reviewed.last_reviewed_at(), Some(fixed_now()));
    }

    #[test]
    fn failed_recall_resets_to_tomorrow() {
        let s = Scheduler::new();
        let card = card_with(1, 2.2, 40, 7, fixed_today());

        let reviewed = s.apply(&card, q(1), fixed_now());

        assert_eq!(reviewed.repetitions(), 0);
        assert_eq!(reviewed.interval_days(), 1);
        assert_eq!(reviewed.due_date(), fixed_today() + Duration::days(1));
        assert!(reviewed.ease_factor() < 2.2);
    }

    #[test]
    fn first_two_successes_use_fixed_steps() {
        let s = Scheduler::new();
        let first = s.apply(&new_card(1), q(5), fixed_now());
        assert_eq!(first.interval_days(), 1);
        let second = s.apply(&first, q(3), fixed_now());
        assert_eq!(second.interval_days(), 6);
        assert_eq!(second.repetitions(), 2);
    }

    #[test]
    fn perfect_recall_raises_ease() {
        let s = Scheduler::new();
        let ease = s.next_ease(2.5, q(5));
        assert!((ease - 2.6).abs() < 1e-9);
    }

    #[test]
    fn review_rejects_out_of_range_grade() {
        let s = Scheduler::new();
        let card = new_card(1);
        let err = s.review(&card, 6, fixed_now()).unwrap_err();
        assert_eq!(err, ReviewError::InvalidGrade(6));
    }

    #[test]
    fn ease_never_drops_below_floor_for_any_short_history() {
        let s = Scheduler::new();
        // Every sequence of five grades.
        for mut code in 0..6_u32.pow(5) {
            let mut card = new_card(1);
            for _ in 0..5 {
                let grade = u8::try_from(code % 6).unwrap();
                code /= 6;
                card = s.apply(&card, q(grade), fixed_now());
                assert!(card.ease_factor() >= MIN_EASE_FACTOR);
            }
        }
    }

    #[test]
    fn long_failure_streak_pins_ease_at_floor() {
        let s = Scheduler::new();
        let mut card = new_card(1);
        for _ in 0..50 {
            card = s.apply(&card, q(0), fixed_now());
        }
        assert!((card.ease_factor() - MIN_EASE_FACTOR).abs() < f64::EPSILON);
    }

    #[test]
    fn successful_review_after_second_never_shrinks_interval() {
        let s = Scheduler::new();
        for interval in [1_u32, 2, 6, 15, 100] {
            for quality in 3..=5 {
                let card = card_with(1, MIN_EASE_FACTOR, interval, 3, fixed_today());
                let reviewed = s.apply(&card, q(quality), fixed_now());
                assert!(reviewed.interval_days() >= interval);
            }
        }
    }

    #[test]
    fn raised_floor_is_respected() {
        let s = Scheduler::with_settings(Sm2Settings {
            initial_ease: 2.5,
            min_ease: 1.8,
        });
        assert!((s.next_ease(1.9, q(0)) - 1.8).abs() < f64::EPSILON);
    }

    #[test]
    fn peek_due_orders_by_date_then_repetitions() {
        let today = fixed_today();
        let deck: CardDeck = vec![
            card_with(1, 2.5, 6, 4, today),
            card_with(2, 2.5, 1, 1, today - Duration::days(2)),
            card_with(3, 2.5, 1, 0, today),
            card_with(4, 2.5, 6, 2, today + Duration::days(1)),
        ]
        .into_iter()
        .collect();

        let due: Vec<u64> = deck.peek_due(today).map(|c| c.id().value()).collect();
        assert_eq!(due, vec![2, 3, 1]);
    }

    #[test]
    fn peek_due_is_restartable_and_read_only() {
        let today = fixed_today();
        let deck: CardDeck = (1..=3).map(new_card).collect();

        let due = deck.peek_due(today);
        let first_pass: Vec<_> = due.clone().map(Flashcard::id).collect();
        let second_pass: Vec<_> = due.map(Flashcard::id).collect();

        assert_eq!(first_pass, second_pass);
        assert_eq!(deck.len(), 3);
    }

    #[test]
    fn upsert_moves_card_in_due_index() {
        let s = Scheduler::new();
        let today = fixed_today();
        let mut deck: CardDeck = vec![new_card(1)].into_iter().collect();
        assert_eq!(deck.peek_due(today).count(), 1);

        let reviewed = s.apply(deck.get(CardId::new(1)).unwrap(), q(5), fixed_now());
        deck.upsert(reviewed);

        assert_eq!(deck.peek_due(today).count(), 0);
        assert_eq!(deck.peek_due(today + Duration::days(1)).count(), 1);
        assert_eq!(deck.next_id(), CardId::new(2));
    }
}
