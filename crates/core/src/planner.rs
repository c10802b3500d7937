//! Timetable planner.
//!
//! Each re-plan keeps completed and missed sessions as history, turns planned
//! sessions whose day has passed into `Missed`, throws away every planned
//! session from today on, and fills the available slots again with a
//! deadline-nearest, effort-weighted greedy pass. The pass is deterministic:
//! identical inputs always produce identical sessions, ids included.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{SessionId, SessionStatus, StudySession, Topic, TopicId};
use crate::settings::PlannerSettings;
use crate::time::days_between;

/// Study time available on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub date: NaiveDate,
    pub minutes: u32,
}

/// Non-fatal findings that accompany a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// Not enough time before the deadline to cover the remaining effort.
    Overcommitted {
        topic_id: TopicId,
        deadline: NaiveDate,
        remaining_minutes: u32,
        allocated_minutes: u32,
    },
}

/// Priority the planner computed for an open topic during a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicPriority {
    pub topic_id: TopicId,
    pub priority: f64,
    pub remaining_minutes: u32,
}

/// Result of a re-plan: history plus freshly planned sessions, ordered by
/// date then id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub sessions: Vec<StudySession>,
    pub warnings: Vec<PlanWarning>,
    /// Open topics in the order they were served.
    pub priorities: Vec<TopicPriority>,
}

impl Plan {
    /// Planned sessions dated on or after `today`.
    pub fn upcoming(&self, today: NaiveDate) -> impl Iterator<Item = &StudySession> + '_ {
        self.sessions
            .iter()
            .filter(move |s| s.status == SessionStatus::Planned && s.scheduled_date >= today)
    }

    /// Minutes of planned (not yet studied) time for one topic.
    #[must_use]
    pub fn planned_minutes(&self, topic_id: TopicId) -> u32 {
        self.sessions
            .iter()
            .filter(|s| s.topic_id == topic_id && s.status == SessionStatus::Planned)
            .fold(0, |total, s| total.saturating_add(s.duration_minutes))
    }

    #[must_use]
    pub fn is_overcommitted(&self, topic_id: TopicId) -> bool {
        self.warnings.iter().any(|w| match w {
            PlanWarning::Overcommitted { topic_id: id, .. } => *id == topic_id,
        })
    }
}

struct Candidate<'a> {
    topic: &'a Topic,
    priority: f64,
    remaining: u32,
    allocated: u32,
}

impl Candidate<'_> {
    fn can_use(&self, date: NaiveDate, today: NaiveDate) -> bool {
        match self.topic.deadline() {
            None => true,
            // Overdue topics may use any slot; others only slots up to the deadline.
            Some(deadline) => deadline < today || date <= deadline,
        }
    }

    fn unallocated(&self) -> u32 {
        self.remaining - self.allocated
    }
}

/// Greedy planner over a set of topics and available slots.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    settings: PlannerSettings,
}

impl Planner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_settings(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Slots for the configured weekly availability across the horizon.
    #[must_use]
    pub fn default_slots(&self, today: NaiveDate) -> Vec<AvailableSlot> {
        self.settings.slots_from(today)
    }

    /// `1 / max(1, days until deadline)`, or the configured floor when there is no deadline.
    #[must_use]
    pub fn urgency(&self, deadline: Option<NaiveDate>, today: NaiveDate) -> f64 {
        match deadline {
            None => self.settings.no_deadline_urgency,
            #[allow(clippy::cast_precision_loss)]
            Some(deadline) => 1.0 / days_between(today, deadline).max(1) as f64,
        }
    }

    /// `urgency × weight`, where weight is remaining effort per minute of
    /// study time available before the deadline (or in the whole horizon
    /// when the topic has none). Closed topics have priority zero.
    #[must_use]
    pub fn priority(
        &self,
        topic: &Topic,
        remaining_minutes: u32,
        available_minutes: u32,
        today: NaiveDate,
    ) -> f64 {
        if !topic.is_schedulable() || remaining_minutes == 0 {
            return 0.0;
        }
        let weight = f64::from(remaining_minutes) / f64::from(available_minutes.max(1));
        self.urgency(topic.deadline(), today) * weight
    }

    /// Rebuild the session plan.
    ///
    /// `existing` is the full session list from the previous plan. Slots
    /// dated before `today` are ignored.
    #[must_use]
    pub fn recalculate(
        &self,
        topics: &[Topic],
        existing: &[StudySession],
        slots: &[AvailableSlot],
        today: NaiveDate,
    ) -> Plan {
        let history = settle_history(existing, today);

        let mut studied: HashMap<TopicId, u32> = HashMap::new();
        for session in history.iter().filter(|s| s.is_completed()) {
            let minutes = studied.entry(session.topic_id).or_default();
            *minutes = minutes.saturating_add(session.duration_minutes);
        }

        let slots = merge_slots(slots, today);
        let horizon_minutes = total_minutes(&slots);
        let minutes_until = |deadline: NaiveDate| -> u32 {
            let reachable = slots.partition_point(|s| s.date <= deadline);
            total_minutes(&slots[..reachable])
        };

        let mut candidates: Vec<Candidate<'_>> = topics
            .iter()
            .filter(|t| t.is_schedulable())
            .filter_map(|topic| {
                let done = studied.get(&topic.id()).copied().unwrap_or(0);
                let remaining = topic.estimated_effort_minutes().saturating_sub(done);
                if remaining == 0 {
                    return None;
                }
                let available = topic
                    .deadline()
                    .map_or(horizon_minutes, |deadline| minutes_until(deadline));
                Some(Candidate {
                    topic,
                    priority: self.priority(topic, remaining, available, today),
                    remaining,
                    allocated: 0,
                })
            })
            .collect();
        candidates.sort_by(serve_order);

        let mut next_id = history
            .iter()
            .map(|s| s.id)
            .max()
            .map_or(SessionId::new(1), |id| id.next());
        let mut planned = Vec::new();

        for slot in &slots {
            let mut left = slot.minutes;
            for candidate in candidates.iter_mut() {
                if left == 0 {
                    break;
                }
                if candidate.unallocated() == 0 || !candidate.can_use(slot.date, today) {
                    continue;
                }
                let take = left.min(candidate.unallocated());
                planned.push(StudySession::planned(
                    next_id,
                    candidate.topic.id(),
                    slot.date,
                    take,
                ));
                next_id = next_id.next();
                candidate.allocated += take;
                left -= take;
            }
        }

        let warnings = candidates
            .iter()
            .filter(|c| c.allocated < c.remaining)
            .filter_map(|c| {
                c.topic.deadline().map(|deadline| PlanWarning::Overcommitted {
                    topic_id: c.topic.id(),
                    deadline,
                    remaining_minutes: c.remaining,
                    allocated_minutes: c.allocated,
                })
            })
            .collect();

        let priorities = candidates
            .iter()
            .map(|c| TopicPriority {
                topic_id: c.topic.id(),
                priority: c.priority,
                remaining_minutes: c.remaining,
            })
            .collect();

        let mut sessions = history;
        sessions.extend(planned);
        sessions.sort_by_key(|s| (s.scheduled_date, s.id));

        Plan {
            sessions,
            warnings,
            priorities,
        }
    }
}

/// Keep completed/missed sessions; planned sessions whose day has passed become missed.
fn settle_history(existing: &[StudySession], today: NaiveDate) -> Vec<StudySession> {
    existing
        .iter()
        .filter(|s| s.is_history() || s.scheduled_date < today)
        .cloned()
        .map(|mut s| {
            if s.status == SessionStatus::Planned {
                s.status = SessionStatus::Missed;
            }
            s
        })
        .collect()
}

/// Usable slots in date order, one per day.
fn merge_slots(slots: &[AvailableSlot], today: NaiveDate) -> Vec<AvailableSlot> {
    let mut by_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for slot in slots.iter().filter(|s| s.date >= today && s.minutes > 0) {
        let minutes = by_day.entry(slot.date).or_default();
        *minutes = minutes.saturating_add(slot.minutes);
    }
    by_day
        .into_iter()
        .map(|(date, minutes)| AvailableSlot { date, minutes })
        .collect()
}

fn total_minutes(slots: &[AvailableSlot]) -> u32 {
    slots
        .iter()
        .fold(0, |total, s| total.saturating_add(s.minutes))
}

/// Highest priority first; nearer deadlines, then lower ids, break ties.
fn serve_order(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| match (a.topic.deadline(), b.topic.deadline()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.topic.id().cmp(&b.topic.id()))
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TopicDraft;
    use crate::time::fixed_today;
    use chrono::Duration;

    fn day(offset: i64) -> NaiveDate {
        fixed_today() + Duration::days(offset)
    }

    fn topic(id: u64, effort: u32, deadline: Option<i64>) -> Topic {
        let mut draft = TopicDraft::new(format!("Topic {id}"), effort);
        if let Some(offset) = deadline {
            draft = draft.with_deadline(day(offset));
        }
        draft.into_topic(TopicId::new(id)).unwrap()
    }

    fn slot(offset: i64, minutes: u32) -> AvailableSlot {
        AvailableSlot {
            date: day(offset),
            minutes,
        }
    }

    fn minutes_for(plan: &Plan, id: u64) -> u32 {
        plan.planned_minutes(TopicId::new(id))
    }

    #[test]
    fn short_deadline_takes_all_time_and_is_flagged() {
        let planner = Planner::new();
        let topics = vec![topic(1, 240, Some(2)), topic(2, 600, None)];
        let slots = vec![slot(0, 120), slot(1, 60)];

        let plan = planner.recalculate(&topics, &[], &slots, fixed_today());

        assert_eq!(minutes_for(&plan, 1), 180);
        assert_eq!(minutes_for(&plan, 2), 0);
        assert_eq!(
            plan.warnings,
            vec![PlanWarning::Overcommitted {
                topic_id: TopicId::new(1),
                deadline: day(2),
                remaining_minutes: 240,
                allocated_minutes: 180,
            }]
        );
        assert!(!plan.is_overcommitted(TopicId::new(2)));
    }

    #[test]
    fn recalculation_is_idempotent() {
        let planner = Planner::new();
        let topics = vec![
            topic(1, 300, Some(5)),
            topic(2, 200, Some(3)),
            topic(3, 500, None),
        ];
        let slots = planner.default_slots(fixed_today());

        let first = planner.recalculate(&topics, &[], &slots, fixed_today());
        let second = planner.recalculate(&topics, &[], &slots, fixed_today());
        assert_eq!(first, second);

        // Feeding the plan back in supersedes its own planned sessions.
        let replayed = planner.recalculate(&topics, &first.sessions, &slots, fixed_today());
        assert_eq!(first.sessions, replayed.sessions);
    }

    #[test]
    fn done_topics_get_no_time() {
        let planner = Planner::new();
        let mut finished = topic(1, 300, Some(3));
        finished.mark_done();
        let topics = vec![finished, topic(2, 60, None)];

        let plan = planner.recalculate(&topics, &[], &[slot(0, 120)], fixed_today());

        assert_eq!(minutes_for(&plan, 1), 0);
        assert_eq!(minutes_for(&plan, 2), 60);
        assert!(plan.priorities.iter().all(|p| p.topic_id != TopicId::new(1)));
    }

    #[test]
    fn history_is_kept_and_past_planned_sessions_become_missed() {
        let planner = Planner::new();
        let topics = vec![topic(1, 180, Some(10))];
        let existing = vec![
            StudySession {
                status: SessionStatus::Completed,
                ..StudySession::planned(SessionId::new(1), TopicId::new(1), day(-2), 60)
            },
            StudySession::planned(SessionId::new(2), TopicId::new(1), day(-1), 60),
            StudySession::planned(SessionId::new(3), TopicId::new(1), day(1), 60),
        ];

        let plan = planner.recalculate(&topics, &existing, &[slot(0, 240)], fixed_today());

        let by_id = |id: u64| plan.sessions.iter().find(|s| s.id == SessionId::new(id));
        assert_eq!(by_id(1).unwrap().status, SessionStatus::Completed);
        assert_eq!(by_id(2).unwrap().status, SessionStatus::Missed);
        // Future planned session was superseded; its id is reused by the new plan.
        let fresh: Vec<_> = plan.upcoming(fixed_today()).collect();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, SessionId::new(3));
        // 180 estimated - 60 completed; the missed hour is re-queued.
        assert_eq!(fresh[0].duration_minutes, 120);
        assert_eq!(fresh[0].scheduled_date, fixed_today());
    }

    #[test]
    fn deadline_topic_is_not_scheduled_after_its_deadline() {
        let planner = Planner::new();
        let topics = vec![topic(1, 300, Some(1)), topic(2, 120, None)];
        let slots = vec![slot(0, 60), slot(1, 60), slot(2, 120)];

        let plan = planner.recalculate(&topics, &[], &slots, fixed_today());

        assert!(
            plan.upcoming(fixed_today())
                .filter(|s| s.topic_id == TopicId::new(1))
                .all(|s| s.scheduled_date <= day(1))
        );
        assert_eq!(minutes_for(&plan, 1), 120);
        assert_eq!(minutes_for(&plan, 2), 120);
        assert!(plan.is_overcommitted(TopicId::new(1)));
    }

    #[test]
    fn overdue_topics_are_served_first() {
        let planner = Planner::new();
        let topics = vec![topic(1, 60, Some(7)), topic(2, 60, Some(-3))];

        let plan = planner.recalculate(&topics, &[], &[slot(0, 60), slot(1, 60)], fixed_today());

        let first = plan.upcoming(fixed_today()).next().unwrap();
        assert_eq!(first.topic_id, TopicId::new(2));
        assert_eq!(first.scheduled_date, fixed_today());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn slot_is_shared_once_top_topic_is_covered() {
        let planner = Planner::new();
        let topics = vec![topic(1, 30, Some(1)), topic(2, 300, Some(20))];

        let plan = planner.recalculate(&topics, &[], &[slot(0, 90)], fixed_today());

        let today: Vec<_> = plan.upcoming(fixed_today()).collect();
        assert_eq!(today.len(), 2);
        assert_eq!(today[0].topic_id, TopicId::new(1));
        assert_eq!(today[0].duration_minutes, 30);
        assert_eq!(today[1].duration_minutes, 60);
    }

    #[test]
    fn past_slots_are_ignored() {
        let planner = Planner::new();
        let plan = planner.recalculate(&[topic(1, 60, None)], &[], &[slot(-1, 60)], fixed_today());
        assert!(plan.sessions.is_empty());
    }

    #[test]
    fn nearer_deadline_has_higher_urgency() {
        let planner = Planner::new();
        let today = fixed_today();
        assert!(planner.urgency(Some(day(1)), today) > planner.urgency(Some(day(5)), today));
        assert!((planner.urgency(Some(day(-4)), today) - 1.0).abs() < f64::EPSILON);
        assert!(planner.urgency(None, today) < planner.urgency(Some(day(10)), today));
    }

    #[test]
    fn saturated_slots_do_not_overflow_capacity() {
        let planner = Planner::new();
        let topics = vec![topic(1, 60, Some(3)), topic(2, 60, None)];
        let slots = vec![slot(0, u32::MAX), slot(0, 10), slot(1, u32::MAX)];

        let plan = planner.recalculate(&topics, &[], &slots, fixed_today());

        assert_eq!(minutes_for(&plan, 1), 60);
        assert_eq!(minutes_for(&plan, 2), 60);
        assert!(plan.sessions.iter().all(|s| s.scheduled_date == fixed_today()));
        assert!(plan.warnings.is_empty());
    }
}
