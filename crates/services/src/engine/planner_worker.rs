use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use storage::repository::{StateDelta, StateStore};
use study_core::model::{SessionId, SessionStatus, StudySession, Topic, TopicId, TopicStatus};
use study_core::planner::{PlanWarning, Planner};

use super::events::{PlanReport, ReplanReason};
use super::review_worker::Reply;
use super::snapshot::{PlanState, Versioned};
use crate::error::EngineError;

pub(crate) enum PlannerCommand {
    Replan {
        reason: ReplanReason,
        today: NaiveDate,
        reply: Reply<PlanReport>,
    },
}

/// Working copy of the planner family while a command is applied.
struct Draft {
    topics: BTreeMap<TopicId, Topic>,
    sessions: Vec<StudySession>,
    changed_topics: BTreeSet<TopicId>,
}

impl Draft {
    fn from_state(state: &PlanState) -> Self {
        Self {
            topics: state.topics.iter().map(|t| (t.id(), t.clone())).collect(),
            sessions: state.plan.sessions.clone(),
            changed_topics: BTreeSet::new(),
        }
    }

    fn topic_mut(&mut self, topic_id: TopicId) -> Result<&mut Topic, EngineError> {
        self.changed_topics.insert(topic_id);
        self.topics
            .get_mut(&topic_id)
            .ok_or(EngineError::TopicNotFound(topic_id))
    }

    fn next_topic_id(&self) -> TopicId {
        self.topics
            .keys()
            .next_back()
            .map_or(TopicId::new(1), |id| id.next())
    }

    /// Apply the event's own change. Returns the topic it touched.
    fn apply(&mut self, reason: ReplanReason) -> Result<Option<TopicId>, EngineError> {
        match reason {
            ReplanReason::TopicAdded(draft) => {
                let id = self.next_topic_id();
                let topic = draft.into_topic(id).map_err(EngineError::invalid)?;
                self.topics.insert(id, topic);
                self.changed_topics.insert(id);
                Ok(Some(id))
            }
            ReplanReason::TopicEdited { topic_id, draft } => {
                self.topic_mut(topic_id)?
                    .apply_edit(draft)
                    .map_err(EngineError::invalid)?;
                Ok(Some(topic_id))
            }
            ReplanReason::TopicCompleted(topic_id) => {
                self.topic_mut(topic_id)?.mark_done();
                Ok(Some(topic_id))
            }
            ReplanReason::TopicArchived(topic_id) => {
                self.topic_mut(topic_id)?.archive();
                Ok(Some(topic_id))
            }
            ReplanReason::DeadlineChanged { topic_id, deadline } => {
                self.topic_mut(topic_id)?.set_deadline(deadline);
                Ok(Some(topic_id))
            }
            ReplanReason::SessionCompleted(session_id) => self.complete_session(session_id),
            ReplanReason::TimeTick | ReplanReason::Manual => Ok(None),
        }
    }

    fn complete_session(&mut self, session_id: SessionId) -> Result<Option<TopicId>, EngineError> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(EngineError::SessionNotFound(session_id))?;
        if session.is_history() {
            return Err(EngineError::SessionClosed(session_id));
        }
        session.status = SessionStatus::Completed;
        let topic_id = session.topic_id;

        let topic = self.topic_mut(topic_id)?;
        if topic.status() == TopicStatus::Pending {
            topic.start();
        }
        Ok(Some(topic_id))
    }
}

/// Owns topics and the session plan; the only writer of either.
pub(crate) struct PlannerWorker {
    planner: Planner,
    store: Arc<dyn StateStore>,
    published: watch::Sender<Arc<Versioned<PlanState>>>,
}

impl PlannerWorker {
    pub(crate) fn new(
        planner: Planner,
        store: Arc<dyn StateStore>,
        published: watch::Sender<Arc<Versioned<PlanState>>>,
    ) -> Self {
        Self {
            planner,
            store,
            published,
        }
    }

    pub(crate) async fn run(self, mut commands: mpsc::Receiver<PlannerCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                PlannerCommand::Replan {
                    reason,
                    today,
                    reply,
                } => {
                    let result = self.replan(reason, today).await;
                    let _ = reply.send(result);
                }
            }
        }
        debug!("planner worker stopped");
    }

    async fn replan(
        &self,
        reason: ReplanReason,
        today: NaiveDate,
    ) -> Result<PlanReport, EngineError> {
        let label = reason.label();
        let current = self.published.borrow().clone();
        let mut draft = Draft::from_state(&current.value);
        let touched_topic = draft.apply(reason)?;

        let topics: Vec<Topic> = draft.topics.values().cloned().collect();
        let slots = self.planner.default_slots(today);
        let plan = self
            .planner
            .recalculate(&topics, &draft.sessions, &slots, today);

        let kept: BTreeSet<SessionId> = plan.sessions.iter().map(|s| s.id).collect();
        let delta = StateDelta {
            topics: draft
                .changed_topics
                .iter()
                .filter_map(|id| draft.topics.get(id).cloned())
                .collect(),
            sessions: plan.sessions.clone(),
            removed_sessions: current
                .value
                .plan
                .sessions
                .iter()
                .map(|s| s.id)
                .filter(|id| !kept.contains(id))
                .collect(),
            ..StateDelta::default()
        };

        if let Err(err) = self.store.save_state(&delta).await {
            warn!(reason = label, error = %err, "plan write failed; keeping previous plan");
            return Err(err.into());
        }

        for warning in &plan.warnings {
            let PlanWarning::Overcommitted {
                topic_id,
                deadline,
                remaining_minutes,
                allocated_minutes,
            } = warning;
            warn!(
                topic_id = %topic_id,
                %deadline,
                remaining_minutes,
                allocated_minutes,
                "topic is overcommitted"
            );
        }

        let next = current.succeed(PlanState { topics, plan });
        let report = PlanReport {
            sessions: next.value.plan.sessions.clone(),
            warnings: next.value.plan.warnings.clone(),
            touched_topic,
            version: next.version,
        };
        info!(
            reason = label,
            sessions = report.sessions.len(),
            warnings = report.warnings.len(),
            version = report.version,
            "plan recalculated"
        );
        self.published.send_replace(next);
        Ok(report)
    }
}
