//! Scheduling engine: one worker task per entity family behind a single
//! coordinator handle.
//!
//! Each worker drains its own queue in order, so commands within a family
//! never interleave while families run concurrently. Workers publish an
//! immutable, versioned snapshot after every successful commit; readers
//! take the latest snapshot without touching any queue.

mod attendance_worker;
mod events;
mod planner_worker;
mod review_worker;
mod snapshot;

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use storage::repository::StateStore;
use study_core::Clock;
use study_core::attendance::{GradeStanding, RiskTracker};
use study_core::model::{
    AttendanceSummary, CardDraft, CardId, CourseId, Flashcard, GradeDraft,
};
use study_core::planner::{Plan, Planner};
use study_core::scheduler::{CardDeck, Scheduler};
use study_core::settings::EngineSettings;

use crate::error::EngineError;
use attendance_worker::{AttendanceCommand, AttendanceWorker};
use planner_worker::{PlannerCommand, PlannerWorker};
use review_worker::{Reply, ReviewCommand, ReviewWorker};

pub use events::{EngineEvent, EngineOutcome, PlanReport, ReplanReason};
pub use snapshot::{
    AttendanceState, DashboardSnapshot, FamilyVersions, PlanState, ReviewState, Versioned,
};

const QUEUE_CAPACITY: usize = 64;

/// Handle to a running engine. Dropping it (or calling [`Engine::shutdown`])
/// closes the worker queues.
pub struct Engine {
    clock: RwLock<Clock>,
    review_tx: mpsc::Sender<ReviewCommand>,
    planner_tx: mpsc::Sender<PlannerCommand>,
    attendance_tx: mpsc::Sender<AttendanceCommand>,
    review: watch::Receiver<Arc<Versioned<ReviewState>>>,
    plan: watch::Receiver<Arc<Versioned<PlanState>>>,
    attendance: watch::Receiver<Arc<Versioned<AttendanceState>>>,
    workers: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Load persisted state and spawn the three workers.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for bad settings, `StorageUnavailable` if the
    /// store cannot be read, or `DuplicateRecord` if stored attendance is
    /// inconsistent.
    pub async fn start(
        store: Arc<dyn StateStore>,
        settings: EngineSettings,
        clock: Clock,
    ) -> Result<Self, EngineError> {
        settings.validate().map_err(EngineError::invalid)?;
        let state = store.load_state().await?;
        let today = clock.today();

        let scheduler = Scheduler::with_settings(settings.sm2.clone());
        let planner = Planner::with_settings(settings.planner.clone());

        let deck: CardDeck = state.cards.into_iter().collect();
        let tracker = RiskTracker::from_parts(settings.attendance, state.attendance, state.grades)?;

        // Warnings are not persisted; derive them from a dry run over the stored plan.
        let preview = planner.recalculate(
            &state.topics,
            &state.sessions,
            &planner.default_slots(today),
            today,
        );
        let plan_state = PlanState {
            topics: state.topics,
            plan: Plan {
                sessions: state.sessions,
                warnings: preview.warnings,
                priorities: preview.priorities,
            },
        };

        info!(
            cards = deck.len(),
            topics = plan_state.topics.len(),
            sessions = plan_state.plan.sessions.len(),
            attendance = tracker.ledger().len(),
            grades = tracker.grades().len(),
            "engine state loaded"
        );

        let (review_pub, review) = watch::channel(Versioned::initial(ReviewState { deck }));
        let (plan_pub, plan) = watch::channel(Versioned::initial(plan_state));
        let (attendance_pub, attendance) =
            watch::channel(Versioned::initial(AttendanceState { tracker }));

        let (review_tx, review_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (planner_tx, planner_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (attendance_tx, attendance_rx) = mpsc::channel(QUEUE_CAPACITY);

        let workers = vec![
            tokio::spawn(
                ReviewWorker::new(scheduler, Arc::clone(&store), review_pub).run(review_rx),
            ),
            tokio::spawn(PlannerWorker::new(planner, Arc::clone(&store), plan_pub).run(planner_rx)),
            tokio::spawn(AttendanceWorker::new(store, attendance_pub).run(attendance_rx)),
        ];

        Ok(Self {
            clock: RwLock::new(clock),
            review_tx,
            planner_tx,
            attendance_tx,
            review,
            plan,
            attendance,
            workers,
        })
    }

    /// Current time according to the engine clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock().now()
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.clock().today()
    }

    fn clock(&self) -> Clock {
        match self.clock.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replace the clock, e.g. to move a fixed clock forward in tests.
    pub fn set_clock(&self, clock: Clock) {
        match self.clock.write() {
            Ok(mut guard) => *guard = clock,
            Err(poisoned) => *poisoned.into_inner() = clock,
        }
    }

    /// Advance a fixed clock; no effect on the system clock.
    pub fn advance_clock(&self, delta: Duration) {
        let mut clock = self.clock();
        clock.advance(delta);
        self.set_clock(clock);
    }

    /// # Errors
    ///
    /// Returns `InvalidGrade` for a quality outside `0..=5`, `CardNotFound`,
    /// or `StorageUnavailable`.
    pub async fn submit_review(&self, card_id: CardId, quality: u8) -> Result<Flashcard, EngineError> {
        let at = self.now();
        request(&self.review_tx, "review", |reply| ReviewCommand::Review {
            card_id,
            quality,
            at,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` for blank card sides, or `StorageUnavailable`.
    pub async fn add_card(&self, draft: CardDraft) -> Result<Flashcard, EngineError> {
        let at = self.now();
        request(&self.review_tx, "review", |reply| ReviewCommand::AddCard {
            draft,
            at,
            reply,
        })
        .await
    }

    /// Apply `reason` and rebuild the plan from today on.
    ///
    /// # Errors
    ///
    /// Returns `TopicNotFound`, `SessionNotFound`, `SessionClosed`,
    /// `InvalidInput`, or `StorageUnavailable`. Over-commitment is reported
    /// in [`PlanReport::warnings`], not as an error.
    pub async fn request_replan(&self, reason: ReplanReason) -> Result<PlanReport, EngineError> {
        let today = self.today();
        request(&self.planner_tx, "planner", |reply| PlannerCommand::Replan {
            reason,
            today,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `DuplicateRecord` when the course already has a record for
    /// `date`, or `StorageUnavailable`.
    pub async fn record_attendance(
        &self,
        course_id: CourseId,
        date: NaiveDate,
        present: bool,
    ) -> Result<AttendanceSummary, EngineError> {
        request(&self.attendance_tx, "attendance", |reply| {
            AttendanceCommand::Record {
                course_id,
                date,
                present,
                reply,
            }
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` for an invalid grade entry, or `StorageUnavailable`.
    pub async fn record_grade(&self, draft: GradeDraft) -> Result<GradeStanding, EngineError> {
        request(&self.attendance_tx, "attendance", |reply| {
            AttendanceCommand::Grade { draft, reply }
        })
        .await
    }

    /// Route an event to the worker that owns it.
    ///
    /// # Errors
    ///
    /// Returns whatever the targeted operation returns.
    pub async fn dispatch(&self, event: EngineEvent) -> Result<EngineOutcome, EngineError> {
        debug!(?event, "dispatching event");
        match event {
            EngineEvent::CardReviewed { card_id, quality } => self
                .submit_review(card_id, quality)
                .await
                .map(EngineOutcome::Card),
            EngineEvent::CardAdded(draft) => self.add_card(draft).await.map(EngineOutcome::Card),
            EngineEvent::Replan(reason) => {
                self.request_replan(reason).await.map(EngineOutcome::Plan)
            }
            EngineEvent::AttendanceMarked {
                course_id,
                date,
                present,
            } => self
                .record_attendance(course_id, date, present)
                .await
                .map(EngineOutcome::Attendance),
            EngineEvent::GradeRecorded(draft) => {
                self.record_grade(draft).await.map(EngineOutcome::Grade)
            }
        }
    }

    /// Latest published review state.
    #[must_use]
    pub fn review_snapshot(&self) -> Arc<Versioned<ReviewState>> {
        self.review.borrow().clone()
    }

    #[must_use]
    pub fn plan_snapshot(&self) -> Arc<Versioned<PlanState>> {
        self.plan.borrow().clone()
    }

    #[must_use]
    pub fn attendance_snapshot(&self) -> Arc<Versioned<AttendanceState>> {
        self.attendance.borrow().clone()
    }

    /// Combined read-only view as of today. Never waits on a worker.
    #[must_use]
    pub fn dashboard_snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot::assemble(
            self.today(),
            &self.review_snapshot(),
            &self.plan_snapshot(),
            &self.attendance_snapshot(),
        )
    }

    /// Close the queues and wait for the workers to finish queued commands.
    pub async fn shutdown(self) {
        let Self {
            review_tx,
            planner_tx,
            attendance_tx,
            workers,
            ..
        } = self;
        drop(review_tx);
        drop(planner_tx);
        drop(attendance_tx);
        for worker in workers {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "engine worker panicked");
            }
        }
        info!("engine stopped");
    }
}

async fn request<C, T>(
    queue: &mpsc::Sender<C>,
    worker: &'static str,
    build: impl FnOnce(Reply<T>) -> C,
) -> Result<T, EngineError> {
    let (reply, response) = oneshot::channel();
    queue
        .send(build(reply))
        .await
        .map_err(|_| EngineError::WorkerStopped(worker))?;
    response
        .await
        .map_err(|_| EngineError::WorkerStopped(worker))?
}
