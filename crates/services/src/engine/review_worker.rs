use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use storage::repository::{StateDelta, StateStore};
use study_core::model::{CardDraft, CardId, Flashcard};
use study_core::scheduler::Scheduler;

use super::snapshot::{ReviewState, Versioned};
use crate::error::EngineError;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

pub(crate) enum ReviewCommand {
    Review {
        card_id: CardId,
        quality: u8,
        at: DateTime<Utc>,
        reply: Reply<Flashcard>,
    },
    AddCard {
        draft: CardDraft,
        at: DateTime<Utc>,
        reply: Reply<Flashcard>,
    },
}

/// Owns the flashcard family; the only writer of card review state.
pub(crate) struct ReviewWorker {
    scheduler: Scheduler,
    store: Arc<dyn StateStore>,
    published: watch::Sender<Arc<Versioned<ReviewState>>>,
}

impl ReviewWorker {
    pub(crate) fn new(
        scheduler: Scheduler,
        store: Arc<dyn StateStore>,
        published: watch::Sender<Arc<Versioned<ReviewState>>>,
    ) -> Self {
        Self {
            scheduler,
            store,
            published,
        }
    }

    pub(crate) async fn run(self, mut commands: mpsc::Receiver<ReviewCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                ReviewCommand::Review {
                    card_id,
                    quality,
                    at,
                    reply,
                } => {
                    let result = self.review(card_id, quality, at).await;
                    let _ = reply.send(result);
                }
                ReviewCommand::AddCard { draft, at, reply } => {
                    let result = self.add_card(draft, at).await;
                    let _ = reply.send(result);
                }
            }
        }
        debug!("review worker stopped");
    }

    async fn review(
        &self,
        card_id: CardId,
        quality: u8,
        at: DateTime<Utc>,
    ) -> Result<Flashcard, EngineError> {
        let current = self.published.borrow().clone();
        let card = current
            .value
            .deck
            .get(card_id)
            .ok_or(EngineError::CardNotFound(card_id))?;
        let reviewed = self.scheduler.review(card, quality, at)?;

        self.commit(&current, reviewed.clone()).await?;
        info!(
            card_id = %card_id,
            quality,
            interval_days = reviewed.interval_days(),
            ease_factor = reviewed.ease_factor(),
            due = %reviewed.due_date(),
            "card reviewed"
        );
        Ok(reviewed)
    }

    async fn add_card(&self, draft: CardDraft, at: DateTime<Utc>) -> Result<Flashcard, EngineError> {
        let current = self.published.borrow().clone();
        let id = current.value.deck.next_id();
        let card = draft
            .into_card(id, self.scheduler.settings().initial_ease, at.date_naive())
            .map_err(EngineError::invalid)?;

        self.commit(&current, card.clone()).await?;
        info!(card_id = %id, "card added");
        Ok(card)
    }

    async fn commit(
        &self,
        current: &Versioned<ReviewState>,
        card: Flashcard,
    ) -> Result<(), EngineError> {
        if let Err(err) = self.store.save_state(&StateDelta::card(card.clone())).await {
            warn!(card_id = %card.id(), error = %err, "card write failed; state unchanged");
            return Err(err.into());
        }
        let mut next = current.value.clone();
        next.deck.upsert(card);
        self.published.send_replace(current.succeed(next));
        Ok(())
    }
}
