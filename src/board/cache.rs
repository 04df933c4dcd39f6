//! In-process snapshot of the tracked project board.
//!
//! `BoardCache` holds every column of the configured project and the cards of
//! the two tracked columns. It is rebuilt wholesale at startup and patched
//! incrementally from project-card webhook events afterwards. Every read and
//! write goes through one async mutex; provider calls made by `rebuild_full`
//! and `move_issue_to_column` run while it is held, so the snapshot never
//! exposes half-applied state.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::github::BoardProvider;
use super::models::{Card, Column};
use crate::errors::BoardError;

/// Position cards are placed at when moved between columns.
const MOVE_POSITION: &str = "top";

/// Names of the two columns the service manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedColumns {
    pub testing: String,
    pub developing: String,
}

impl TrackedColumns {
    pub fn contains(&self, name: &str) -> bool {
        name == self.testing || name == self.developing
    }
}

/// What an incremental event did to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardChange {
    /// The card entered a tracked column.
    Inserted,
    /// The card was already tracked and its cached copy was replaced.
    Updated,
    /// The card left the tracked columns or was deleted.
    Evicted,
    /// The card is not and was not tracked.
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct BoardSnapshot {
    pub columns: Vec<Column>,
    pub cards: Vec<Card>,
}

impl BoardSnapshot {
    fn column(&self, id: Option<i64>) -> Option<&Column> {
        let id = id?;
        self.columns.iter().find(|c| c.id == id)
    }

    fn card_index(&self, id: i64) -> Option<usize> {
        self.cards.iter().position(|c| c.id == id)
    }

    fn tracked_column(&self, card: &Card, tracked: &TrackedColumns) -> Option<&Column> {
        self.column(card.column_id)
            .filter(|column| tracked.contains(&column.name))
    }
}

pub struct BoardCache {
    provider: Arc<dyn BoardProvider>,
    org: String,
    project_name: String,
    tracked: TrackedColumns,
    state: Mutex<BoardSnapshot>,
}

impl BoardCache {
    pub fn new(
        provider: Arc<dyn BoardProvider>,
        org: &str,
        project_name: &str,
        tracked: TrackedColumns,
    ) -> Self {
        Self {
            provider,
            org: org.to_string(),
            project_name: project_name.to_string(),
            tracked,
            state: Mutex::new(BoardSnapshot::default()),
        }
    }

    pub fn tracked(&self) -> &TrackedColumns {
        &self.tracked
    }

    /// Re-fetch the whole board. On failure the previous snapshot is kept.
    pub async fn rebuild_full(&self) -> Result<(), BoardError> {
        let mut state = self.state.lock().await;

        let projects = self
            .provider
            .list_projects(&self.org)
            .await
            .map_err(BoardError::Provider)?;
        let project = projects
            .into_iter()
            .find(|p| p.name == self.project_name)
            .ok_or_else(|| BoardError::ProjectNotFound {
                project: self.project_name.clone(),
                org: self.org.clone(),
            })?;

        let columns = self
            .provider
            .list_columns(project.id)
            .await
            .map_err(BoardError::Provider)?;

        let mut cards = Vec::new();
        for column in columns.iter().filter(|c| self.tracked.contains(&c.name)) {
            let column_cards = self
                .provider
                .list_cards(column.id)
                .await
                .map_err(BoardError::Provider)?;
            info!(column = %column.name, count = column_cards.len(), "loaded column cards");
            cards.extend(column_cards.into_iter().map(|card| Card {
                column_id: Some(column.id),
                ..card
            }));
        }

        *state = BoardSnapshot { columns, cards };
        Ok(())
    }

    pub async fn apply_card_created(&self, card: &Card) -> CardChange {
        self.reconcile("created", card).await
    }

    pub async fn apply_card_converted(&self, card: &Card) -> CardChange {
        self.reconcile("converted", card).await
    }

    pub async fn apply_card_moved(&self, card: &Card) -> CardChange {
        self.reconcile("moved", card).await
    }

    pub async fn apply_card_deleted(&self, card: &Card) -> CardChange {
        let mut state = self.state.lock().await;
        let change = match state.card_index(card.id) {
            Some(index) => {
                state.cards.remove(index);
                CardChange::Evicted
            }
            None => CardChange::Ignored,
        };
        debug!(card = card.id, ?change, "card deleted");
        change
    }

    /// Bring the cached copy of `card` in line with the column it reports.
    async fn reconcile(&self, action: &str, card: &Card) -> CardChange {
        let mut state = self.state.lock().await;
        let in_tracked = state.tracked_column(card, &self.tracked).is_some();
        let change = match (in_tracked, state.card_index(card.id)) {
            (true, Some(index)) => {
                state.cards[index] = card.clone();
                CardChange::Updated
            }
            (true, None) => {
                state.cards.push(card.clone());
                CardChange::Inserted
            }
            (false, Some(index)) => {
                state.cards.remove(index);
                CardChange::Evicted
            }
            (false, None) => CardChange::Ignored,
        };
        debug!(card = card.id, action, ?change, "card event applied");
        change
    }

    /// The tracked column `card` sits in, by its reported column id.
    pub async fn find_column_of(&self, card: &Card) -> Result<Column, BoardError> {
        let state = self.state.lock().await;
        state
            .tracked_column(card, &self.tracked)
            .cloned()
            .ok_or(BoardError::NotInTrackedColumns)
    }

    /// The tracked column holding the card for `issue_url`.
    pub async fn find_column_of_issue(&self, issue_url: &str) -> Result<Column, BoardError> {
        let state = self.state.lock().await;
        state
            .cards
            .iter()
            .find(|c| c.issue_url() == Some(issue_url))
            .and_then(|card| state.tracked_column(card, &self.tracked))
            .cloned()
            .ok_or(BoardError::NotInTrackedColumns)
    }

    /// Move the card for `issue_url` to the column named `column_name`.
    ///
    /// Returns `Ok(false)` when the card is already there. The cached column
    /// id only changes once the provider accepted the move.
    pub async fn move_issue_to_column(
        &self,
        issue_url: &str,
        column_name: &str,
    ) -> Result<bool, BoardError> {
        let mut state = self.state.lock().await;

        let column_id = state
            .columns
            .iter()
            .find(|c| c.name == column_name)
            .map(|c| c.id)
            .ok_or_else(|| BoardError::ColumnNotFound {
                column: column_name.to_string(),
                project: self.project_name.clone(),
            })?;
        let index = state
            .cards
            .iter()
            .position(|c| c.issue_url() == Some(issue_url))
            .ok_or(BoardError::NotInTrackedColumns)?;

        if state.cards[index].column_id == Some(column_id) {
            return Ok(false);
        }

        let card_id = state.cards[index].id;
        self.provider
            .move_card(card_id, column_id, MOVE_POSITION)
            .await
            .map_err(BoardError::Provider)?;
        state.cards[index].column_id = Some(column_id);
        info!(card = card_id, column = column_name, "moved card");
        Ok(true)
    }

    /// Issue URLs of every cached issue card, copied out so callers can do
    /// network work without holding the lock.
    pub async fn tracked_issue_urls(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .cards
            .iter()
            .filter_map(|c| c.issue_url().map(str::to_string))
            .collect()
    }

    pub async fn snapshot(&self) -> BoardSnapshot {
        self.state.lock().await.clone()
    }
}
