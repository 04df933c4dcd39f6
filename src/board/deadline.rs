//! Deadline bookkeeping for issues on the tracked columns.
//!
//! `DeadlineEngine` ties the directive parser, the deadline store and the
//! board cache together. It reacts to issue edits and card events, and runs
//! the periodic sweep that marks overdue issues with the `delayed` label.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::cache::BoardCache;
use super::db::DbHandle;
use super::directive::{Deadline, format_date, is_deadline_passed, parse_deadline};
use super::github::{BoardProvider, IssueRef, parse_issue_url};
use super::models::{Card, Issue, IssueDeadline};
use crate::errors::{BoardError, DirectiveError};

/// Label marking an issue whose deadline has passed.
pub const DELAYED_LABEL: &str = "delayed";

/// Comment posted when a new or changed directive is recorded.
pub fn deadline_comment(date: chrono::NaiveDate) -> String {
    format!("设置截止日期到 {}", format_date(date))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadlineOutcome {
    /// The issue has no card in a tracked column.
    NotTracked,
    /// A directive was found. `recorded` is set when the stored row changed.
    Set {
        deadline: Deadline,
        recorded: bool,
        overdue: bool,
    },
    /// No usable directive; any stored deadline was dropped.
    Cleared(DirectiveError),
}

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub overdue: usize,
    pub failed: usize,
}

pub struct DeadlineEngine {
    board: Arc<BoardCache>,
    db: DbHandle,
    provider: Arc<dyn BoardProvider>,
}

impl DeadlineEngine {
    pub fn new(board: Arc<BoardCache>, db: DbHandle, provider: Arc<dyn BoardProvider>) -> Self {
        Self {
            board,
            db,
            provider,
        }
    }

    /// Re-evaluate the deadline of an edited issue.
    pub async fn on_issue_edited(
        &self,
        issue: &Issue,
        now: DateTime<Utc>,
    ) -> Result<DeadlineOutcome, BoardError> {
        match self.board.find_column_of_issue(&issue.url).await {
            Ok(_) => {}
            Err(BoardError::NotInTrackedColumns) => {
                debug!(issue = %issue.url, "issue not on tracked columns");
                return Ok(DeadlineOutcome::NotTracked);
            }
            Err(e) => return Err(e),
        }

        let issue_ref = issue.issue_ref()?;
        match parse_deadline(&now, &issue.title) {
            Ok(deadline) => self.record(issue, &issue_ref, deadline, now).await,
            Err(reason) => {
                debug!(issue = %issue_ref, %reason, "no usable deadline directive");
                self.cancel(issue, &issue_ref).await?;
                Ok(DeadlineOutcome::Cleared(reason))
            }
        }
    }

    async fn record(
        &self,
        issue: &Issue,
        issue_ref: &IssueRef,
        deadline: Deadline,
        now: DateTime<Utc>,
    ) -> Result<DeadlineOutcome, BoardError> {
        let id = issue.id;
        let stored = self
            .db
            .call(move |db| db.get_deadline(id))
            .await
            .map_err(BoardError::Database)?;

        let recorded = stored.is_none_or(|row| row.directive != deadline.directive);
        if recorded {
            let row = IssueDeadline {
                id,
                date: deadline.date,
                directive: deadline.directive.clone(),
                url: issue.url.clone(),
            };
            self.db
                .call(move |db| db.upsert_deadline(&row))
                .await
                .map_err(BoardError::Database)?;
            info!(issue = %issue_ref, date = %deadline.date, directive = %deadline.directive, "deadline recorded");

            if let Err(e) = self
                .provider
                .create_comment(issue_ref, &deadline_comment(deadline.date))
                .await
            {
                warn!(issue = %issue_ref, "failed to post deadline comment: {:#}", e);
            }
        }

        let overdue = is_deadline_passed(deadline.date, &now);
        if overdue && !issue.has_label(DELAYED_LABEL) {
            self.add_delayed(issue_ref).await;
        } else if !overdue && issue.has_label(DELAYED_LABEL) {
            self.remove_delayed(issue_ref).await;
        }

        Ok(DeadlineOutcome::Set {
            deadline,
            recorded,
            overdue,
        })
    }

    async fn cancel(&self, issue: &Issue, issue_ref: &IssueRef) -> Result<(), BoardError> {
        let id = issue.id;
        let deleted = self
            .db
            .call(move |db| db.delete_deadline(id))
            .await
            .map_err(BoardError::Database)?;
        if deleted {
            info!(issue = %issue_ref, "deadline cancelled");
        }
        if issue.has_label(DELAYED_LABEL) {
            self.remove_delayed(issue_ref).await;
        }
        Ok(())
    }

    /// A card entered a tracked column: evaluate its issue from scratch.
    pub async fn on_card_tracked(
        &self,
        card: &Card,
        now: DateTime<Utc>,
    ) -> Result<DeadlineOutcome, BoardError> {
        let Some(url) = card.issue_url() else {
            return Ok(DeadlineOutcome::NotTracked);
        };
        let issue_ref = parse_issue_url(url)?;
        let issue = self
            .provider
            .get_issue(&issue_ref)
            .await
            .map_err(BoardError::Provider)?;
        self.on_issue_edited(&issue, now).await
    }

    /// A card left the tracked columns: forget its issue's deadline.
    /// Returns whether a row was deleted.
    pub async fn on_card_untracked(&self, card: &Card) -> Result<bool, BoardError> {
        let Some(url) = card.issue_url() else {
            return Ok(false);
        };
        let url = url.to_string();
        let deleted = self
            .db
            .call(move |db| match db.get_deadline_by_url(&url)? {
                Some(row) => db.delete_deadline(row.id),
                None => Ok(false),
            })
            .await
            .map_err(BoardError::Database)?;
        if deleted {
            info!(card = card.id, "deadline dropped with untracked card");
        }
        Ok(deleted)
    }

    /// Label every tracked issue whose stored deadline has passed.
    ///
    /// Only adds the label; clearing it is left to the next edit of the
    /// issue, which is when the directive can have changed.
    pub async fn sweep_all(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for url in self.board.tracked_issue_urls().await {
            report.checked += 1;
            let lookup = url.clone();
            let row = match self
                .db
                .call(move |db| db.get_deadline_by_url(&lookup))
                .await
            {
                Ok(Some(row)) => row,
                Ok(None) => continue,
                Err(e) => {
                    warn!(issue = %url, "failed to read deadline: {:#}", e);
                    report.failed += 1;
                    continue;
                }
            };
            if !is_deadline_passed(row.date, &now) {
                continue;
            }
            report.overdue += 1;

            let issue_ref = match parse_issue_url(&row.url) {
                Ok(r) => r,
                Err(e) => {
                    warn!("skipping overdue deadline: {}", e);
                    report.failed += 1;
                    continue;
                }
            };
            if !self.add_delayed(&issue_ref).await {
                report.failed += 1;
            }
        }

        info!(
            checked = report.checked,
            overdue = report.overdue,
            failed = report.failed,
            "deadline sweep finished"
        );
        report
    }

    async fn add_delayed(&self, issue_ref: &IssueRef) -> bool {
        match self.provider.add_label(issue_ref, DELAYED_LABEL).await {
            Ok(()) => {
                info!(issue = %issue_ref, "marked delayed");
                true
            }
            Err(e) => {
                warn!(issue = %issue_ref, "failed to add delayed label: {:#}", e);
                false
            }
        }
    }

    async fn remove_delayed(&self, issue_ref: &IssueRef) {
        match self.provider.remove_label(issue_ref, DELAYED_LABEL).await {
            Ok(()) => info!(issue = %issue_ref, "delayed label removed"),
            Err(e) => warn!(issue = %issue_ref, "failed to remove delayed label: {:#}", e),
        }
    }
}
