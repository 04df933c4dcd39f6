use std::sync::Arc;

use tracing::{debug, info};

use super::cache::BoardCache;
use super::models::Issue;
use super::roster::TeamRoster;
use crate::errors::BoardError;

/// Team names used to decide the direction of a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teams {
    pub qa: String,
    pub dev: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The card was moved into the named column.
    Moved { to: String },
    /// The card already sat in the target column.
    AlreadyThere,
    /// No rule applied.
    Skipped,
}

/// Moves cards between the developing and testing columns when an issue's
/// sole assignee belongs to the team that owns the other column.
pub struct TransitionEngine {
    board: Arc<BoardCache>,
    roster: Arc<TeamRoster>,
    teams: Teams,
}

impl TransitionEngine {
    pub fn new(board: Arc<BoardCache>, roster: Arc<TeamRoster>, teams: Teams) -> Self {
        Self {
            board,
            roster,
            teams,
        }
    }

    pub async fn on_assignee_changed(&self, issue: &Issue) -> Result<Transition, BoardError> {
        let [assignee] = issue.assignees.as_slice() else {
            debug!(issue = %issue.url, count = issue.assignees.len(), "not exactly one assignee");
            return Ok(Transition::Skipped);
        };
        if !issue.is_open() {
            return Ok(Transition::Skipped);
        }

        let column = match self.board.find_column_of_issue(&issue.url).await {
            Ok(column) => column,
            Err(BoardError::NotInTrackedColumns) => return Ok(Transition::Skipped),
            Err(e) => return Err(e),
        };

        let tracked = self.board.tracked();
        let login = assignee.login.as_str();
        let target = if column.name == tracked.developing
            && self.roster.is_member(&self.teams.qa, login)
        {
            &tracked.testing
        } else if column.name == tracked.testing && self.roster.is_member(&self.teams.dev, login) {
            &tracked.developing
        } else {
            return Ok(Transition::Skipped);
        };

        if self.board.move_issue_to_column(&issue.url, target).await? {
            info!(issue = %issue.url, assignee = login, from = %column.name, to = %target, "card moved on assignment");
            Ok(Transition::Moved { to: target.clone() })
        } else {
            Ok(Transition::AlreadyThere)
        }
    }
}
