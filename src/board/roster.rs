use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::info;

use super::github::BoardProvider;
use crate::errors::BoardError;

/// Team name → member logins, as last fetched from the provider.
///
/// A rebuild fetches everything first and swaps the map in one step, so
/// readers see either the old roster or the new one.
pub struct TeamRoster {
    provider: Arc<dyn BoardProvider>,
    org: String,
    teams: Mutex<HashMap<String, HashSet<String>>>,
}

impl TeamRoster {
    pub fn new(provider: Arc<dyn BoardProvider>, org: &str) -> Self {
        Self {
            provider,
            org: org.to_string(),
            teams: Mutex::new(HashMap::new()),
        }
    }

    pub async fn rebuild_full(&self) -> Result<(), BoardError> {
        let teams = self
            .provider
            .list_teams(&self.org)
            .await
            .map_err(BoardError::Provider)?;

        let mut roster = HashMap::with_capacity(teams.len());
        for team in teams {
            let members = self
                .provider
                .list_team_members(team.id)
                .await
                .map_err(BoardError::Provider)?;
            roster.insert(
                team.name,
                members.into_iter().map(|u| u.login).collect::<HashSet<_>>(),
            );
        }

        info!(org = %self.org, teams = roster.len(), "team roster rebuilt");
        *self.lock() = roster;
        Ok(())
    }

    pub fn is_member(&self, team_name: &str, login: &str) -> bool {
        self.lock()
            .get(team_name)
            .is_some_and(|members| members.contains(login))
    }

    pub fn team_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashSet<String>>> {
        // The map is only ever replaced whole, so a poisoned guard still
        // holds a consistent roster.
        self.teams.lock().unwrap_or_else(|e| e.into_inner())
    }
}
