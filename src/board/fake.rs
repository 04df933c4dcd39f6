//! In-memory `BoardProvider` for tests.
//!
//! Holds a canned board and records every mutating call so tests can
//! assert on what would have been sent to GitHub.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;

use super::github::{BoardProvider, IssueRef};
use super::models::{Card, Column, Issue, Project, Team, User};

/// A mutating call as seen by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    MoveCard { card_id: i64, column_id: i64 },
    AddLabel { issue: String, label: String },
    RemoveLabel { issue: String, label: String },
    Comment { issue: String, body: String },
}

#[derive(Default)]
struct FakeBoard {
    projects: Vec<Project>,
    columns: HashMap<i64, Vec<Column>>,
    cards: HashMap<i64, Vec<Card>>,
    teams: Vec<Team>,
    issues: HashMap<String, Issue>,
}

#[derive(Default)]
pub struct FakeProvider {
    board: Mutex<FakeBoard>,
    calls: Mutex<Vec<ProviderCall>>,
    fail_moves: AtomicBool,
    fail_lists: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, id: i64, name: &str, columns: &[(i64, &str)]) -> Self {
        {
            let mut board = self.board.lock().unwrap();
            board.projects.push(Project {
                id,
                name: name.to_string(),
            });
            let columns = columns
                .iter()
                .enumerate()
                .map(|(position, (id, name))| Column {
                    id: *id,
                    name: name.to_string(),
                    position,
                })
                .collect();
            board.columns.insert(id, columns);
        }
        self
    }

    /// Add a card listed under `column_id`. An empty `content_url` makes a note.
    pub fn with_card(self, column_id: i64, card_id: i64, content_url: &str) -> Self {
        self.board
            .lock()
            .unwrap()
            .cards
            .entry(column_id)
            .or_default()
            .push(Card {
                id: card_id,
                content_url: Some(content_url.to_string()).filter(|u| !u.is_empty()),
                column_id: None,
            });
        self
    }

    pub fn with_team(self, id: i64, name: &str, members: &[&str]) -> Self {
        self.board.lock().unwrap().teams.push(Team {
            id,
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    pub fn with_issue(self, issue: Issue) -> Self {
        self.board
            .lock()
            .unwrap()
            .issues
            .insert(issue.url.clone(), issue);
        self
    }

    /// Replace a team's members, as if membership changed upstream.
    pub fn set_team_members(&self, team_id: i64, members: &[&str]) {
        let mut board = self.board.lock().unwrap();
        if let Some(team) = board.teams.iter_mut().find(|t| t.id == team_id) {
            team.members = members.iter().map(|m| m.to_string()).collect();
        }
    }

    pub fn fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_lists(&self) -> Result<()> {
        if self.fail_lists.load(Ordering::SeqCst) {
            bail!("list request failed");
        }
        Ok(())
    }
}

#[async_trait]
impl BoardProvider for FakeProvider {
    async fn list_projects(&self, _org: &str) -> Result<Vec<Project>> {
        self.check_lists()?;
        Ok(self.board.lock().unwrap().projects.clone())
    }

    async fn list_columns(&self, project_id: i64) -> Result<Vec<Column>> {
        self.check_lists()?;
        let board = self.board.lock().unwrap();
        Ok(board.columns.get(&project_id).cloned().unwrap_or_default())
    }

    async fn list_cards(&self, column_id: i64) -> Result<Vec<Card>> {
        self.check_lists()?;
        let board = self.board.lock().unwrap();
        Ok(board.cards.get(&column_id).cloned().unwrap_or_default())
    }

    async fn list_teams(&self, _org: &str) -> Result<Vec<Team>> {
        self.check_lists()?;
        let board = self.board.lock().unwrap();
        // Listing does not include members, like the real API.
        Ok(board
            .teams
            .iter()
            .map(|t| Team {
                id: t.id,
                name: t.name.clone(),
                members: Vec::new(),
            })
            .collect())
    }

    async fn list_team_members(&self, team_id: i64) -> Result<Vec<User>> {
        self.check_lists()?;
        let board = self.board.lock().unwrap();
        Ok(board
            .teams
            .iter()
            .filter(|t| t.id == team_id)
            .flat_map(|t| t.members.iter())
            .map(|login| User {
                login: login.clone(),
            })
            .collect())
    }

    async fn move_card(&self, card_id: i64, column_id: i64, _position: &str) -> Result<()> {
        if self.fail_moves.load(Ordering::SeqCst) {
            bail!("card move rejected");
        }
        self.record(ProviderCall::MoveCard { card_id, column_id });
        Ok(())
    }

    async fn add_label(&self, issue: &IssueRef, label: &str) -> Result<()> {
        self.record(ProviderCall::AddLabel {
            issue: issue.to_string(),
            label: label.to_string(),
        });
        Ok(())
    }

    async fn remove_label(&self, issue: &IssueRef, label: &str) -> Result<()> {
        self.record(ProviderCall::RemoveLabel {
            issue: issue.to_string(),
            label: label.to_string(),
        });
        Ok(())
    }

    async fn create_comment(&self, issue: &IssueRef, body: &str) -> Result<()> {
        self.record(ProviderCall::Comment {
            issue: issue.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn get_issue(&self, issue: &IssueRef) -> Result<Issue> {
        let board = self.board.lock().unwrap();
        match board.issues.values().find(|i| {
            i.number == issue.number && i.url.contains(&format!("/{}/{}/", issue.owner, issue.repo))
        }) {
            Some(found) => Ok(found.clone()),
            None => bail!("issue {} not found", issue),
        }
    }
}
