use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::github::{IssueRef, parse_issue_url, parse_repo_url};
use crate::errors::BoardError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
}

/// A project column. `position` is the column's index in the project and is
/// assigned when the board is rebuilt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub position: usize,
}

/// A project card. Notes carry no `content_url`; issue cards point at the
/// issue's API URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: i64,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default)]
    pub column_id: Option<i64>,
}

impl Card {
    /// The issue URL this card refers to, if it is an issue card.
    pub fn issue_url(&self) -> Option<&str> {
        self.content_url.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    pub name: String,
    pub owner: User,
}

/// An organization team and the logins of its members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// The subset of a GitHub issue consumed by the engines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: i64,
    pub number: u64,
    pub title: String,
    /// API URL, `https://api.github.com/repos/{owner}/{repo}/issues/{n}`.
    pub url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub assignees: Vec<User>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub repository_url: String,
    /// Only present when attached from a webhook payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
}

impl Issue {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    /// Resolve owner, repository and number, preferring the attached
    /// repository over the URLs.
    pub fn issue_ref(&self) -> Result<IssueRef, BoardError> {
        if let Some(repo) = &self.repository {
            return Ok(IssueRef {
                owner: repo.owner.login.clone(),
                repo: repo.name.clone(),
                number: self.number,
            });
        }
        if let Some((owner, repo)) = parse_repo_url(&self.repository_url) {
            return Ok(IssueRef {
                owner,
                repo,
                number: self.number,
            });
        }
        parse_issue_url(&self.url)
    }
}

/// A persisted deadline for one issue. `directive` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueDeadline {
    pub id: i64,
    pub date: NaiveDate,
    pub directive: String,
    pub url: String,
}
