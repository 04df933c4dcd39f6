use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;

use super::models::{Card, Column, Issue, Project, Team, User};
use crate::errors::BoardError;

pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Classic projects still need the inertia preview media type.
const PROJECTS_ACCEPT: &str = "application/vnd.github.inertia-preview+json";
const USER_AGENT: &str = "kanbanmgr";
const PER_PAGE: usize = 100;

static ISSUE_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/repos/([^/]+)/([^/]+)/issues/(\d+)$").unwrap());

static REPO_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/repos/([^/]+)/([^/]+)$").unwrap());

/// Owner, repository and number addressing one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl std::fmt::Display for IssueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Parse an issue API URL (`.../repos/{owner}/{repo}/issues/{n}`).
pub fn parse_issue_url(url: &str) -> Result<IssueRef, BoardError> {
    let caps = ISSUE_URL_REGEX
        .captures(url)
        .ok_or_else(|| BoardError::InvalidIssueUrl(url.to_string()))?;
    let number = caps[3]
        .parse()
        .map_err(|_| BoardError::InvalidIssueUrl(url.to_string()))?;
    Ok(IssueRef {
        owner: caps[1].to_string(),
        repo: caps[2].to_string(),
        number,
    })
}

/// Parse a repository API URL (`.../repos/{owner}/{repo}`).
pub fn parse_repo_url(url: &str) -> Option<(String, String)> {
    let caps = REPO_URL_REGEX.captures(url)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// The board and identity provider the caches mirror.
///
/// List operations return every page. Mutating operations act on the
/// provider only; callers own any local bookkeeping.
#[async_trait]
pub trait BoardProvider: Send + Sync {
    async fn list_projects(&self, org: &str) -> Result<Vec<Project>>;
    async fn list_columns(&self, project_id: i64) -> Result<Vec<Column>>;
    async fn list_cards(&self, column_id: i64) -> Result<Vec<Card>>;
    async fn list_teams(&self, org: &str) -> Result<Vec<Team>>;
    async fn list_team_members(&self, team_id: i64) -> Result<Vec<User>>;

    async fn move_card(&self, card_id: i64, column_id: i64, position: &str) -> Result<()>;
    async fn add_label(&self, issue: &IssueRef, label: &str) -> Result<()>;
    async fn remove_label(&self, issue: &IssueRef, label: &str) -> Result<()>;
    async fn create_comment(&self, issue: &IssueRef, body: &str) -> Result<()>;
    async fn get_issue(&self, issue: &IssueRef) -> Result<Issue>;
}

/// `BoardProvider` backed by the GitHub REST API.
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build GitHub HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .with_context(|| format!("Invalid GitHub API base {:?}", self.api_base))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub API base cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach the media type, and the token unless running unauthenticated.
    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header("Accept", PROJECTS_ACCEPT);
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        }
    }

    /// GET every page of a list endpoint. Stops at the first short page.
    async fn get_all<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Vec<T>> {
        let url = self.url(segments)?;
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let items: Vec<T> = self
                .authorized(self.http.get(url.clone()))
                .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())])
                .send()
                .await
                .with_context(|| format!("Failed to send request to {}", url))?
                .error_for_status()
                .with_context(|| format!("GitHub returned error status for {}", url))?
                .json()
                .await
                .with_context(|| format!("Failed to parse response from {}", url))?;

            let count = items.len();
            all.extend(items);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        self.authorized(req)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to GitHub", what))?
            .error_for_status()
            .with_context(|| format!("GitHub {} returned error status", what))
    }
}

#[async_trait]
impl BoardProvider for GitHubClient {
    async fn list_projects(&self, org: &str) -> Result<Vec<Project>> {
        self.get_all(&["orgs", org, "projects"]).await
    }

    async fn list_columns(&self, project_id: i64) -> Result<Vec<Column>> {
        let mut columns: Vec<Column> = self
            .get_all(&["projects", &project_id.to_string(), "columns"])
            .await?;
        for (position, column) in columns.iter_mut().enumerate() {
            column.position = position;
        }
        Ok(columns)
    }

    async fn list_cards(&self, column_id: i64) -> Result<Vec<Card>> {
        self.get_all(&["projects", "columns", &column_id.to_string(), "cards"])
            .await
    }

    async fn list_teams(&self, org: &str) -> Result<Vec<Team>> {
        self.get_all(&["orgs", org, "teams"]).await
    }

    async fn list_team_members(&self, team_id: i64) -> Result<Vec<User>> {
        self.get_all(&["teams", &team_id.to_string(), "members"])
            .await
    }

    async fn move_card(&self, card_id: i64, column_id: i64, position: &str) -> Result<()> {
        let url = self.url(&["projects", "columns", "cards", &card_id.to_string(), "moves"])?;
        let body = serde_json::json!({ "position": position, "column_id": column_id });
        self.send(self.http.post(url).json(&body), "card move")
            .await?;
        Ok(())
    }

    async fn add_label(&self, issue: &IssueRef, label: &str) -> Result<()> {
        let number = issue.number.to_string();
        let url = self.url(&["repos", &issue.owner, &issue.repo, "issues", &number, "labels"])?;
        let body = serde_json::json!({ "labels": [label] });
        self.send(self.http.post(url).json(&body), "add label")
            .await?;
        Ok(())
    }

    async fn remove_label(&self, issue: &IssueRef, label: &str) -> Result<()> {
        let number = issue.number.to_string();
        let url = self.url(&[
            "repos",
            &issue.owner,
            &issue.repo,
            "issues",
            &number,
            "labels",
            label,
        ])?;
        self.send(self.http.delete(url), "remove label").await?;
        Ok(())
    }

    async fn create_comment(&self, issue: &IssueRef, body: &str) -> Result<()> {
        let number = issue.number.to_string();
        let url = self.url(&["repos", &issue.owner, &issue.repo, "issues", &number, "comments"])?;
        let body = serde_json::json!({ "body": body });
        self.send(self.http.post(url).json(&body), "create comment")
            .await?;
        Ok(())
    }

    async fn get_issue(&self, issue: &IssueRef) -> Result<Issue> {
        let number = issue.number.to_string();
        let url = self.url(&["repos", &issue.owner, &issue.repo, "issues", &number])?;
        self.send(self.http.get(url), "get issue")
            .await?
            .json()
            .await
            .context("Failed to parse issue response from GitHub")
    }
}
