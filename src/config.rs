//! Service configuration.
//!
//! Values are layered: built-in defaults, then `kanbanmgr.toml` (or the file
//! given with `--config`), then environment variables, then CLI flags.
//!
//! ```toml
//! [github]
//! org = "linuxdeepin"
//! token = "ghp_..."
//! webhook_secret = "..."
//!
//! [board]
//! project = "deepin 系统发布看板"
//! testing_column = "测试"
//! developing_column = "开发"
//! qa_team = "QA Team"
//! dev_team = "Developer Team"
//!
//! [server]
//! port = 7788
//! db_path = "kanbanmgr.db"
//! workers = 4
//! queue_capacity = 256
//!
//! [schedule]
//! sweep_at = "01:00"
//! roster_refresh_hours = 6
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::board::cache::TrackedColumns;
use crate::board::github::GITHUB_API_URL;
use crate::board::transition::Teams;

pub const DEFAULT_CONFIG_FILE: &str = "kanbanmgr.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSection {
    #[serde(default = "default_org")]
    pub org: String,
    /// Pre-issued API token. Empty means unauthenticated.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// HMAC secret for webhook deliveries. Empty disables verification.
    #[serde(default)]
    pub webhook_secret: String,
}

fn default_org() -> String {
    "linuxdeepin".to_string()
}

fn default_api_url() -> String {
    GITHUB_API_URL.to_string()
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            org: default_org(),
            token: String::new(),
            api_url: default_api_url(),
            webhook_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_testing_column")]
    pub testing_column: String,
    #[serde(default = "default_developing_column")]
    pub developing_column: String,
    #[serde(default = "default_qa_team")]
    pub qa_team: String,
    #[serde(default = "default_dev_team")]
    pub dev_team: String,
}

fn default_project() -> String {
    "deepin 系统发布看板".to_string()
}

fn default_testing_column() -> String {
    "测试".to_string()
}

fn default_developing_column() -> String {
    "开发".to_string()
}

fn default_qa_team() -> String {
    "QA Team".to_string()
}

fn default_dev_team() -> String {
    "Developer Team".to_string()
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            project: default_project(),
            testing_column: default_testing_column(),
            developing_column: default_developing_column(),
            qa_team: default_qa_team(),
            dev_team: default_dev_team(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Concurrent job workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Jobs that may wait before deliveries are rejected with 503
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_port() -> u16 {
    7788
}

fn default_db_path() -> PathBuf {
    PathBuf::from("kanbanmgr.db")
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            db_path: default_db_path(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSection {
    /// Daily sweep time, `HH:MM` in Asia/Shanghai
    #[serde(default = "default_sweep_at")]
    pub sweep_at: String,
    /// Periodic team roster rebuild; off when unset
    #[serde(default)]
    pub roster_refresh_hours: Option<u64>,
}

fn default_sweep_at() -> String {
    "01:00".to_string()
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            sweep_at: default_sweep_at(),
            roster_refresh_hours: None,
        }
    }
}

impl Config {
    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse kanbanmgr config")
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Load `path` if given (it must exist), else `kanbanmgr.toml` when
    /// present, else defaults. Environment variables are applied on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from environment variables, looked up via `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strings: [(&str, &mut String); 9] = [
            ("ORG_NAME", &mut self.github.org),
            ("GITHUB_TOKEN", &mut self.github.token),
            ("WEBHOOK_SECRET", &mut self.github.webhook_secret),
            ("PROJECT_NAME", &mut self.board.project),
            ("TESTING_COL_NAME", &mut self.board.testing_column),
            ("DEVELOPING_COL_NAME", &mut self.board.developing_column),
            ("QA_TEAM_NAME", &mut self.board.qa_team),
            ("DEV_TEAM_NAME", &mut self.board.dev_team),
            ("SWEEP_AT", &mut self.schedule.sweep_at),
        ];
        for (key, field) in strings {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        }

        if let Some(value) = lookup("DB_PATH") {
            self.server.db_path = PathBuf::from(value);
        }
        if let Some(port) = parse_env(&lookup, "SERVE_PORT")? {
            self.server.port = port;
        }
        if let Some(workers) = parse_env(&lookup, "WORKERS")? {
            self.server.workers = workers;
        }
        if let Some(capacity) = parse_env(&lookup, "QUEUE_CAPACITY")? {
            self.server.queue_capacity = capacity;
        }
        if let Some(hours) = parse_env(&lookup, "ROSTER_REFRESH_HOURS")? {
            self.schedule.roster_refresh_hours = Some(hours).filter(|h| *h > 0);
        }
        Ok(())
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.github.org.trim().is_empty() {
            problems.push("organization name is empty".to_string());
        }
        if self.board.project.trim().is_empty() {
            problems.push("project name is empty".to_string());
        }
        if self.board.testing_column == self.board.developing_column {
            problems.push(format!(
                "testing and developing columns are both '{}'",
                self.board.testing_column
            ));
        }
        if self.server.workers == 0 {
            problems.push("workers must be at least 1".to_string());
        }
        if self.server.queue_capacity == 0 {
            problems.push("queue_capacity must be at least 1".to_string());
        }
        if let Err(e) = self.sweep_time() {
            problems.push(format!("{:#}", e));
        }

        if !problems.is_empty() {
            anyhow::bail!("Invalid configuration: {}", problems.join("; "));
        }
        Ok(())
    }

    pub fn sweep_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.schedule.sweep_at, "%H:%M")
            .with_context(|| format!("sweep_at '{}' is not HH:MM", self.schedule.sweep_at))
    }

    pub fn tracked_columns(&self) -> TrackedColumns {
        TrackedColumns {
            testing: self.board.testing_column.clone(),
            developing: self.board.developing_column.clone(),
        }
    }

    pub fn teams(&self) -> Teams {
        Teams {
            qa: self.board.qa_team.clone(),
            dev: self.board.dev_team.clone(),
        }
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} value '{}'", key, value))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.github.org, "linuxdeepin");
        assert_eq!(config.board.project, "deepin 系统发布看板");
        assert_eq!(config.board.testing_column, "测试");
        assert_eq!(config.board.developing_column, "开发");
        assert_eq!(config.board.qa_team, "QA Team");
        assert_eq!(config.board.dev_team, "Developer Team");
        assert_eq!(config.server.port, 7788);
        assert_eq!(config.schedule.roster_refresh_hours, None);
        assert_eq!(
            config.sweep_time().unwrap(),
            NaiveTime::from_hms_opt(1, 0, 0).unwrap()
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [board]
            project = "release"

            [server]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.board.project, "release");
        assert_eq!(config.board.testing_column, "测试");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.github.api_url, GITHUB_API_URL);
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(Config::parse("[server\nport = 1").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[github]\norg = \"acme\"\n\n[schedule]\nroster_refresh_hours = 6").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.github.org, "acme");
        assert_eq!(config.schedule.roster_refresh_hours, Some(6));
    }

    #[test]
    fn test_resolve_missing_explicit_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::resolve(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::parse("[github]\norg = \"acme\"").unwrap();
        config
            .apply_env(env(&[
                ("ORG_NAME", "deepin"),
                ("WEBHOOK_SECRET", "s3cret"),
                ("TESTING_COL_NAME", "QA"),
                ("SERVE_PORT", "8080"),
                ("DB_PATH", "/var/lib/kanbanmgr.db"),
                ("ROSTER_REFRESH_HOURS", "12"),
            ]))
            .unwrap();

        assert_eq!(config.github.org, "deepin");
        assert_eq!(config.github.webhook_secret, "s3cret");
        assert_eq!(config.board.testing_column, "QA");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.db_path, PathBuf::from("/var/lib/kanbanmgr.db"));
        assert_eq!(config.schedule.roster_refresh_hours, Some(12));
    }

    #[test]
    fn test_env_zero_refresh_disables() {
        let mut config = Config::default();
        config.schedule.roster_refresh_hours = Some(3);
        config
            .apply_env(env(&[("ROSTER_REFRESH_HOURS", "0")]))
            .unwrap();
        assert_eq!(config.schedule.roster_refresh_hours, None);
    }

    #[test]
    fn test_env_bad_number_is_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("SERVE_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("SERVE_PORT"));
    }

    #[test]
    fn test_validate_rejects_same_columns() {
        let mut config = Config::default();
        config.board.developing_column = config.board.testing_column.clone();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("columns are both"));
    }

    #[test]
    fn test_validate_rejects_empty_names_and_bad_time() {
        let mut config = Config::default();
        config.github.org = " ".to_string();
        config.board.project.clear();
        config.schedule.sweep_at = "25:99".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("organization name is empty"));
        assert!(err.contains("project name is empty"));
        assert!(err.contains("sweep_at"));
    }

    #[test]
    fn test_tracked_columns_and_teams() {
        let config = Config::default();
        assert!(config.tracked_columns().contains("开发"));
        assert_eq!(config.teams().qa, "QA Team");
    }
}
