use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState, SharedState};
use super::cache::BoardCache;
use super::db::{DbHandle, DeadlineDb};
use super::deadline::DeadlineEngine;
use super::dispatch::{BoardWorkflows, JobQueue};
use super::github::{BoardProvider, GitHubClient};
use super::roster::TeamRoster;
use super::scheduler::{DailySchedule, spawn_daily_sweep, spawn_roster_refresh};
use super::transition::TransitionEngine;
use crate::config::Config;

/// The caches and engines shared by the server, the scheduler and one-off
/// commands.
pub struct Services {
    pub board: Arc<BoardCache>,
    pub roster: Arc<TeamRoster>,
    pub deadlines: Arc<DeadlineEngine>,
    pub transitions: Arc<TransitionEngine>,
}

impl Services {
    pub fn new(config: &Config, provider: Arc<dyn BoardProvider>, db: DbHandle) -> Self {
        let board = Arc::new(BoardCache::new(
            provider.clone(),
            &config.github.org,
            &config.board.project,
            config.tracked_columns(),
        ));
        let roster = Arc::new(TeamRoster::new(provider.clone(), &config.github.org));
        let deadlines = Arc::new(DeadlineEngine::new(board.clone(), db, provider));
        let transitions = Arc::new(TransitionEngine::new(
            board.clone(),
            roster.clone(),
            config.teams(),
        ));
        Self {
            board,
            roster,
            deadlines,
            transitions,
        }
    }

    /// Fill both caches from the provider.
    pub async fn rebuild(&self) -> Result<()> {
        self.board
            .rebuild_full()
            .await
            .context("Failed to build the board cache")?;
        self.roster
            .rebuild_full()
            .await
            .context("Failed to build the team roster")?;
        Ok(())
    }

    pub fn workflows(&self) -> Arc<BoardWorkflows> {
        Arc::new(BoardWorkflows {
            deadlines: self.deadlines.clone(),
            transitions: self.transitions.clone(),
        })
    }
}

/// Open (or create) the deadline database at the configured path.
pub fn open_db(config: &Config) -> Result<DbHandle> {
    let path = &config.server.db_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = DeadlineDb::new(path).context("Failed to initialize deadline database")?;
    Ok(DbHandle::new(db))
}

pub fn github_provider(config: &Config) -> Result<Arc<dyn BoardProvider>> {
    let client = GitHubClient::new(&config.github.api_url, &config.github.token)?;
    Ok(Arc::new(client))
}

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the webhook server and its background schedules.
pub async fn start_server(config: Config) -> Result<()> {
    let sweep_at = config.sweep_time()?;
    let db = open_db(&config)?;
    let services = Services::new(&config, github_provider(&config)?, db);

    services.rebuild().await?;
    services.deadlines.sweep_all(Utc::now()).await;

    if config.github.webhook_secret.is_empty() {
        warn!("No webhook secret configured; deliveries are not verified");
    }

    let queue = Arc::new(JobQueue::start(
        services.workflows(),
        config.server.workers,
        config.server.queue_capacity,
    ));
    let mut schedules = vec![spawn_daily_sweep(
        DailySchedule::new(sweep_at),
        queue.clone(),
    )];
    if let Some(hours) = config.schedule.roster_refresh_hours {
        schedules.push(spawn_roster_refresh(
            services.roster.clone(),
            Duration::from_secs(hours * 3600),
        ));
    }

    let state = Arc::new(AppState {
        board: services.board.clone(),
        queue: queue.clone(),
        org: config.github.org.clone(),
        webhook_secret: config.github.webhook_secret.clone(),
    });
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(addr = %listener.local_addr()?, "kanbanmgr listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    for schedule in schedules {
        schedule.abort();
    }
    queue.shutdown().await;
    info!(processed = queue.processed(), "server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::fake::{FakeProvider, ProviderCall};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn config() -> Config {
        let mut config = Config::default();
        config.github.org = "o".to_string();
        config.board.project = "release".to_string();
        config
    }

    fn provider() -> Arc<FakeProvider> {
        Arc::new(
            FakeProvider::new()
                .with_project(2, "release", &[(20, "测试"), (30, "开发")])
                .with_card(30, 100, "https://api.github.com/repos/o/r/issues/1")
                .with_team(1, "QA Team", &["qa"]),
        )
    }

    fn db() -> DbHandle {
        DbHandle::new(DeadlineDb::new_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_services_rebuild_fills_both_caches() {
        let services = Services::new(&config(), provider(), db());
        services.rebuild().await.unwrap();
        assert_eq!(services.board.snapshot().await.cards.len(), 1);
        assert!(services.roster.is_member("QA Team", "qa"));
    }

    #[tokio::test]
    async fn test_rebuild_fails_for_missing_project() {
        let mut config = config();
        config.board.project = "gone".to_string();
        let services = Services::new(&config, provider(), db());
        let err = services.rebuild().await.unwrap_err();
        assert!(format!("{:#}", err).contains("No project named 'gone'"));
    }

    #[tokio::test]
    async fn test_workflows_drive_transitions() {
        let provider = provider();
        let services = Services::new(&config(), provider.clone(), db());
        services.rebuild().await.unwrap();

        let queue = JobQueue::start(services.workflows(), 2, 8);
        let issue = serde_json::from_value(serde_json::json!({
            "id": 1, "number": 1, "title": "t", "state": "open",
            "url": "https://api.github.com/repos/o/r/issues/1",
            "assignees": [{"login": "qa"}]
        }))
        .unwrap();
        queue
            .submit(crate::board::dispatch::Job::AssigneeChanged(issue))
            .unwrap();
        queue.shutdown().await;

        assert_eq!(
            provider.calls(),
            vec![ProviderCall::MoveCard {
                card_id: 100,
                column_id: 20
            }]
        );
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let services = Services::new(&config(), provider(), db());
        services.rebuild().await.unwrap();
        let state = Arc::new(AppState {
            board: services.board.clone(),
            queue: Arc::new(JobQueue::start(services.workflows(), 1, 4)),
            org: "o".to_string(),
            webhook_secret: String::new(),
        });
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_open_db_creates_parent_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = config();
        config.server.db_path = dir.path().join("nested").join("kanbanmgr.db");
        open_db(&config).unwrap();
        assert!(config.server.db_path.exists());
    }
}
