//! Integration tests for kanbanmgr
//!
//! CLI behaviour through the built binary, and the full webhook flow through
//! the router with an in-memory board provider.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a kanbanmgr Command running in an empty directory
fn kanbanmgr(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("kanbanmgr");
    cmd.current_dir(dir.path());
    cmd
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("init-db"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_parse_day_directive() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .args(["parse", "#1 <09> title content", "--now", "2018-12-03T14:36:04+08:00"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Directive: <09>"))
            .stdout(predicate::str::contains("Deadline:  2018-12-09"))
            .stdout(predicate::str::contains("Overdue:   no"));
    }

    #[test]
    fn test_parse_next_week_directive() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .args(["parse", "发布 <下周一>", "--now", "2018-12-03T14:36:04+08:00"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Deadline:  2018-12-10"));
    }

    #[test]
    fn test_parse_overdue() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .args(["parse", "<2018-12-01>", "--now", "2018-12-03T14:36:04+08:00"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Overdue:   yes"));
    }

    #[test]
    fn test_parse_without_directive_fails() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .args(["parse", "no deadline here"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No deadline directive found"));
    }

    #[test]
    fn test_parse_invalid_month_fails() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .args(["parse", "<13-01>"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid month 13"));
    }

    #[test]
    fn test_parse_bad_now() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .args(["parse", "<09>", "--now", "yesterday"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("RFC 3339"));
    }
}

// =============================================================================
// Configuration and Database Commands
// =============================================================================

mod config_commands {
    use super::*;
    use std::fs;

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .env_remove("ORG_NAME")
            .env_remove("SERVE_PORT")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("org = \"linuxdeepin\""))
            .stdout(predicate::str::contains("port = 7788"));
    }

    #[test]
    fn test_config_show_masks_secrets() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .env("WEBHOOK_SECRET", "hunter2")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("hunter2").not());
    }

    #[test]
    fn test_config_file_and_env_layering() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("kanbanmgr.toml"),
            "[board]\nproject = \"release\"\n\n[server]\nport = 9000\n",
        )
        .unwrap();
        kanbanmgr(&dir)
            .env("SERVE_PORT", "9100")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("project = \"release\""))
            .stdout(predicate::str::contains("port = 9100"));
    }

    #[test]
    fn test_config_validate_rejects_same_columns() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .env("TESTING_COL_NAME", "Doing")
            .env("DEVELOPING_COL_NAME", "Doing")
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("columns are both"));
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .args(["--config", "absent.toml", "config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("absent.toml"));
    }

    #[test]
    fn test_init_db_creates_file() {
        let dir = TempDir::new().unwrap();
        kanbanmgr(&dir)
            .args(["init-db", "--db-path", "data/deadlines.db"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Deadline database initialized"));
        assert!(dir.path().join("data/deadlines.db").exists());
    }
}

// =============================================================================
// Webhook Flow
// =============================================================================

mod webhook_flow {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use kanbanmgr::board::api::AppState;
    use kanbanmgr::board::db::{DbHandle, DeadlineDb};
    use kanbanmgr::board::deadline::DELAYED_LABEL;
    use kanbanmgr::board::dispatch::JobQueue;
    use kanbanmgr::board::fake::{FakeProvider, ProviderCall};
    use kanbanmgr::board::models::{Issue, User};
    use kanbanmgr::board::server::{Services, build_router};
    use kanbanmgr::config::Config;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const TESTING: i64 = 20;
    const DEVELOPING: i64 = 30;
    const DONE: i64 = 40;

    fn url(n: u64) -> String {
        format!("https://api.github.com/repos/linuxdeepin/dde/issues/{}", n)
    }

    fn issue(n: u64, title: &str) -> Issue {
        Issue {
            id: 5000 + n as i64,
            number: n,
            title: title.to_string(),
            url: url(n),
            state: "open".to_string(),
            assignees: vec![User {
                login: "tester".to_string(),
            }],
            labels: Vec::new(),
            repository_url: "https://api.github.com/repos/linuxdeepin/dde".to_string(),
            repository: None,
        }
    }

    struct Flow {
        provider: Arc<FakeProvider>,
        db: DbHandle,
        services: Services,
        queue: Arc<JobQueue>,
        app: axum::Router,
    }

    async fn flow() -> Flow {
        let mut config = Config::default();
        config.board.project = "release".to_string();

        let provider = Arc::new(
            FakeProvider::new()
                .with_project(
                    2,
                    "release",
                    &[(TESTING, "测试"), (DEVELOPING, "开发"), (DONE, "完成")],
                )
                .with_card(DEVELOPING, 100, &url(1))
                .with_card(DONE, 101, &url(2))
                .with_team(1, "QA Team", &["tester"])
                .with_team(2, "Developer Team", &["coder"])
                .with_issue(issue(2, "late work <2000-01-01>")),
        );
        let db = DbHandle::new(DeadlineDb::new_in_memory().unwrap());
        let services = Services::new(&config, provider.clone(), db.clone());
        services.rebuild().await.unwrap();

        let queue = Arc::new(JobQueue::start(services.workflows(), 2, 32));
        let app = build_router(Arc::new(AppState {
            board: services.board.clone(),
            queue: queue.clone(),
            org: "linuxdeepin".to_string(),
            webhook_secret: String::new(),
        }));
        Flow {
            provider,
            db,
            services,
            queue,
            app,
        }
    }

    async fn deliver(app: &axum::Router, event: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header("X-GitHub-Event", event)
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn issues_event(action: &str, issue: &Issue) -> Value {
        json!({
            "action": action,
            "issue": issue,
            "repository": {"name": "dde", "owner": {"login": "linuxdeepin"}}
        })
    }

    fn card_event(action: &str, card_id: i64, column_id: i64, n: u64) -> Value {
        json!({
            "action": action,
            "project_card": {"id": card_id, "column_id": column_id, "content_url": url(n)},
            "organization": {"login": "linuxdeepin"}
        })
    }

    async fn stored_directive(db: &DbHandle, id: i64) -> Option<String> {
        db.call(move |db| db.get_deadline(id))
            .await
            .unwrap()
            .map(|row| row.directive)
    }

    #[tokio::test]
    async fn test_edit_records_deadline_and_comments() {
        let f = flow().await;
        let (status, body) =
            deliver(&f.app, "issues", issues_event("edited", &issue(1, "ship <2999-01-01>"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["job"], "issue_edited");
        f.queue.shutdown().await;

        assert_eq!(stored_directive(&f.db, 5001).await.as_deref(), Some("<2999-01-01>"));
        assert_eq!(
            f.provider.calls(),
            vec![ProviderCall::Comment {
                issue: "linuxdeepin/dde#1".to_string(),
                body: "设置截止日期到 2999-01-01".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_assignment_to_qa_promotes_card() {
        let f = flow().await;
        deliver(&f.app, "issues", issues_event("assigned", &issue(1, "ship"))).await;
        f.queue.shutdown().await;

        assert_eq!(
            f.provider.calls(),
            vec![ProviderCall::MoveCard {
                card_id: 100,
                column_id: TESTING
            }]
        );
        let column = f.services.board.find_column_of_issue(&url(1)).await.unwrap();
        assert_eq!(column.name, "测试");
    }

    #[tokio::test]
    async fn test_card_moved_in_evaluates_fetched_issue() {
        let f = flow().await;
        let (status, _) = deliver(&f.app, "project_card", card_event("moved", 101, TESTING, 2)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        f.queue.shutdown().await;

        assert_eq!(stored_directive(&f.db, 5002).await.as_deref(), Some("<2000-01-01>"));
        let calls = f.provider.calls();
        assert!(calls.contains(&ProviderCall::AddLabel {
            issue: "linuxdeepin/dde#2".to_string(),
            label: DELAYED_LABEL.to_string(),
        }));
    }

    #[tokio::test]
    async fn test_card_moved_out_drops_deadline() {
        let f = flow().await;
        deliver(&f.app, "issues", issues_event("edited", &issue(1, "ship <2999-01-01>"))).await;
        // Let the edit land before the card leaves.
        while f.queue.processed() < 1 {
            tokio::task::yield_now().await;
        }
        deliver(&f.app, "project_card", card_event("moved", 100, DONE, 1)).await;
        f.queue.shutdown().await;

        assert_eq!(stored_directive(&f.db, 5001).await, None);
        assert!(f.services.board.find_column_of_issue(&url(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_labels_overdue_issue() {
        let f = flow().await;
        deliver(&f.app, "issues", issues_event("edited", &issue(1, "late <2000-01-01>"))).await;
        f.queue.shutdown().await;
        f.provider.clear_calls();

        let report = f.services.deadlines.sweep_all(chrono::Utc::now()).await;
        assert_eq!(report.overdue, 1);
        assert_eq!(
            f.provider.calls(),
            vec![ProviderCall::AddLabel {
                issue: "linuxdeepin/dde#1".to_string(),
                label: DELAYED_LABEL.to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_removing_directive_clears_everything() {
        let f = flow().await;
        deliver(&f.app, "issues", issues_event("edited", &issue(1, "late <2000-01-01>"))).await;
        while f.queue.processed() < 1 {
            tokio::task::yield_now().await;
        }

        let mut cleared = issue(1, "late");
        cleared.labels.push(kanbanmgr::board::models::Label {
            name: DELAYED_LABEL.to_string(),
        });
        f.provider.clear_calls();
        deliver(&f.app, "issues", issues_event("edited", &cleared)).await;
        f.queue.shutdown().await;

        assert_eq!(stored_directive(&f.db, 5001).await, None);
        assert_eq!(
            f.provider.calls(),
            vec![ProviderCall::RemoveLabel {
                issue: "linuxdeepin/dde#1".to_string(),
                label: DELAYED_LABEL.to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_health_reports_tracked_cards() {
        let f = flow().await;
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = f.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["tracked_cards"], 1);
    }
}
