//! Board steward: keeps a GitHub project board's tracked columns in memory
//! and applies deadline and column-transition rules to the issues on them.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐ webhook  ┌──────────────────────────────────────────────────┐
//! │  GitHub  │ ───────> │  server.rs  (bootstrap, Services, router)        │
//! │          │          │    └─ api.rs  (handlers, AppState, ApiError)     │
//! │          │          │         │  webhook.rs: signature + payloads      │
//! │          │          │         │  card events applied to cache inline   │
//! │          │          │         v                                        │
//! │          │          │  dispatch.rs  (JobQueue, bounded worker pool)    │
//! │          │          │         │                                        │
//! │          │          │         ├─> deadline.rs   (DeadlineEngine)       │
//! │          │          │         └─> transition.rs (TransitionEngine)     │
//! │          │          │                  │                               │
//! │          │          │                  v                               │
//! │          │ <─────── │  cache.rs (BoardCache)   roster.rs (TeamRoster)  │
//! └──────────┘ REST v3  └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                             |
//! |-------------|------------------------------------------------------------|
//! | `models`    | Provider types: `Card`, `Column`, `Issue`, `Team`          |
//! | `directive` | Deadline directive grammars (`<09>`, `<z1>`, `<下周一>`)   |
//! | `db`        | SQLite deadline store via `DbHandle` (thin `Arc<Mutex<_>>`) |
//! | `github`    | `BoardProvider` trait and the reqwest `GitHubClient`       |
//! | `scheduler` | Daily sweep and periodic roster refresh timers            |
//! | `fake`      | In-memory `BoardProvider` (tests, `test-support` feature)  |
//!
//! ## Typical Flow (issue title edited)
//!
//! 1. `POST /` with `X-GitHub-Event: issues`, action `edited`.
//! 2. The handler verifies the signature and queues `Job::IssueEdited`.
//! 3. A worker calls `DeadlineEngine::on_issue_edited`, which checks the
//!    issue's card is on a tracked column, parses the title and records the
//!    deadline, commenting when it changed.
//! 4. The `delayed` label is added or removed to match the overdue state.

pub mod api;
pub mod cache;
pub mod db;
pub mod deadline;
pub mod directive;
pub mod dispatch;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod github;
pub mod models;
pub mod roster;
pub mod scheduler;
pub mod server;
pub mod transition;
pub mod webhook;
