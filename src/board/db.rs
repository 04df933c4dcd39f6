use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::models::IssueDeadline;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Async-safe handle to the deadline database.
///
/// Wraps `DeadlineDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<DeadlineDb>>,
}

impl DbHandle {
    pub fn new(db: DeadlineDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DeadlineDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

/// Persistent store of issue deadlines, one row per issue with an active
/// directive.
pub struct DeadlineDb {
    conn: Connection,
}

impl DeadlineDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS issue_deadline (
                    id INTEGER PRIMARY KEY NOT NULL,
                    date TEXT NOT NULL,
                    url TEXT NOT NULL,
                    directive TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_issue_deadline_url ON issue_deadline(url);
                ",
            )
            .context("Failed to create issue_deadline table")?;
        Ok(())
    }

    // ── Deadline CRUD ─────────────────────────────────────────────────

    pub fn get_deadline(&self, id: i64) -> Result<Option<IssueDeadline>> {
        self.conn
            .query_row(
                "SELECT id, date, url, directive FROM issue_deadline WHERE id = ?1",
                params![id],
                read_row,
            )
            .optional()
            .context("Failed to query issue deadline")?
            .transpose()
    }

    /// Look a deadline up by issue URL. URLs are not unique by constraint;
    /// the lowest id wins if several rows share one.
    pub fn get_deadline_by_url(&self, url: &str) -> Result<Option<IssueDeadline>> {
        self.conn
            .query_row(
                "SELECT id, date, url, directive FROM issue_deadline WHERE url = ?1 ORDER BY id LIMIT 1",
                params![url],
                read_row,
            )
            .optional()
            .context("Failed to query issue deadline by url")?
            .transpose()
    }

    pub fn upsert_deadline(&self, deadline: &IssueDeadline) -> Result<()> {
        if deadline.directive.is_empty() {
            anyhow::bail!("Refusing to store deadline for issue {} without a directive", deadline.id);
        }
        self.conn
            .execute(
                "INSERT INTO issue_deadline (id, date, url, directive) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    date = excluded.date,
                    url = excluded.url,
                    directive = excluded.directive",
                params![
                    deadline.id,
                    deadline.date.format(DATE_FORMAT).to_string(),
                    deadline.url,
                    deadline.directive
                ],
            )
            .context("Failed to upsert issue deadline")?;
        Ok(())
    }

    /// Delete the deadline for `id`. Returns whether a row existed.
    pub fn delete_deadline(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM issue_deadline WHERE id = ?1", params![id])
            .context("Failed to delete issue deadline")?;
        Ok(affected > 0)
    }

    pub fn count_deadlines(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM issue_deadline", [], |row| row.get(0))
            .context("Failed to count issue deadlines")
    }
}

/// Map a row, deferring the date parse so a corrupt value surfaces as an
/// `anyhow` error rather than a rusqlite conversion failure.
fn read_row(row: &Row<'_>) -> rusqlite::Result<Result<IssueDeadline>> {
    let id: i64 = row.get(0)?;
    let date: String = row.get(1)?;
    let url: String = row.get(2)?;
    let directive: String = row.get(3)?;
    Ok(NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .with_context(|| format!("Invalid date {:?} stored for issue {}", date, id))
        .map(|date| IssueDeadline {
            id,
            date,
            directive,
            url,
        }))
}
