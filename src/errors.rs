//! Typed error hierarchy for kanbanmgr.
//!
//! - `DirectiveError`: deadline directives that cannot be read from a title
//! - `BoardError`: board cache, provider and deadline store failures
//! - `WebhookError`: inbound deliveries rejected before any processing
//! - `SubmitError`: jobs the worker pool would not accept

use thiserror::Error;

/// Errors from parsing a deadline directive out of an issue title.
///
/// Callers treat every variant the same way: deadline tracking for the
/// issue is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("No deadline directive found")]
    NoDirectiveFound,

    #[error("Invalid month {month} in directive {directive}")]
    InvalidMonth { directive: String, month: u32 },

    #[error("Invalid directive {directive}: {message}")]
    InvalidDirective { directive: String, message: String },
}

/// Errors from the board cache, team roster and the engines built on them.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Not in the tracked columns")]
    NotInTrackedColumns,

    #[error("No column named '{column}' in project '{project}'")]
    ColumnNotFound { column: String, project: String },

    #[error("No project named '{project}' in organization '{org}'")]
    ProjectNotFound { project: String, org: String },

    #[error("Invalid issue url {0:?}")]
    InvalidIssueUrl(String),

    #[error("GitHub API error: {0:#}")]
    Provider(#[source] anyhow::Error),

    #[error("Database error: {0:#}")]
    Database(#[source] anyhow::Error),
}

/// Errors that reject a webhook delivery with a 400-class response.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing X-Hub-Signature-256 header")]
    MissingSignature,

    #[error("Unsupported signature scheme '{0}'")]
    UnsupportedSignature(String),

    #[error("Payload signature mismatch")]
    InvalidSignature,

    #[error("Missing X-GitHub-Event header")]
    MissingEventType,

    #[error("Malformed {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why the job queue refused a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Job queue is full")]
    QueueFull,

    #[error("Job queue is shutting down")]
    ShuttingDown,
}
