use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::cache::{BoardCache, CardChange};
use super::dispatch::{Job, JobQueue};
use super::models::Card;
use super::webhook::{
    CardAction, EVENT_HEADER, InboundEvent, IssueAction, LEGACY_SIGNATURE_HEADER,
    SIGNATURE_HEADER, parse_event, verify_signature,
};
use crate::errors::{SubmitError, WebhookError};

pub struct AppState {
    pub board: Arc<BoardCache>,
    pub queue: Arc<JobQueue>,
    pub org: String,
    pub webhook_secret: String,
}

pub type SharedState = Arc<AppState>;

// ── Error type ────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        warn!("rejected webhook delivery: {}", e);
        ApiError::BadRequest(e.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", post(receive_webhook))
        .route("/webhook", post(receive_webhook))
        .route("/health", get(health))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health(State(state): State<SharedState>) -> Json<Value> {
    let snapshot = state.board.snapshot().await;
    Json(json!({
        "status": "ok",
        "tracked_cards": snapshot.cards.len(),
        "processed_jobs": state.queue.processed(),
    }))
}

fn accepted(status: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::ACCEPTED, Json(json!({ "status": status })))
}

async fn receive_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(LEGACY_SIGNATURE_HEADER))
        .and_then(|v| v.to_str().ok());
    verify_signature(&state.webhook_secret, signature, &body)?;

    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingEventType)?;

    let job = match parse_event(event_type, &body)? {
        InboundEvent::Ping => return Ok((StatusCode::OK, Json(json!({ "status": "pong" })))),
        InboundEvent::Ignored(event) => {
            debug!(event = %event, "ignoring event type");
            return Ok(accepted("ignored"));
        }
        InboundEvent::Issue { action, issue } => match action {
            IssueAction::Edited => Job::IssueEdited(issue),
            IssueAction::Assigned | IssueAction::Unassigned => Job::AssigneeChanged(issue),
            IssueAction::Other => return Ok(accepted("ignored")),
        },
        InboundEvent::ProjectCard { action, card, org } => {
            if org.as_deref() != Some(state.org.as_str()) {
                debug!(org = ?org, "ignoring card event from another organization");
                return Ok(accepted("ignored"));
            }
            match apply_card_event(&state.board, action, &card).await {
                Some(job) => job,
                None => return Ok(accepted("applied")),
            }
        }
    };

    let kind = job.kind();
    state.queue.submit(job)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "queued", "job": kind }))))
}

/// Apply a card event to the cache and pick the deadline follow-up, if any.
async fn apply_card_event(board: &BoardCache, action: CardAction, card: &Card) -> Option<Job> {
    let change = match action {
        CardAction::Created => board.apply_card_created(card).await,
        CardAction::Converted => board.apply_card_converted(card).await,
        CardAction::Moved => board.apply_card_moved(card).await,
        CardAction::Deleted => board.apply_card_deleted(card).await,
        CardAction::Other => CardChange::Ignored,
    };
    if change != CardChange::Ignored {
        info!(card = card.id, ?action, ?change, "board cache updated");
    }

    card.issue_url()?;
    match change {
        CardChange::Inserted | CardChange::Updated => Some(Job::CardTracked(card.clone())),
        CardChange::Evicted => Some(Job::CardUntracked(card.clone())),
        CardChange::Ignored => None,
    }
}
