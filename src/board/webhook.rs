//! Inbound GitHub webhook deliveries: signature check and payload decoding.
//!
//! Only the fields the engines consume are decoded; everything else in the
//! payload is ignored.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::models::{Card, Issue, Repository, User};
use crate::errors::WebhookError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const LEGACY_SIGNATURE_HEADER: &str = "x-hub-signature";
pub const EVENT_HEADER: &str = "x-github-event";

/// Check a `<scheme>=<hex digest>` signature header against `body`.
///
/// An empty `secret` disables verification.
pub fn verify_signature(
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Ok(());
    }
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    let (scheme, digest) = signature
        .split_once('=')
        .ok_or(WebhookError::InvalidSignature)?;
    if scheme != "sha256" {
        return Err(WebhookError::UnsupportedSignature(scheme.to_string()));
    }
    let expected = hex::decode(digest).map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueAction {
    Edited,
    Assigned,
    Unassigned,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardAction {
    Created,
    Deleted,
    Converted,
    Moved,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Issue {
        action: IssueAction,
        issue: Issue,
    },
    ProjectCard {
        action: CardAction,
        card: Card,
        org: Option<String>,
    },
    Ping,
    /// An event type the service does not handle.
    Ignored(String),
}

#[derive(Deserialize)]
struct IssuesPayload {
    action: IssueAction,
    issue: Issue,
    #[serde(default)]
    repository: Option<Repository>,
}

#[derive(Deserialize)]
struct ProjectCardPayload {
    action: CardAction,
    project_card: Card,
    #[serde(default)]
    organization: Option<User>,
}

/// Decode a delivery by its `X-GitHub-Event` type.
pub fn parse_event(event_type: &str, body: &[u8]) -> Result<InboundEvent, WebhookError> {
    let malformed = |source| WebhookError::Payload {
        event: event_type.to_string(),
        source,
    };

    match event_type {
        "issues" => {
            let payload: IssuesPayload = serde_json::from_slice(body).map_err(malformed)?;
            let mut issue = payload.issue;
            if issue.repository.is_none() {
                issue.repository = payload.repository;
            }
            Ok(InboundEvent::Issue {
                action: payload.action,
                issue,
            })
        }
        "project_card" => {
            let payload: ProjectCardPayload = serde_json::from_slice(body).map_err(malformed)?;
            Ok(InboundEvent::ProjectCard {
                action: payload.action,
                card: payload.project_card,
                org: payload.organization.map(|o| o.login),
            })
        }
        "ping" => Ok(InboundEvent::Ping),
        other => Ok(InboundEvent::Ignored(other.to_string())),
    }
}
