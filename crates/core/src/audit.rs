//! Append-only protocol audit trail.
//!
//! One [`AuditEvent`] is written per signing request and per authenticated callback. Events
//! carry the requester's IP and user agent plus a redacted JSON summary; signature bytes,
//! digests of secrets and the webhook secret never appear in them.

use crate::{ErrorCode, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vpr_types::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    Request,
    Callback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AuditOutcome {
    Accepted,
    Rejected { error: ErrorCode },
}

/// Transport metadata of the HTTP call being audited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub requester_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,
    pub document_id: DocumentId,
    pub kind: AuditKind,
    pub occurred_at: DateTime<Utc>,
    pub requester_ip: Option<String>,
    pub user_agent: Option<String>,
    pub summary: serde_json::Value,
    pub outcome: AuditOutcome,
}

impl AuditEvent {
    pub fn new(
        document_id: DocumentId,
        kind: AuditKind,
        ctx: &RequestContext,
        summary: serde_json::Value,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            kind,
            occurred_at: Utc::now(),
            requester_ip: ctx.requester_ip.clone(),
            user_agent: ctx.user_agent.clone(),
            summary,
            outcome,
        }
    }
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError>;

    /// All events for `document_id` in append order.
    async fn events_for(&self, document_id: DocumentId) -> Result<Vec<AuditEvent>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_with_status_tag() {
        let accepted = serde_json::to_value(AuditOutcome::Accepted).unwrap();
        assert_eq!(accepted, serde_json::json!({"status": "accepted"}));

        let rejected = serde_json::to_value(AuditOutcome::Rejected {
            error: ErrorCode::AlreadySigned,
        })
        .unwrap();
        assert_eq!(
            rejected,
            serde_json::json!({"status": "rejected", "error": "ALREADY_SIGNED"})
        );
    }
}
