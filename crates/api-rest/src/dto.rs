//! JSON shapes of the REST surface.
//!
//! Pipeline types stay free of HTTP and OpenAPI concerns; these mirror them with `ToSchema`
//! and wire-format strings.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use vpr_core::{
    AuditEvent, AuditOutcome, CallbackAck, RevalidationOutcome, SignatureSummary, SignedUrl,
    SigningRequest,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// Stable error code, e.g. `DUPLICATE_CALLBACK`
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequestRes {
    pub document_id: String,
    pub hash_algorithm: String,
    pub hash_hex: String,
    pub callback_url: String,
}

impl From<SigningRequest> for SigningRequestRes {
    fn from(req: SigningRequest) -> Self {
        Self {
            document_id: req.document_id.to_string(),
            hash_algorithm: req.hash_algorithm.as_str().to_string(),
            hash_hex: req.hash_hex.to_string(),
            callback_url: req.callback_url,
        }
    }
}

/// Body the signer posts to the callback URL. Authenticated over its raw bytes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallbackReq {
    /// `EMBEDDED` (alias `PADES`) or `DETACHED` (alias `CMS`)
    pub format: String,
    pub signature_base64: String,
    pub certificate_pem: Option<String>,
    /// Array of PEM certificates or one concatenated PEM bundle
    pub certificate_chain_pem: Option<Vec<String>>,
    pub algorithm: Option<String>,
    pub signer_name: Option<String>,
    /// RFC 3161 token, detached signatures only
    pub timestamp_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAckRes {
    pub document_id: String,
    pub signature_status: String,
    pub signed_artifact_key: String,
    pub format: String,
    pub signature_sha256: String,
}

impl From<CallbackAck> for CallbackAckRes {
    fn from(ack: CallbackAck) -> Self {
        Self {
            document_id: ack.document_id.to_string(),
            signature_status: "SIGNED".to_string(),
            signed_artifact_key: ack.signed_artifact_key.to_string(),
            format: ack.format.as_str().to_string(),
            signature_sha256: ack.signature_sha256.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlRes {
    pub url: String,
    pub expires_in_seconds: i64,
    pub format: String,
}

impl From<SignedUrl> for SignedUrlRes {
    fn from(url: SignedUrl) -> Self {
        Self {
            url: url.url,
            expires_in_seconds: url.expires_in_seconds,
            format: url.format.as_str().to_string(),
        }
    }
}

fn wire<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatusRes {
    pub document_id: String,
    pub artifact_key: String,
    pub hash_algorithm: Option<String>,
    pub hash_hex: Option<String>,
    pub signature_status: String,
    pub signature_format: Option<String>,
    pub signed_artifact_key: Option<String>,
    pub signature_sha256: Option<String>,
    pub signature_algorithm: Option<String>,
    pub signer_name: Option<String>,
    pub signer_cert_subject: Option<String>,
    pub signer_cert_issuer: Option<String>,
    pub signer_cert_serial: Option<String>,
    pub chain_length: usize,
    pub certificate_status: String,
    pub certificate_validated_at: Option<String>,
    pub signed_at: Option<String>,
    pub created_at: String,
}

impl From<SignatureSummary> for SignatureStatusRes {
    fn from(s: SignatureSummary) -> Self {
        Self {
            document_id: s.document_id.to_string(),
            artifact_key: s.artifact_key.to_string(),
            hash_algorithm: s.hash_algorithm.map(|a| a.as_str().to_string()),
            hash_hex: s.hash_hex.map(|h| h.to_string()),
            signature_status: wire(&s.signature_status),
            signature_format: s.signature_format.map(|f| f.as_str().to_string()),
            signed_artifact_key: s.signed_artifact_key.map(|k| k.to_string()),
            signature_sha256: s.signature_sha256.map(|h| h.to_string()),
            signature_algorithm: s.signature_algorithm,
            signer_name: s.signer_name,
            signer_cert_subject: s.signer_cert_subject,
            signer_cert_issuer: s.signer_cert_issuer,
            signer_cert_serial: s.signer_cert_serial,
            chain_length: s.chain_length,
            certificate_status: wire(&s.certificate_status),
            certificate_validated_at: s.certificate_validated_at.map(|t| t.to_rfc3339()),
            signed_at: s.signed_at.map(|t| t.to_rfc3339()),
            created_at: s.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevalidateRes {
    pub document_id: String,
    /// `VALID`, `REVOKED` or `UNKNOWN`
    pub certificate_status: String,
    pub certificate_validated_at: String,
}

impl From<RevalidationOutcome> for RevalidateRes {
    fn from(outcome: RevalidationOutcome) -> Self {
        Self {
            document_id: outcome.document_id.to_string(),
            certificate_status: wire(&outcome.certificate_status),
            certificate_validated_at: outcome.certificate_validated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventRes {
    pub id: String,
    pub document_id: String,
    /// `REQUEST` or `CALLBACK`
    pub kind: String,
    pub occurred_at: String,
    pub requester_ip: Option<String>,
    pub user_agent: Option<String>,
    #[schema(value_type = Object)]
    pub summary: serde_json::Value,
    /// `accepted` or `rejected`
    pub status: String,
    /// Error code of a rejected event
    pub error: Option<String>,
}

impl From<AuditEvent> for AuditEventRes {
    fn from(event: AuditEvent) -> Self {
        let (status, error) = match event.outcome {
            AuditOutcome::Accepted => ("accepted", None),
            AuditOutcome::Rejected { error } => ("rejected", Some(error.as_str().to_string())),
        };
        Self {
            id: event.id.to_string(),
            document_id: event.document_id.to_string(),
            kind: wire(&event.kind),
            occurred_at: event.occurred_at.to_rfc3339(),
            requester_ip: event.requester_ip,
            user_agent: event.user_agent,
            summary: event.summary,
            status: status.to_string(),
            error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditTrailRes {
    pub events: Vec<AuditEventRes>,
}
