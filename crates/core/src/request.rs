//! Hash-then-sign request protocol.
//!
//! A signer asks for the digest of an unsigned document and is told where to deliver the
//! signature. The only write is the recorded digest; signature fields are never touched, so
//! the step can be retried freely.

use crate::audit::{AuditEvent, AuditKind, AuditOutcome, AuditTrail, RequestContext};
use crate::config::SigningConfig;
use crate::document::{HashAlgorithm, SignableDocument};
use crate::hashing::HashService;
use crate::store::DocumentRecords;
use crate::{SigningError, SigningResult};
use serde::Serialize;
use std::sync::Arc;
use vpr_types::{DocumentId, Sha256Hex};

/// What the signer needs to produce a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequest {
    pub document_id: DocumentId,
    pub hash_algorithm: HashAlgorithm,
    pub hash_hex: Sha256Hex,
    pub callback_url: String,
}

#[derive(Clone)]
pub struct SigningRequestProtocol {
    config: SigningConfig,
    records: Arc<dyn DocumentRecords>,
    audit: Arc<dyn AuditTrail>,
    hashing: HashService,
}

impl SigningRequestProtocol {
    pub fn new(
        config: SigningConfig,
        records: Arc<dyn DocumentRecords>,
        audit: Arc<dyn AuditTrail>,
        hashing: HashService,
    ) -> Self {
        Self {
            config,
            records,
            audit,
            hashing,
        }
    }

    /// Computes the digest of an unsigned document and records one REQUEST audit event.
    ///
    /// # Arguments
    ///
    /// * `raw_id` - Document id as received from the caller
    /// * `ctx` - Transport metadata for the audit event
    ///
    /// # Errors
    ///
    /// - `SigningError::NotFound` if the id is malformed or unknown
    /// - `SigningError::AlreadySigned` if the document is already signed
    /// - `SigningError::Download` / `SigningError::Store` on collaborator failures
    pub async fn request(
        &self,
        raw_id: &str,
        ctx: &RequestContext,
    ) -> SigningResult<SigningRequest> {
        let id: DocumentId = raw_id
            .parse()
            .map_err(|_| SigningError::NotFound(raw_id.to_owned()))?;
        let callback_url = self.config.callback_url(id);

        let result = self.prepare(id, &callback_url).await;

        let outcome = match &result {
            Ok(_) => AuditOutcome::Accepted,
            Err(err) => AuditOutcome::Rejected { error: err.code() },
        };
        let summary = serde_json::json!({
            "hashAlgorithm": HashAlgorithm::Sha256.as_str(),
            "callbackUrl": callback_url,
        });
        let event = AuditEvent::new(id, AuditKind::Request, ctx, summary, outcome);

        match result {
            Ok(request) => {
                self.audit.append(event).await?;
                tracing::info!(document_id = %id, "signing request issued");
                Ok(request)
            }
            Err(err) => {
                if let Err(audit_err) = self.audit.append(event).await {
                    tracing::error!(document_id = %id, "failed to audit rejected request: {}", audit_err);
                }
                tracing::info!(document_id = %id, error = %err.code(), "signing request rejected");
                Err(err)
            }
        }
    }

    async fn prepare(&self, id: DocumentId, callback_url: &str) -> SigningResult<SigningRequest> {
        let document = self.load_unsigned(id).await?;
        let hash_hex = self.hashing.digest_artifact(&document.artifact_key).await?;

        if !self
            .records
            .record_hash(id, HashAlgorithm::Sha256, hash_hex.clone())
            .await?
        {
            return Err(SigningError::NotFound(id.to_string()));
        }

        Ok(SigningRequest {
            document_id: id,
            hash_algorithm: HashAlgorithm::Sha256,
            hash_hex,
            callback_url: callback_url.to_owned(),
        })
    }

    async fn load_unsigned(&self, id: DocumentId) -> SigningResult<SignableDocument> {
        let document = self
            .records
            .load(id)
            .await?
            .ok_or_else(|| SigningError::NotFound(id.to_string()))?;
        if document.is_signed() {
            return Err(SigningError::AlreadySigned(id));
        }
        Ok(document)
    }
}
