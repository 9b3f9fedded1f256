//! The signing pipeline assembled from its collaborators.
//!
//! [`SigningService`] is what the HTTP layer and the CLI hold. It owns no global state; every
//! collaborator is injected through [`Collaborators`] by the composition root.

use crate::audit::{AuditEvent, AuditTrail, RequestContext};
use crate::callback::{CallbackAck, CallbackHeaders, SignatureCallbackHandler};
use crate::config::{RevalidationPolicy, SigningConfig};
use crate::constants::CONTENT_TYPE_PDF;
use crate::document::{
    CertificateStatus, HashAlgorithm, SignableDocument, SignatureFormat, SignatureStatus,
};
use crate::hashing::HashService;
use crate::request::{SigningRequest, SigningRequestProtocol};
use crate::revocation::{OcspValidator, RevalidationOutcome};
use crate::scheduler::RevalidationScheduler;
use crate::store::{ArtifactFetcher, ArtifactStore, DocumentRecords, IdempotencyKeys};
use crate::webhook::WebhookAuthenticator;
use crate::{SigningError, SigningResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use vpr_files::ObjectKey;
use vpr_ocsp::OcspClient;
use vpr_types::{DocumentId, Sha256Hex};

/// Everything the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn DocumentRecords>,
    pub idempotency: Arc<dyn IdempotencyKeys>,
    pub audit: Arc<dyn AuditTrail>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub ocsp: Arc<dyn OcspClient>,
}

/// Read access to a signed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    pub expires_in_seconds: i64,
    pub format: SignatureFormat,
}

/// Signature state of a document without the certificate chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSummary {
    pub document_id: DocumentId,
    pub artifact_key: ObjectKey,
    pub hash_algorithm: Option<HashAlgorithm>,
    pub hash_hex: Option<Sha256Hex>,
    pub signature_status: SignatureStatus,
    pub signature_format: Option<SignatureFormat>,
    pub signed_artifact_key: Option<ObjectKey>,
    pub signature_sha256: Option<Sha256Hex>,
    pub signature_algorithm: Option<String>,
    pub signer_name: Option<String>,
    pub signer_cert_subject: Option<String>,
    pub signer_cert_issuer: Option<String>,
    pub signer_cert_serial: Option<String>,
    pub chain_length: usize,
    pub certificate_status: CertificateStatus,
    pub certificate_validated_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&SignableDocument> for SignatureSummary {
    fn from(doc: &SignableDocument) -> Self {
        Self {
            document_id: doc.id,
            artifact_key: doc.artifact_key.clone(),
            hash_algorithm: doc.hash_algorithm,
            hash_hex: doc.hash_hex.clone(),
            signature_status: doc.signature_status,
            signature_format: doc.signature_format,
            signed_artifact_key: doc.signed_artifact_key.clone(),
            signature_sha256: doc.signature_sha256.clone(),
            signature_algorithm: doc.signature_algorithm.clone(),
            signer_name: doc.signer_name.clone(),
            signer_cert_subject: doc.signer_cert_subject.clone(),
            signer_cert_issuer: doc.signer_cert_issuer.clone(),
            signer_cert_serial: doc.signer_cert_serial.clone(),
            chain_length: doc.signer_certificate_chain.len(),
            certificate_status: doc.certificate_status,
            certificate_validated_at: doc.certificate_validated_at,
            signed_at: doc.signed_at,
            created_at: doc.created_at,
        }
    }
}

#[derive(Clone)]
pub struct SigningService {
    config: SigningConfig,
    records: Arc<dyn DocumentRecords>,
    audit: Arc<dyn AuditTrail>,
    artifacts: Arc<dyn ArtifactStore>,
    request: SigningRequestProtocol,
    callback: SignatureCallbackHandler,
    validator: Arc<OcspValidator>,
}

impl SigningService {
    pub fn new(config: SigningConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            records,
            idempotency,
            audit,
            artifacts,
            fetcher,
            ocsp,
        } = collaborators;

        let hashing = HashService::new(Arc::clone(&artifacts), fetcher);
        let request = SigningRequestProtocol::new(
            config.clone(),
            Arc::clone(&records),
            Arc::clone(&audit),
            hashing,
        );
        let callback = SignatureCallbackHandler::new(
            WebhookAuthenticator::new(config.webhook_secret().cloned()),
            Arc::clone(&records),
            idempotency,
            Arc::clone(&audit),
            Arc::clone(&artifacts),
        );
        let validator = Arc::new(OcspValidator::new(
            ocsp,
            Arc::clone(&records),
            config.ocsp_timeout(),
        ));

        Self {
            config,
            records,
            audit,
            artifacts,
            request,
            callback,
            validator,
        }
    }

    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// Stores an unsigned PDF and creates its document record.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::Store` if the object or the record cannot be written.
    pub async fn register_document(
        &self,
        artifact_key: ObjectKey,
        pdf: Vec<u8>,
    ) -> SigningResult<SignableDocument> {
        self.artifacts
            .put_object(&artifact_key, pdf, CONTENT_TYPE_PDF)
            .await?;
        let document = SignableDocument::new_unsigned(artifact_key, Utc::now());
        self.records.insert(document.clone()).await?;
        tracing::info!(document_id = %document.id, artifact_key = %document.artifact_key, "document registered");
        Ok(document)
    }

    /// See [`SigningRequestProtocol::request`].
    pub async fn request_signature(
        &self,
        raw_id: &str,
        ctx: &RequestContext,
    ) -> SigningResult<SigningRequest> {
        self.request.request(raw_id, ctx).await
    }

    /// See [`SignatureCallbackHandler::handle`].
    pub async fn handle_callback(
        &self,
        raw_id: &str,
        raw_body: &[u8],
        headers: CallbackHeaders<'_>,
        ctx: &RequestContext,
    ) -> SigningResult<CallbackAck> {
        self.callback.handle(raw_id, raw_body, headers, ctx).await
    }

    /// Short-lived read URL for the signed artifact.
    ///
    /// # Errors
    ///
    /// - `SigningError::NotFound` for an unknown document
    /// - `SigningError::NotSigned` if the document has no signed artifact yet
    pub async fn signed_url(&self, raw_id: &str) -> SigningResult<SignedUrl> {
        let document = self.load(raw_id).await?;
        let (Some(key), Some(format)) = (
            document.signed_artifact_key.as_ref(),
            document.signature_format,
        ) else {
            return Err(SigningError::NotSigned(document.id));
        };
        if !document.is_signed() {
            return Err(SigningError::NotSigned(document.id));
        }

        let read_url = self.artifacts.read_url(key).await?;
        Ok(SignedUrl {
            url: read_url.url,
            expires_in_seconds: read_url.expires_in_seconds,
            format,
        })
    }

    /// # Errors
    ///
    /// Returns `SigningError::NotFound` for an unknown document.
    pub async fn status(&self, raw_id: &str) -> SigningResult<SignatureSummary> {
        let document = self.load(raw_id).await?;
        Ok(SignatureSummary::from(&document))
    }

    /// Audit events for a document, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::NotFound` for an unknown document.
    pub async fn audit_events(&self, raw_id: &str) -> SigningResult<Vec<AuditEvent>> {
        let document = self.load(raw_id).await?;
        Ok(self.audit.events_for(document.id).await?)
    }

    /// Runs the OCSP validator for one document now.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::NotFound` or `SigningError::NotSigned`; OCSP failures are not
    /// errors.
    pub async fn revalidate(&self, raw_id: &str) -> SigningResult<RevalidationOutcome> {
        self.validator.revalidate_by_id(raw_id, Utc::now()).await
    }

    /// A scheduler sharing this service's validator and records.
    pub fn scheduler(&self, policy: RevalidationPolicy) -> RevalidationScheduler {
        RevalidationScheduler::new(
            Arc::clone(&self.validator),
            Arc::clone(&self.records),
            policy,
        )
    }

    async fn load(&self, raw_id: &str) -> SigningResult<SignableDocument> {
        let id: DocumentId = raw_id
            .parse()
            .map_err(|_| SigningError::NotFound(raw_id.to_owned()))?;
        self.records
            .load(id)
            .await?
            .ok_or_else(|| SigningError::NotFound(id.to_string()))
    }
}
