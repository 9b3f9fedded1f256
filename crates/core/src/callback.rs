//! Signature callback handling.
//!
//! The external signer delivers the signature for a document with a JSON body, an HMAC of that
//! body in `X-Signature` and a caller-chosen `Idempotency-Key`. Checks run in a fixed order and
//! nothing is written before all of them pass:
//!
//! 1. a webhook secret is configured
//! 2. the HMAC over the raw body matches
//! 3. an idempotency key is supplied
//! 4. the body is a valid payload for one of the two signature formats
//! 5. the idempotency key is claimed (a replay fails here)
//! 6. the document exists, is unsigned, and no other callback holds its signing lease
//!
//! Once the checks pass a single CALLBACK audit event is written, the signed artifact is
//! stored and the document is flipped to SIGNED, all under the lease, which is shared with
//! other processes using the same records. A failure after the claim releases the key.

use crate::audit::{AuditEvent, AuditKind, AuditOutcome, AuditTrail, RequestContext};
use crate::constants::{
    CONTENT_TYPE_CMS, CONTENT_TYPE_PDF, CONTENT_TYPE_TIMESTAMP, DETACHED_SIGNATURE_SUFFIX,
    EMBEDDED_SIGNED_SUFFIX, TIMESTAMP_TOKEN_SUFFIX,
};
use crate::document::{
    ApplyOutcome, SignableDocument, SignatureFormat, SignatureStatus, SignatureUpdate,
};
use crate::hashing::sha256;
use crate::store::{ArtifactStore, ClaimOutcome, DocumentRecords, IdempotencyKeys};
use crate::webhook::WebhookAuthenticator;
use crate::{SigningError, SigningResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vpr_files::ObjectKey;
use vpr_types::{DocumentId, IdempotencyKey, Sha256Hex};

/// The signed bytes, shaped by format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedArtifact {
    /// PAdES: a complete signed PDF.
    Embedded { signed_pdf: Vec<u8> },
    /// CMS: a detached signature, optionally with an RFC 3161 timestamp token.
    Detached {
        cms: Vec<u8>,
        timestamp_token: Option<Vec<u8>>,
    },
}

impl SignedArtifact {
    pub fn format(&self) -> SignatureFormat {
        match self {
            SignedArtifact::Embedded { .. } => SignatureFormat::Embedded,
            SignedArtifact::Detached { .. } => SignatureFormat::Detached,
        }
    }

    /// The bytes stored as the signed artifact.
    pub fn signature_bytes(&self) -> &[u8] {
        match self {
            SignedArtifact::Embedded { signed_pdf } => signed_pdf,
            SignedArtifact::Detached { cms, .. } => cms,
        }
    }
}

/// Who signed, as claimed by the signer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerEvidence {
    /// The signer certificate exactly as supplied.
    pub certificate_pem: Option<String>,
    /// Normalised chain, leaf first.
    pub chain: Vec<String>,
    pub algorithm: Option<String>,
    pub signer_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChainField {
    List(Vec<String>),
    Bundle(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCallback {
    format: String,
    signature_base64: String,
    #[serde(default)]
    certificate_pem: Option<String>,
    #[serde(default)]
    certificate_chain_pem: Option<ChainField>,
    #[serde(default)]
    algorithm: Option<String>,
    #[serde(default)]
    signer_name: Option<String>,
    #[serde(default)]
    timestamp_token: Option<String>,
}

/// A validated callback body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub artifact: SignedArtifact,
    pub evidence: SignerEvidence,
}

fn decode_base64(field: &str, value: &str) -> SigningResult<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| SigningError::InvalidPayload(format!("{field} is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(SigningError::InvalidPayload(format!("{field} is empty")));
    }
    Ok(bytes)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Leaf-first chain from the supplied certificate and chain field. Unparsable entries are
/// dropped.
fn normalise_chain(certificate_pem: Option<&str>, chain: Option<ChainField>) -> Vec<String> {
    let entries = match chain {
        Some(ChainField::List(list)) => list,
        Some(ChainField::Bundle(bundle)) => vec![bundle],
        None => Vec::new(),
    };

    let mut normalised = Vec::new();
    for entry in &entries {
        match vpr_certificates::split_pem_chain(entry) {
            Ok(certs) => normalised.extend(certs),
            Err(e) => tracing::debug!("skipping unusable chain entry: {}", e),
        }
    }

    let leaf = certificate_pem
        .and_then(|pem| vpr_certificates::split_pem_chain(pem).ok())
        .and_then(|certs| certs.into_iter().next());
    if let Some(leaf) = leaf {
        if normalised.first() != Some(&leaf) {
            normalised.insert(0, leaf);
        }
    }
    normalised
}

impl CallbackPayload {
    /// Parses and validates a raw callback body.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::InvalidPayload` for malformed JSON, an unknown format, or
    /// missing, empty or non-base64 signature bytes.
    pub fn parse(raw_body: &[u8]) -> SigningResult<Self> {
        let raw: RawCallback = serde_json::from_slice(raw_body)
            .map_err(|e| SigningError::InvalidPayload(e.to_string()))?;

        let format = SignatureFormat::parse(&raw.format).ok_or_else(|| {
            SigningError::InvalidPayload(format!("unsupported signature format '{}'", raw.format))
        })?;
        let signature = decode_base64("signatureBase64", &raw.signature_base64)?;
        let timestamp_token = match non_blank(raw.timestamp_token) {
            Some(token) => Some(decode_base64("timestampToken", &token)?),
            None => None,
        };

        let artifact = match format {
            SignatureFormat::Embedded => {
                if timestamp_token.is_some() {
                    tracing::debug!("ignoring timestamp token on embedded signature");
                }
                SignedArtifact::Embedded {
                    signed_pdf: signature,
                }
            }
            SignatureFormat::Detached => SignedArtifact::Detached {
                cms: signature,
                timestamp_token,
            },
        };

        let certificate_pem = non_blank(raw.certificate_pem);
        let chain = normalise_chain(certificate_pem.as_deref(), raw.certificate_chain_pem);

        Ok(Self {
            artifact,
            evidence: SignerEvidence {
                certificate_pem,
                chain,
                algorithm: non_blank(raw.algorithm),
                signer_name: non_blank(raw.signer_name),
            },
        })
    }

    pub fn format(&self) -> SignatureFormat {
        self.artifact.format()
    }

    /// Redacted summary for the audit trail.
    fn audit_summary(&self) -> serde_json::Value {
        let timestamp_supplied = matches!(
            self.artifact,
            SignedArtifact::Detached {
                timestamp_token: Some(_),
                ..
            }
        );
        serde_json::json!({
            "format": self.format().as_str(),
            "signerName": self.evidence.signer_name,
            "algorithm": self.evidence.algorithm,
            "certificateSupplied": self.evidence.certificate_pem.is_some(),
            "chainLength": self.evidence.chain.len(),
            "timestampSupplied": timestamp_supplied,
        })
    }
}

/// Key of the signed artifact derived from the unsigned one.
///
/// EMBEDDED replaces a trailing `.pdf` (any case) with `.signed.pdf`, or appends it when there
/// is none. DETACHED appends `.p7s`.
///
/// # Errors
///
/// Returns `SigningError::InvalidPayload` if the derived key would be invalid (too long).
pub fn signed_artifact_key(
    original: &ObjectKey,
    format: SignatureFormat,
) -> SigningResult<ObjectKey> {
    let derived = match format {
        SignatureFormat::Embedded => {
            let key = original.as_str();
            let stem = if key.len() > 4 && key[key.len() - 4..].eq_ignore_ascii_case(".pdf") {
                &key[..key.len() - 4]
            } else {
                key
            };
            ObjectKey::parse(&format!("{stem}{EMBEDDED_SIGNED_SUFFIX}"))
        }
        SignatureFormat::Detached => original.with_suffix(DETACHED_SIGNATURE_SUFFIX),
    };
    derived.map_err(|e| SigningError::InvalidPayload(format!("cannot derive signed key: {e}")))
}

/// Transport headers relevant to callback processing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackHeaders<'a> {
    /// `X-Signature`
    pub signature: Option<&'a str>,
    /// `Idempotency-Key`
    pub idempotency_key: Option<&'a str>,
}

/// Acknowledgement returned to the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub document_id: DocumentId,
    pub signature_status: SignatureStatus,
    pub signed_artifact_key: ObjectKey,
    pub format: SignatureFormat,
    pub signature_sha256: Sha256Hex,
}

#[derive(Clone)]
pub struct SignatureCallbackHandler {
    authenticator: WebhookAuthenticator,
    records: Arc<dyn DocumentRecords>,
    idempotency: Arc<dyn IdempotencyKeys>,
    audit: Arc<dyn AuditTrail>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl SignatureCallbackHandler {
    pub fn new(
        authenticator: WebhookAuthenticator,
        records: Arc<dyn DocumentRecords>,
        idempotency: Arc<dyn IdempotencyKeys>,
        audit: Arc<dyn AuditTrail>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            authenticator,
            records,
            idempotency,
            audit,
            artifacts,
        }
    }

    /// Authenticates and applies a signature callback.
    ///
    /// # Arguments
    ///
    /// * `raw_id` - Document id from the callback URL
    /// * `raw_body` - Request body exactly as received
    /// * `headers` - Signature and idempotency headers
    /// * `ctx` - Transport metadata for the audit event
    ///
    /// # Errors
    ///
    /// Returns the `SigningError` of the first failed check (see module docs), or
    /// `SigningError::Store` if storing the artifact or the document update fails.
    pub async fn handle(
        &self,
        raw_id: &str,
        raw_body: &[u8],
        headers: CallbackHeaders<'_>,
        ctx: &RequestContext,
    ) -> SigningResult<CallbackAck> {
        if let Err(err) = self.authenticator.verify(raw_body, headers.signature) {
            tracing::warn!(document_id = raw_id, error = %err.code(), "callback rejected: {}", err);
            return Err(err);
        }

        let Some(key) = headers
            .idempotency_key
            .and_then(|k| IdempotencyKey::parse(k).ok())
        else {
            tracing::warn!(document_id = raw_id, "callback rejected: no usable idempotency key");
            return Err(SigningError::MissingIdempotencyKey);
        };

        let payload = match CallbackPayload::parse(raw_body) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(document_id = raw_id, "callback rejected: {}", err);
                return Err(err);
            }
        };

        if self.idempotency.claim(&key).await? == ClaimOutcome::AlreadyClaimed {
            tracing::warn!(document_id = raw_id, "callback rejected: duplicate idempotency key");
            return Err(SigningError::DuplicateCallback);
        }

        let result = self.process_claimed(raw_id, payload, ctx).await;
        if let Err(err) = &result {
            if let Err(release_err) = self.idempotency.release(&key).await {
                tracing::error!(document_id = raw_id, "failed to release idempotency key: {}", release_err);
            }
            tracing::info!(document_id = raw_id, error = %err.code(), "callback failed after claim: {}", err);
        }
        result
    }

    async fn process_claimed(
        &self,
        raw_id: &str,
        payload: CallbackPayload,
        ctx: &RequestContext,
    ) -> SigningResult<CallbackAck> {
        let id: DocumentId = raw_id
            .parse()
            .map_err(|_| SigningError::NotFound(raw_id.to_owned()))?;
        self.load_unsigned(id).await?;

        if !self.records.acquire_signing_lease(id).await? {
            return Err(SigningError::SigningInProgress(id));
        }
        let result = self.sign_under_lease(id, payload, ctx).await;
        if let Err(e) = self.records.release_signing_lease(id).await {
            tracing::error!(document_id = %id, "failed to release signing lease: {}", e);
        }
        result
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

    /// Stores the signature bytes and flips the record. Only one writer holds the lease, so
    /// the signed key is never overwritten by a loser of the compare-and-set.
    async fn sign_under_lease(
        &self,
        id: DocumentId,
        payload: CallbackPayload,
        ctx: &RequestContext,
    ) -> SigningResult<CallbackAck> {
        // Re-read: another process may have signed between the first check and the lease.
        let document = self.load_unsigned(id).await?;

        self.audit
            .append(AuditEvent::new(
                id,
                AuditKind::Callback,
                ctx,
                payload.audit_summary(),
                AuditOutcome::Accepted,
            ))
            .await?;

        let metadata = payload
            .evidence
            .certificate_pem
            .as_deref()
            .and_then(|pem| match vpr_certificates::extract_metadata(pem) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    tracing::info!(document_id = %id, "signer certificate metadata unavailable: {}", e);
                    None
                }
            });

        let format = payload.format();
        let signed_key = signed_artifact_key(&document.artifact_key, format)?;
        let signature_sha256 = sha256(payload.artifact.signature_bytes());

        let timestamp_token_key = match payload.artifact {
            SignedArtifact::Embedded { signed_pdf } => {
                self.artifacts
                    .put_object(&signed_key, signed_pdf, CONTENT_TYPE_PDF)
                    .await?;
                None
            }
            SignedArtifact::Detached {
                cms,
                timestamp_token,
            } => {
                self.artifacts
                    .put_object(&signed_key, cms, CONTENT_TYPE_CMS)
                    .await?;
                match timestamp_token {
                    Some(token) => {
                        let token_key = signed_key
                            .with_suffix(TIMESTAMP_TOKEN_SUFFIX)
                            .map_err(|e| SigningError::InvalidPayload(e.to_string()))?;
                        self.artifacts
                            .put_object(&token_key, token, CONTENT_TYPE_TIMESTAMP)
                            .await?;
                        Some(token_key)
                    }
                    None => None,
                }
            }
        };

        let evidence = payload.evidence;
        let update = SignatureUpdate {
            format,
            signed_artifact_key: signed_key.clone(),
            signature_sha256: signature_sha256.clone(),
            signature_algorithm: evidence.algorithm,
            timestamp_token_key,
            signer_name: evidence.signer_name,
            signer_cert_subject: metadata.as_ref().map(|m| m.subject.clone()),
            signer_cert_issuer: metadata.as_ref().map(|m| m.issuer.clone()),
            signer_cert_serial: metadata.map(|m| m.serial_number),
            signer_certificate_chain: evidence.chain,
            signed_at: Utc::now(),
        };

        match self.records.apply_signature(id, update).await? {
            ApplyOutcome::Signed => {}
            ApplyOutcome::AlreadySigned => return Err(SigningError::AlreadySigned(id)),
            ApplyOutcome::Missing => return Err(SigningError::NotFound(id.to_string())),
        }

        tracing::info!(document_id = %id, format = format.as_str(), signed_key = %signed_key, "document signed");
        Ok(CallbackAck {
            document_id: id,
            signature_status: SignatureStatus::Signed,
            signed_artifact_key: signed_key,
            format,
            signature_sha256,
        })
    }
}
