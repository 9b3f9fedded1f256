//! # VPR Core
//!
//! Document signature pipeline for clinical PDFs.
//!
//! A generated PDF is signed by an external signing provider over a webhook protocol:
//!
//! 1. [`request`]: the signer asks for the SHA-256 of the unsigned document and is given the
//!    callback URL to deliver the signature to.
//! 2. [`callback`]: the signer posts the signature. The raw body is authenticated with
//!    HMAC-SHA256 ([`webhook`]), deduplicated with an idempotency key, stored, and the document
//!    flips to SIGNED exactly once.
//! 3. [`revocation`]: the signer's certificate is checked over OCSP, leaf first with an issuer
//!    fallback. Failures become UNKNOWN, never errors.
//! 4. [`scheduler`]: stale certificate statuses are refreshed periodically in batches.
//!
//! Storage is reached only through the traits in [`store`]; [`persistence`] provides
//! in-memory and filesystem implementations. [`SigningService`] wires everything together.
//!
//! **No API concerns**: HTTP routing, status codes and process configuration belong in
//! `api-rest` and the binaries.

pub mod audit;
pub mod callback;
pub mod config;
pub mod constants;
pub mod document;
mod error;
pub mod fetch;
pub mod hashing;
pub mod persistence;
pub mod request;
pub mod revocation;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod webhook;

pub use audit::{AuditEvent, AuditKind, AuditOutcome, RequestContext};
pub use callback::{CallbackAck, CallbackHeaders, CallbackPayload, SignedArtifact, SignerEvidence};
pub use config::{RevalidationPolicy, SigningConfig, WebhookSecret};
pub use document::{
    CertificateStatus, HashAlgorithm, SignableDocument, SignatureFormat, SignatureStatus,
};
pub use error::{ErrorCode, SigningError, SigningResult, StoreError};
pub use persistence::filesystem::FilesystemBackend;
pub use request::SigningRequest;
pub use revocation::{OcspValidator, RevalidationOutcome};
pub use scheduler::{BatchReport, RevalidationScheduler};
pub use service::{Collaborators, SignatureSummary, SignedUrl, SigningService};
