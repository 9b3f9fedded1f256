//! Storage collaborator interfaces.
//!
//! The pipeline only talks to persistence through these traits. [`crate::persistence`] holds
//! in-memory and filesystem implementations.

use crate::document::{
    ApplyOutcome, CertificateStatus, HashAlgorithm, SignableDocument, SignatureUpdate,
};
use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vpr_files::ObjectKey;
use vpr_types::{DocumentId, IdempotencyKey, Sha256Hex};

/// Load/update access to document records.
#[async_trait]
pub trait DocumentRecords: Send + Sync {
    async fn insert(&self, document: SignableDocument) -> Result<(), StoreError>;

    async fn load(&self, id: DocumentId) -> Result<Option<SignableDocument>, StoreError>;

    /// Records the digest computed for a signing request. Returns `false` if the document is
    /// missing. Signature fields are never touched.
    async fn record_hash(
        &self,
        id: DocumentId,
        algorithm: HashAlgorithm,
        hash: Sha256Hex,
    ) -> Result<bool, StoreError>;

    /// Takes the exclusive right to store a signature for `id`, held until
    /// [`DocumentRecords::release_signing_lease`]. Returns `false` while another writer holds
    /// it, including writers in other processes sharing the same storage.
    async fn acquire_signing_lease(&self, id: DocumentId) -> Result<bool, StoreError>;

    /// Gives up a lease taken by [`DocumentRecords::acquire_signing_lease`]. Releasing a lease
    /// that is not held is a no-op.
    async fn release_signing_lease(&self, id: DocumentId) -> Result<(), StoreError>;

    /// The single atomic UNSIGNED -> SIGNED transition (compare-and-set on the status).
    async fn apply_signature(
        &self,
        id: DocumentId,
        update: SignatureUpdate,
    ) -> Result<ApplyOutcome, StoreError>;

    /// Stores a revalidation result. Returns `false` if the document is missing.
    async fn record_certificate_status(
        &self,
        id: DocumentId,
        status: CertificateStatus,
        validated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Signed documents never validated or validated before `cutoff`, never-validated first
    /// and then oldest first, at most `limit`.
    async fn stale_signed(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SignableDocument>, StoreError>;
}

/// Whether an idempotency key was newly claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyClaimed,
}

/// Idempotency records under a uniqueness constraint.
#[async_trait]
pub trait IdempotencyKeys: Send + Sync {
    /// Inserts `key`; concurrent or repeated claims of the same key see `AlreadyClaimed`.
    async fn claim(&self, key: &IdempotencyKey) -> Result<ClaimOutcome, StoreError>;

    /// Removes a claim whose callback did not commit. Releasing an unknown key is a no-op.
    async fn release(&self, key: &IdempotencyKey) -> Result<(), StoreError>;
}

/// A short-lived URL granting read access to one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadUrl {
    pub url: String,
    pub expires_in_seconds: i64,
}

/// The document store.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn read_url(&self, key: &ObjectKey) -> Result<ReadUrl, StoreError>;

    async fn put_object(
        &self,
        key: &ObjectKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("download failed: {0}")]
    Transport(String),
    #[error("download answered HTTP {0}")]
    Status(u16),
    #[error("read link rejected: {0}")]
    Rejected(String),
}

/// Downloads bytes from a read URL.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
