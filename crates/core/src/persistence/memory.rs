//! In-memory collaborators for tests and embedding.

use crate::audit::{AuditEvent, AuditTrail};
use crate::document::{
    revalidation_order, ApplyOutcome, CertificateStatus, HashAlgorithm, SignableDocument,
    SignatureUpdate,
};
use crate::store::{
    ArtifactFetcher, ArtifactStore, ClaimOutcome, DocumentRecords, FetchError, IdempotencyKeys,
    ReadUrl,
};
use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use vpr_files::ObjectKey;
use vpr_types::{DocumentId, IdempotencyKey, Sha256Hex};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryDocumentRecords {
    documents: Mutex<HashMap<DocumentId, SignableDocument>>,
    leases: Mutex<HashSet<DocumentId>>,
}

impl MemoryDocumentRecords {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRecords for MemoryDocumentRecords {
    async fn insert(&self, document: SignableDocument) -> Result<(), StoreError> {
        lock(&self.documents).insert(document.id, document);
        Ok(())
    }

    async fn load(&self, id: DocumentId) -> Result<Option<SignableDocument>, StoreError> {
        Ok(lock(&self.documents).get(&id).cloned())
    }

    async fn record_hash(
        &self,
        id: DocumentId,
        algorithm: HashAlgorithm,
        hash: Sha256Hex,
    ) -> Result<bool, StoreError> {
        let mut documents = lock(&self.documents);
        let Some(doc) = documents.get_mut(&id) else {
            return Ok(false);
        };
        doc.hash_algorithm = Some(algorithm);
        doc.hash_hex = Some(hash);
        Ok(true)
    }

    async fn acquire_signing_lease(&self, id: DocumentId) -> Result<bool, StoreError> {
        Ok(lock(&self.leases).insert(id))
    }

    async fn release_signing_lease(&self, id: DocumentId) -> Result<(), StoreError> {
        lock(&self.leases).remove(&id);
        Ok(())
    }

    async fn apply_signature(
        &self,
        id: DocumentId,
        update: SignatureUpdate,
    ) -> Result<ApplyOutcome, StoreError> {
        let mut documents = lock(&self.documents);
        Ok(match documents.get_mut(&id) {
            Some(doc) => doc.apply_signature(update),
            None => ApplyOutcome::Missing,
        })
    }

    async fn record_certificate_status(
        &self,
        id: DocumentId,
        status: CertificateStatus,
        validated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut documents = lock(&self.documents);
        let Some(doc) = documents.get_mut(&id) else {
            return Ok(false);
        };
        doc.certificate_status = status;
        doc.certificate_validated_at = Some(validated_at);
        Ok(true)
    }

    async fn stale_signed(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SignableDocument>, StoreError> {
        let mut due: Vec<SignableDocument> = lock(&self.documents)
            .values()
            .filter(|doc| doc.is_due_for_revalidation(cutoff))
            .cloned()
            .collect();
        due.sort_by(revalidation_order);
        due.truncate(limit);
        Ok(due)
    }
}

#[derive(Debug, Default)]
pub struct MemoryIdempotencyKeys {
    keys: Mutex<HashSet<String>>,
}

impl MemoryIdempotencyKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &IdempotencyKey) -> bool {
        lock(&self.keys).contains(key.as_str())
    }
}

#[async_trait]
impl IdempotencyKeys for MemoryIdempotencyKeys {
    async fn claim(&self, key: &IdempotencyKey) -> Result<ClaimOutcome, StoreError> {
        Ok(if lock(&self.keys).insert(key.as_str().to_owned()) {
            ClaimOutcome::Claimed
        } else {
            ClaimOutcome::AlreadyClaimed
        })
    }

    async fn release(&self, key: &IdempotencyKey) -> Result<(), StoreError> {
        lock(&self.keys).remove(key.as_str());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditTrail {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditTrail for MemoryAuditTrail {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError> {
        lock(&self.events).push(event);
        Ok(())
    }

    async fn events_for(&self, document_id: DocumentId) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(lock(&self.events)
            .iter()
            .filter(|event| event.document_id == document_id)
            .cloned()
            .collect())
    }
}

const MEMORY_URL_SCHEME: &str = "memory://";

/// Object store held in a map. Read URLs are `memory://<key>` and never expire; the store is
/// also its own [`ArtifactFetcher`] for those URLs.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<HashMap<ObjectKey, (Vec<u8>, String)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes and content type stored under `key`.
    pub fn object(&self, key: &ObjectKey) -> Option<(Vec<u8>, String)> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn read_url(&self, key: &ObjectKey) -> Result<ReadUrl, StoreError> {
        Ok(ReadUrl {
            url: format!("{MEMORY_URL_SCHEME}{key}"),
            expires_in_seconds: i64::MAX,
        })
    }

    async fn put_object(
        &self,
        key: &ObjectKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        lock(&self.objects).insert(key.clone(), (bytes, content_type.to_owned()));
        Ok(())
    }
}

#[async_trait]
impl ArtifactFetcher for MemoryArtifactStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let key = url
            .strip_prefix(MEMORY_URL_SCHEME)
            .and_then(|k| ObjectKey::parse(k).ok())
            .ok_or_else(|| FetchError::Rejected(format!("not a memory URL: {url}")))?;
        lock(&self.objects)
            .get(&key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or(FetchError::Status(404))
    }
}
