//! Filesystem-backed records.
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//! ├── records/
//! │   ├── documents/<s1>/<s2>/<id>/document.json
//! │   ├── audit/<s1>/<s2>/<id>.jsonl
//! │   └── idempotency/<sha256(key)>
//! └── files/            # object store (see vpr_files)
//! ```
//!
//! Document writes go through a temporary file and a rename. Read-modify-write cycles on
//! documents are serialised by one lock per store, which makes
//! [`DocumentRecords::apply_signature`] a compare-and-set within the process. Idempotency keys
//! and signing leases rely on `O_EXCL` file creation, which also holds across processes
//! sharing the directory.

use super::blocking;
use super::objects::ObjectArtifactStore;
use crate::audit::{AuditEvent, AuditTrail};
use crate::constants::{
    AUDIT_DIR_NAME, AUDIT_FILE_SUFFIX, DOCUMENTS_DIR_NAME, DOCUMENT_JSON_FILENAME,
    IDEMPOTENCY_DIR_NAME, RECORDS_DIR_NAME, SIGNING_LEASE_FILENAME, SIGNING_LEASE_TTL,
};
use crate::document::{
    revalidation_order, ApplyOutcome, CertificateStatus, HashAlgorithm, SignableDocument,
    SignatureUpdate,
};
use crate::fetch::HttpArtifactFetcher;
use crate::store::{ClaimOutcome, DocumentRecords, IdempotencyKeys};
use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use vpr_files::ObjectStore;
use vpr_types::{DocumentId, IdempotencyKey, Sha256Hex};

/// Directory (under the data directory) holding the object store.
const FILES_DIR_NAME: &str = "files";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("path has no parent: {}", path.display()),
        ))
    })?;
    fs::create_dir_all(parent)?;
    let tmp = parent.join(format!(
        ".tmp-{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Io(e));
    }
    Ok(())
}

fn read_document(path: &Path) -> Result<Option<SignableDocument>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Creates `path` exclusively and fills it with `write`. A marker whose contents could not be
/// written is removed again so the next attempt can claim it.
fn create_marker(
    path: &Path,
    write: impl FnOnce(&mut fs::File) -> std::io::Result<()>,
) -> Result<ClaimOutcome, StoreError> {
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Ok(ClaimOutcome::AlreadyClaimed)
        }
        Err(e) => return Err(StoreError::Io(e)),
    };
    if let Err(e) = write(&mut file) {
        drop(file);
        if let Err(remove_err) = fs::remove_file(path) {
            tracing::error!(path = %path.display(), "cannot remove incomplete marker: {}", remove_err);
        }
        return Err(StoreError::Io(e));
    }
    Ok(ClaimOutcome::Claimed)
}

fn write_timestamp(file: &mut fs::File) -> std::io::Result<()> {
    file.write_all(Utc::now().to_rfc3339().as_bytes())
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io(e)),
    }
}

fn older_than(path: &Path, ttl: Duration) -> Result<bool, StoreError> {
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => Ok(modified.elapsed().is_ok_and(|age| age > ttl)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(StoreError::Io(e)),
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut dirs = Vec::new();
    match fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    dirs.push(entry.path());
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StoreError::Io(e)),
    }
    Ok(dirs)
}

#[derive(Debug)]
struct DocumentsInner {
    root: PathBuf,
    write_lock: Mutex<()>,
    lease_ttl: Duration,
}

impl DocumentsInner {
    fn path(&self, id: DocumentId) -> PathBuf {
        id.sharded_dir(&self.root).join(DOCUMENT_JSON_FILENAME)
    }

    fn lease_path(&self, id: DocumentId) -> PathBuf {
        id.sharded_dir(&self.root).join(SIGNING_LEASE_FILENAME)
    }

    fn take_lease(&self, id: DocumentId) -> Result<bool, StoreError> {
        let path = self.lease_path(id);
        if let Some(parent) = path.parent() {
            if !parent.is_dir() {
                return Ok(false);
            }
        }
        for _ in 0..2 {
            if create_marker(&path, write_timestamp)? == ClaimOutcome::Claimed {
                return Ok(true);
            }
            if !older_than(&path, self.lease_ttl)? {
                return Ok(false);
            }
            tracing::warn!(document_id = %id, "breaking expired signing lease");
            remove_if_present(&path)?;
        }
        Ok(false)
    }

    /// Read-modify-write under the store lock. `change` decides whether to persist.
    fn modify<R>(
        &self,
        id: DocumentId,
        change: impl FnOnce(&mut SignableDocument) -> (R, bool),
    ) -> Result<Option<R>, StoreError> {
        let _guard = lock(&self.write_lock);
        let path = self.path(id);
        let Some(mut doc) = read_document(&path)? else {
            return Ok(None);
        };
        let (result, persist) = change(&mut doc);
        if persist {
            write_atomic(&path, &serde_json::to_vec_pretty(&doc)?)?;
        }
        Ok(Some(result))
    }

    fn all_documents(&self) -> Result<Vec<SignableDocument>, StoreError> {
        let mut docs = Vec::new();
        for s1 in subdirectories(&self.root)? {
            for s2 in subdirectories(&s1)? {
                for doc_dir in subdirectories(&s2)? {
                    let path = doc_dir.join(DOCUMENT_JSON_FILENAME);
                    match read_document(&path) {
                        Ok(Some(doc)) => docs.push(doc),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(path = %path.display(), "skipping unreadable document: {}", e);
                        }
                    }
                }
            }
        }
        Ok(docs)
    }
}

/// Document records stored as sharded JSON files.
#[derive(Debug, Clone)]
pub struct FsDocumentRecords {
    inner: Arc<DocumentsInner>,
}

impl FsDocumentRecords {
    /// Opens (creating if needed) the documents directory under `records_dir`.
    pub fn open(records_dir: &Path) -> Result<Self, StoreError> {
        let root = records_dir.join(DOCUMENTS_DIR_NAME);
        fs::create_dir_all(&root)?;
        Ok(Self {
            inner: Arc::new(DocumentsInner {
                root,
                write_lock: Mutex::new(()),
                lease_ttl: SIGNING_LEASE_TTL,
            }),
        })
    }
}

#[async_trait]
impl DocumentRecords for FsDocumentRecords {
    async fn insert(&self, document: SignableDocument) -> Result<(), StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let _guard = lock(&inner.write_lock);
            write_atomic(
                &inner.path(document.id),
                &serde_json::to_vec_pretty(&document)?,
            )
        })
        .await
    }

    async fn load(&self, id: DocumentId) -> Result<Option<SignableDocument>, StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || read_document(&inner.path(id))).await
    }

    async fn record_hash(
        &self,
        id: DocumentId,
        algorithm: HashAlgorithm,
        hash: Sha256Hex,
    ) -> Result<bool, StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            inner
                .modify(id, |doc| {
                    doc.hash_algorithm = Some(algorithm);
                    doc.hash_hex = Some(hash);
                    ((), true)
                })
                .map(|found| found.is_some())
        })
        .await
    }

    async fn acquire_signing_lease(&self, id: DocumentId) -> Result<bool, StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || inner.take_lease(id)).await
    }

    async fn release_signing_lease(&self, id: DocumentId) -> Result<(), StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || remove_if_present(&inner.lease_path(id))).await
    }

    async fn apply_signature(
        &self,
        id: DocumentId,
        update: SignatureUpdate,
    ) -> Result<ApplyOutcome, StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let outcome = inner.modify(id, |doc| {
                let outcome = doc.apply_signature(update);
                (outcome, outcome == ApplyOutcome::Signed)
            })?;
            Ok(outcome.unwrap_or(ApplyOutcome::Missing))
        })
        .await
    }

    async fn record_certificate_status(
        &self,
        id: DocumentId,
        status: CertificateStatus,
        validated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            inner
                .modify(id, |doc| {
                    doc.certificate_status = status;
                    doc.certificate_validated_at = Some(validated_at);
                    ((), true)
                })
                .map(|found| found.is_some())
        })
        .await
    }

    async fn stale_signed(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SignableDocument>, StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let mut due: Vec<SignableDocument> = inner
                .all_documents()?
                .into_iter()
                .filter(|doc| doc.is_due_for_revalidation(cutoff))
                .collect();
            due.sort_by(revalidation_order);
            due.truncate(limit);
            Ok(due)
        })
        .await
    }
}

/// Idempotency keys as marker files named by the key's SHA-256.
#[derive(Debug, Clone)]
pub struct FsIdempotencyKeys {
    dir: Arc<PathBuf>,
}

impl FsIdempotencyKeys {
    pub fn open(records_dir: &Path) -> Result<Self, StoreError> {
        let dir = records_dir.join(IDEMPOTENCY_DIR_NAME);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir: Arc::new(dir) })
    }

    fn path(&self, key: &IdempotencyKey) -> PathBuf {
        self.dir
            .join(hex::encode(Sha256::digest(key.as_str().as_bytes())))
    }
}

#[async_trait]
impl IdempotencyKeys for FsIdempotencyKeys {
    async fn claim(&self, key: &IdempotencyKey) -> Result<ClaimOutcome, StoreError> {
        let path = self.path(key);
        blocking(move || create_marker(&path, write_timestamp)).await
    }

    async fn release(&self, key: &IdempotencyKey) -> Result<(), StoreError> {
        let path = self.path(key);
        blocking(move || remove_if_present(&path)).await
    }
}

#[derive(Debug)]
struct AuditInner {
    root: PathBuf,
    append_lock: Mutex<()>,
}

/// Audit events as one JSON line per event, one file per document.
#[derive(Debug, Clone)]
pub struct FsAuditTrail {
    inner: Arc<AuditInner>,
}

impl FsAuditTrail {
    pub fn open(records_dir: &Path) -> Result<Self, StoreError> {
        let root = records_dir.join(AUDIT_DIR_NAME);
        fs::create_dir_all(&root)?;
        Ok(Self {
            inner: Arc::new(AuditInner {
                root,
                append_lock: Mutex::new(()),
            }),
        })
    }
}

#[async_trait]
impl AuditTrail for FsAuditTrail {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let path = event.document_id.sharded_file(&inner.root, AUDIT_FILE_SUFFIX);
            let mut line = serde_json::to_vec(&event)?;
            line.push(b'\n');

            let _guard = lock(&inner.append_lock);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            file.write_all(&line)?;
            file.sync_data()?;
            Ok(())
        })
        .await
    }

    async fn events_for(&self, document_id: DocumentId) -> Result<Vec<AuditEvent>, StoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let path = document_id.sharded_file(&inner.root, AUDIT_FILE_SUFFIX);
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(StoreError::Io(e)),
            };
            text.lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| serde_json::from_str(line).map_err(StoreError::from))
                .collect()
        })
        .await
    }
}

/// Every filesystem collaborator rooted at one data directory.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    pub records: Arc<FsDocumentRecords>,
    pub idempotency: Arc<FsIdempotencyKeys>,
    pub audit: Arc<FsAuditTrail>,
    pub objects: Arc<ObjectArtifactStore>,
}

impl FilesystemBackend {
    /// Opens the stores under `data_dir`, creating their subdirectories.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Existing data directory
    /// * `public_base_url` - Base URL of presigned read links
    /// * `read_url_ttl` - Lifetime of presigned read links
    /// * `files_signing_key` - Secret for presigned read links
    /// * `download_timeout` - Timeout for fetching read URLs that are not served locally
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if `data_dir` does not exist or a store cannot be opened.
    pub fn open(
        data_dir: &Path,
        public_base_url: &str,
        read_url_ttl: Duration,
        files_signing_key: Vec<u8>,
        download_timeout: Duration,
    ) -> Result<Self, StoreError> {
        if !data_dir.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("data directory does not exist: {}", data_dir.display()),
            )));
        }
        let records_dir = data_dir.join(RECORDS_DIR_NAME);
        let files_dir = data_dir.join(FILES_DIR_NAME);
        fs::create_dir_all(&files_dir)?;

        let store = ObjectStore::new(&files_dir, public_base_url, files_signing_key)?;
        let http = HttpArtifactFetcher::new(download_timeout)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let objects = ObjectArtifactStore::new(Arc::new(store), read_url_ttl, http);

        Ok(Self {
            records: Arc::new(FsDocumentRecords::open(&records_dir)?),
            idempotency: Arc::new(FsIdempotencyKeys::open(&records_dir)?),
            audit: Arc::new(FsAuditTrail::open(&records_dir)?),
            objects: Arc::new(objects),
        })
    }
}
