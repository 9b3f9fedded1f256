//! Filesystem-backed object store.
//!
//! Object bytes live under `<root>/objects/<key>` and a JSON [`ObjectMetadata`] record under
//! `<root>/meta/<key>.json`. Both are written through a temporary sibling file and renamed
//! into place, so a crash mid-write never leaves a truncated object behind.

use crate::constants::{METADATA_FOLDER_NAME, OBJECTS_FOLDER_NAME, READ_ROUTE_PREFIX};
use crate::presign::{self, HmacSha256, PresignedUrl};
use crate::{FilesError, ObjectKey};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use vpr_types::Sha256Hex;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metadata recorded alongside each stored object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Key the object is stored under
    pub key: ObjectKey,

    /// Content type supplied by the writer
    pub content_type: String,

    /// Size of the object in bytes
    pub size_bytes: u64,

    /// Hexadecimal SHA-256 digest of the object bytes
    pub sha256: Sha256Hex,

    /// UTC timestamp when the object was last written
    pub stored_at: DateTime<Utc>,
}

/// Object store rooted at a directory, able to mint presigned read links.
pub struct ObjectStore {
    /// Canonicalised store root
    root: PathBuf,

    /// Public base URL that presigned links are built on
    url_base: String,

    /// Keyed HMAC used for presigned links
    link_key: HmacSha256,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("root", &self.root)
            .field("url_base", &self.url_base)
            .field("link_key", &"<redacted>")
            .finish()
    }
}

impl ObjectStore {
    /// Opens an object store rooted at `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Existing directory to store objects under
    /// * `url_base` - Public base URL used when building presigned links (trailing `/` ignored)
    /// * `signing_key` - Secret used to sign presigned links
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - The root directory does not exist or is not a directory
    /// - Path canonicalisation fails
    /// - The signing key is rejected
    pub fn new(
        root: &Path,
        url_base: impl Into<String>,
        signing_key: Vec<u8>,
    ) -> Result<Self, FilesError> {
        if !root.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not an existing directory: {}",
                root.display()
            )));
        }

        let root = root.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root.display(),
                e
            ))
        })?;

        let url_base = url_base.into().trim_end_matches('/').to_owned();
        let link_key = presign::keyed(&signing_key)?;

        Ok(Self {
            root,
            url_base,
            link_key,
        })
    }

    /// Returns the canonicalised store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Base URL presigned links are built on, without a trailing `/`.
    pub fn url_base(&self) -> &str {
        &self.url_base
    }

    /// Prefix shared by every presigned link this store produces.
    pub fn link_prefix(&self) -> String {
        format!("{}/{}/", self.url_base, READ_ROUTE_PREFIX)
    }

    /// Writes `bytes` under `key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::Io` or `FilesError::Serialization` if the object or its metadata
    /// cannot be written.
    pub fn put(
        &self,
        key: &ObjectKey,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<ObjectMetadata, FilesError> {
        let digest: [u8; 32] = Sha256::digest(bytes).into();
        let metadata = ObjectMetadata {
            key: key.clone(),
            content_type: content_type.to_owned(),
            size_bytes: bytes.len() as u64,
            sha256: Sha256Hex::from_bytes(&digest),
            stored_at: Utc::now(),
        };

        write_atomic(&self.object_path(key), bytes)?;
        write_atomic(&self.metadata_path(key), &serde_json::to_vec_pretty(&metadata)?)?;

        tracing::debug!(key = %key, size = bytes.len(), "stored object");
        Ok(metadata)
    }

    /// Reads the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::NotFound` when no object exists, `FilesError::Io` otherwise.
    pub fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, FilesError> {
        match fs::read(self.object_path(key)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FilesError::NotFound(key.to_string()))
            }
            Err(e) => Err(FilesError::Io(e)),
        }
    }

    /// Reads the metadata record for `key`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::NotFound` when no object exists.
    pub fn metadata(&self, key: &ObjectKey) -> Result<ObjectMetadata, FilesError> {
        match fs::read(self.metadata_path(key)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FilesError::NotFound(key.to_string()))
            }
            Err(e) => Err(FilesError::Io(e)),
        }
    }

    pub fn exists(&self, key: &ObjectKey) -> bool {
        self.object_path(key).is_file()
    }

    /// Builds a read link for `key` valid for `ttl` from `now`.
    ///
    /// The object does not have to exist yet; the link simply fails with 404 until it does.
    pub fn presign(&self, key: &ObjectKey, ttl: Duration, now: DateTime<Utc>) -> PresignedUrl {
        let expires_at = now + ttl;
        let expires = expires_at.timestamp();
        let signature = presign::sign(&self.link_key, key, expires);
        PresignedUrl {
            url: format!(
                "{}/{}/{}?expires={}&signature={}",
                self.url_base, READ_ROUTE_PREFIX, key, expires, signature
            ),
            expires_at,
            expires_in_seconds: ttl.num_seconds(),
        }
    }

    /// Checks a presigned link's parameters.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::LinkSignatureInvalid` when the signature does not match the key
    /// and expiry, and `FilesError::LinkExpired` when it does but `now` is past the expiry.
    pub fn verify_presigned(
        &self,
        key: &ObjectKey,
        expires: i64,
        signature_hex: &str,
        now: DateTime<Utc>,
    ) -> Result<(), FilesError> {
        presign::verify(&self.link_key, key, expires, signature_hex, now)
    }

    fn object_path(&self, key: &ObjectKey) -> PathBuf {
        self.root.join(OBJECTS_FOLDER_NAME).join(key.relative_path())
    }

    fn metadata_path(&self, key: &ObjectKey) -> PathBuf {
        let mut path = self.root.join(METADATA_FOLDER_NAME).join(key.relative_path());
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".json");
        path.set_file_name(name);
        path
    }
}

/// Writes through a unique temporary sibling, then renames over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FilesError> {
    let parent = path.parent().ok_or_else(|| {
        FilesError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Path has no parent directory: {}", path.display()),
        ))
    })?;
    fs::create_dir_all(parent).map_err(|e| {
        FilesError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create directory {}: {}", parent.display(), e),
        ))
    })?;

    let tmp = parent.join(format!(
        ".tmp-{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, bytes).map_err(|e| {
        FilesError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write file to {}: {}", tmp.display(), e),
        ))
    })?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(FilesError::Io(e));
    }
    Ok(())
}
