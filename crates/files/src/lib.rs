//! VPR Object Storage
//!
//! This crate provides the document store used by the VPR signing pipeline: unsigned PDFs
//! and the signed artifacts produced from them are kept here, addressed by an [`ObjectKey`].
//!
//! ## Design Principles
//!
//! - Objects are addressed by validated, relative keys (`prescriptions/2024/rx-1.pdf`)
//! - Keys can never escape the store root
//! - Bytes and metadata are stored side by side but in separate trees
//! - Writes are atomic: readers see the old object or the new one, never a partial file
//! - Read access for third parties is granted through short-lived, HMAC-signed links
//!
//! ## Storage Layout
//!
//! ```text
//! <root>/
//! ├── objects/
//! │   └── prescriptions/
//! │       └── rx-1.pdf
//! └── meta/
//!     └── prescriptions/
//!         └── rx-1.pdf.json
//! ```
//!
//! ## Presigned Links
//!
//! [`ObjectStore::presign`] produces `{url_base}/files/{key}?expires={unix}&signature={hex}`
//! where the signature is HMAC-SHA256 over `"{key}\n{expires}"`. The HTTP layer hands the
//! query parameters back to [`ObjectStore::verify_presigned`] before serving bytes.
//!
//! ## Example Usage
//!
//! ```no_run
//! use vpr_files::{ObjectKey, ObjectStore};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ObjectStore::new(Path::new("signing_data"), "http://localhost:3000", b"key".to_vec())?;
//! let key = ObjectKey::parse("prescriptions/rx-1.pdf")?;
//! store.put(&key, b"%PDF-1.7", "application/pdf")?;
//! let link = store.presign(&key, chrono::Duration::seconds(300), chrono::Utc::now());
//! println!("{}", link.url);
//! # Ok(())
//! # }
//! ```

mod constants;
mod key;
mod presign;
mod store;

pub use constants::{MAX_KEY_LEN, READ_ROUTE_PREFIX};
pub use key::ObjectKey;
pub use presign::PresignedUrl;
pub use store::{ObjectMetadata, ObjectStore};

/// Errors that can occur during object storage operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Object key failed validation (empty, absolute, traversal, bad characters)
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// The presigned-link signing key was rejected
    #[error("Invalid presigned link signing key")]
    InvalidSigningKey,

    /// No object is stored under the key
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The presigned link is past its expiry time
    #[error("Presigned link has expired")]
    LinkExpired,

    /// The presigned link signature does not match
    #[error("Presigned link signature is invalid")]
    LinkSignatureInvalid,

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be encoded or decoded
    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
