//! Constants used throughout the VPR signing core.
//!
//! Path, filename, content-type and default-configuration values live here so the stores,
//! the pipeline and the binaries agree on them.

use std::time::Duration;

/// Default directory for signing data when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "signing_data";

/// Default base URL used for callback and read URLs.
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";

/// Directory (under the data directory) holding JSON records.
pub const RECORDS_DIR_NAME: &str = "records";

/// Directory (under records) holding one sharded folder per document.
pub const DOCUMENTS_DIR_NAME: &str = "documents";

/// Directory (under records) holding one append-only JSONL file per document.
pub const AUDIT_DIR_NAME: &str = "audit";

/// Directory (under records) holding one marker file per claimed idempotency key.
pub const IDEMPOTENCY_DIR_NAME: &str = "idempotency";

/// Filename for document JSON files.
pub const DOCUMENT_JSON_FILENAME: &str = "document.json";

/// Marker file held next to `document.json` while a signature is being stored.
pub const SIGNING_LEASE_FILENAME: &str = "signing.lease";

/// Age after which a signing lease left by a crashed writer may be broken.
pub const SIGNING_LEASE_TTL: Duration = Duration::from_secs(10 * 60);

/// Suffix of per-document audit files.
pub const AUDIT_FILE_SUFFIX: &str = ".jsonl";

/// Content type of unsigned and PAdES-signed documents.
pub const CONTENT_TYPE_PDF: &str = "application/pdf";

/// Content type of detached CMS signatures.
pub const CONTENT_TYPE_CMS: &str = "application/pkcs7-signature";

/// Content type of RFC 3161 timestamp tokens.
pub const CONTENT_TYPE_TIMESTAMP: &str = "application/timestamp-reply";

/// Suffix replacing `.pdf` for embedded signatures.
pub const EMBEDDED_SIGNED_SUFFIX: &str = ".signed.pdf";

/// Suffix appended for detached signatures.
pub const DETACHED_SIGNATURE_SUFFIX: &str = ".p7s";

/// Suffix appended to a detached signature key for its timestamp token.
pub const TIMESTAMP_TOKEN_SUFFIX: &str = ".tsr";

/// Optional prefix accepted on the webhook signature header.
pub const WEBHOOK_SIGNATURE_PREFIX: &str = "sha256=";

pub const DEFAULT_READ_URL_TTL: Duration = Duration::from_secs(300);

pub const DEFAULT_OCSP_TIMEOUT: Duration = Duration::from_secs(10);

/// Revalidation runs every 12 hours.
pub const DEFAULT_REVALIDATE_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

pub const DEFAULT_REVALIDATE_BATCH_SIZE: usize = 50;

/// Certificates validated longer ago than this are due for revalidation.
pub const DEFAULT_REVALIDATE_STALE_DAYS: i64 = 7;
