use serde::{Deserialize, Serialize};
use vpr_types::DocumentId;

/// Stable, client-visible error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConfigurationError,
    Unauthorized,
    MissingIdempotencyKey,
    DuplicateCallback,
    NotFound,
    AlreadySigned,
    NotSigned,
    SigningInProgress,
    InvalidPayload,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::MissingIdempotencyKey => "MISSING_IDEMPOTENCY_KEY",
            ErrorCode::DuplicateCallback => "DUPLICATE_CALLBACK",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadySigned => "ALREADY_SIGNED",
            ErrorCode::NotSigned => "NOT_SIGNED",
            ErrorCode::SigningInProgress => "SIGNING_IN_PROGRESS",
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the storage collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("object store error: {0}")]
    Files(#[from] vpr_files::FilesError),
    #[error("storage task failed: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("webhook secret is not configured")]
    MissingWebhookSecret,
    #[error("webhook signature is missing or does not match")]
    Unauthorized,
    #[error("a usable Idempotency-Key header is required")]
    MissingIdempotencyKey,
    #[error("callback with this idempotency key was already processed")]
    DuplicateCallback,
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document {0} is already signed")]
    AlreadySigned(DocumentId),
    #[error("document {0} is not signed")]
    NotSigned(DocumentId),
    #[error("document {0} is being signed by another callback")]
    SigningInProgress(DocumentId),
    #[error("invalid callback payload: {0}")]
    InvalidPayload(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to download artifact: {0}")]
    Download(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SigningError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SigningError::MissingWebhookSecret => ErrorCode::ConfigurationError,
            SigningError::Unauthorized => ErrorCode::Unauthorized,
            SigningError::MissingIdempotencyKey => ErrorCode::MissingIdempotencyKey,
            SigningError::DuplicateCallback => ErrorCode::DuplicateCallback,
            SigningError::NotFound(_) => ErrorCode::NotFound,
            SigningError::AlreadySigned(_) => ErrorCode::AlreadySigned,
            SigningError::NotSigned(_) => ErrorCode::NotSigned,
            SigningError::SigningInProgress(_) => ErrorCode::SigningInProgress,
            SigningError::InvalidPayload(_) => ErrorCode::InvalidPayload,
            SigningError::InvalidConfig(_)
            | SigningError::Download(_)
            | SigningError::Store(_) => ErrorCode::Internal,
        }
    }
}

pub type SigningResult<T> = std::result::Result<T, SigningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_serialize_as_screaming_snake_case() {
        for code in [
            ErrorCode::ConfigurationError,
            ErrorCode::MissingIdempotencyKey,
            ErrorCode::SigningInProgress,
            ErrorCode::Internal,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn infrastructure_failures_are_internal() {
        let err = SigningError::from(StoreError::Backend("boom".into()));
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(SigningError::Download("x".into()).code(), ErrorCode::Internal);
        assert_eq!(
            SigningError::MissingWebhookSecret.code(),
            ErrorCode::ConfigurationError
        );
    }
}
