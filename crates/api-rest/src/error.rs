use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use vpr_core::{ErrorCode, SigningError};

use crate::dto::ErrorRes;

/// A pipeline error rendered as `{"error": CODE, "message": text}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Mapping for the callback route, where a state conflict is `409`.
    pub fn callback(err: SigningError) -> Self {
        let mut api = Self::from(err);
        if api.code == ErrorCode::AlreadySigned {
            api.status = StatusCode::CONFLICT;
        }
        api
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ConfigurationError | ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::MissingIdempotencyKey
        | ErrorCode::DuplicateCallback
        | ErrorCode::SigningInProgress => StatusCode::CONFLICT,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::AlreadySigned | ErrorCode::NotSigned | ErrorCode::InvalidPayload => {
            StatusCode::BAD_REQUEST
        }
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SigningError> for ApiError {
    fn from(err: SigningError) -> Self {
        let code = err.code();
        let message = if code == ErrorCode::Internal {
            tracing::error!("internal error: {}", err);
            "Internal error".to_string()
        } else {
            err.to_string()
        };
        Self::new(status_for(code), code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorRes {
            error: self.code.as_str().to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpr_core::StoreError;
    use vpr_types::DocumentId;

    #[test]
    fn status_codes_follow_error_codes() {
        let cases = [
            (SigningError::Unauthorized, StatusCode::UNAUTHORIZED),
            (SigningError::MissingWebhookSecret, StatusCode::UNAUTHORIZED),
            (SigningError::MissingIdempotencyKey, StatusCode::CONFLICT),
            (SigningError::DuplicateCallback, StatusCode::CONFLICT),
            (SigningError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (SigningError::AlreadySigned(DocumentId::new()), StatusCode::BAD_REQUEST),
            (SigningError::NotSigned(DocumentId::new()), StatusCode::BAD_REQUEST),
            (
                SigningError::from(StoreError::Backend("disk".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn already_signed_is_a_conflict_on_callbacks() {
        let err = ApiError::callback(SigningError::AlreadySigned(DocumentId::new()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_details_are_not_echoed() {
        let err = ApiError::from(SigningError::from(StoreError::Backend(
            "/var/lib/secret-path".into(),
        )));
        assert_eq!(err.message, "Internal error");
    }
}
