//! Route handlers for the signing API.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path as AxumPath, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;
use vpr_core::{CallbackHeaders, ErrorCode, RequestContext};
use vpr_files::{FilesError, ObjectKey};

use crate::dto::{
    AuditEventRes, AuditTrailRes, CallbackAckRes, CallbackReq, ErrorRes, HealthRes,
    RevalidateRes, SignatureStatusRes, SignedUrlRes, SigningRequestRes,
};
use crate::error::ApiError;
use crate::AppState;

/// Header carrying the hex HMAC-SHA256 of the raw callback body.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Header carrying the signer's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Caller IP (first `X-Forwarded-For` entry, else the peer address) and user agent.
pub(crate) fn request_context(headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestContext {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned);
    RequestContext {
        requester_ip: forwarded.or_else(|| peer.map(|addr| addr.ip().to_string())),
        user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_owned),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "VPR signing API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/signatures/{id}/request",
    params(("id" = String, Path, description = "Document identifier")),
    responses(
        (status = 200, description = "Digest to sign and callback URL", body = SigningRequestRes),
        (status = 400, description = "Document is already signed", body = ErrorRes),
        (status = 404, description = "Unknown document", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Start a signing round for a document
///
/// Hashes the unsigned PDF and returns the digest together with the callback URL the signer
/// must deliver the signature to. Every call is audited.
///
/// # Errors
/// Returns `404` for an unknown document and `400` if it is already signed.
#[axum::debug_handler]
pub async fn request_signature(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Json<SigningRequestRes>, ApiError> {
    let ctx = request_context(&headers, connect.map(|ConnectInfo(addr)| addr));
    let request = state.service.request_signature(&id, &ctx).await?;
    Ok(Json(request.into()))
}

#[utoipa::path(
    post,
    path = "/signatures/{id}/callback",
    params(
        ("id" = String, Path, description = "Document identifier"),
        ("X-Signature" = String, Header, description = "Hex HMAC-SHA256 of the raw body"),
        ("Idempotency-Key" = String, Header, description = "Unique key per delivery")
    ),
    request_body = CallbackReq,
    responses(
        (status = 200, description = "Signature accepted", body = CallbackAckRes),
        (status = 400, description = "Malformed payload", body = ErrorRes),
        (status = 401, description = "Bad webhook signature or secret not configured", body = ErrorRes),
        (status = 404, description = "Unknown document", body = ErrorRes),
        (status = 409, description = "Missing or replayed idempotency key, or already signed", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Receive a signature from the signing provider
///
/// The body is authenticated over its exact bytes, so it is taken raw and only parsed after
/// the HMAC matches.
///
/// # Errors
/// Returns `401` when the HMAC does not verify, `409` for a missing or replayed idempotency
/// key or an already-signed document, `400` for a malformed payload and `404` for an unknown
/// document.
#[axum::debug_handler]
pub async fn signature_callback(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackAckRes>, ApiError> {
    let ctx = request_context(&headers, connect.map(|ConnectInfo(addr)| addr));
    let callback_headers = CallbackHeaders {
        signature: header_str(&headers, SIGNATURE_HEADER),
        idempotency_key: header_str(&headers, IDEMPOTENCY_KEY_HEADER),
    };
    let ack = state
        .service
        .handle_callback(&id, &body, callback_headers, &ctx)
        .await
        .map_err(ApiError::callback)?;
    Ok(Json(ack.into()))
}

#[utoipa::path(
    get,
    path = "/signatures/{id}/url",
    params(("id" = String, Path, description = "Document identifier")),
    responses(
        (status = 200, description = "Short-lived read URL of the signed artifact", body = SignedUrlRes),
        (status = 400, description = "Document is not signed", body = ErrorRes),
        (status = 404, description = "Unknown document", body = ErrorRes)
    )
)]
/// Get a short-lived download URL for the signed artifact
#[axum::debug_handler]
pub async fn signed_url(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<SignedUrlRes>, ApiError> {
    let url = state.service.signed_url(&id).await?;
    Ok(Json(url.into()))
}

#[utoipa::path(
    get,
    path = "/signatures/{id}",
    params(("id" = String, Path, description = "Document identifier")),
    responses(
        (status = 200, description = "Signature and certificate status", body = SignatureStatusRes),
        (status = 404, description = "Unknown document", body = ErrorRes)
    )
)]
/// Read the signature state of a document
#[axum::debug_handler]
pub async fn signature_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<SignatureStatusRes>, ApiError> {
    let summary = state.service.status(&id).await?;
    Ok(Json(summary.into()))
}

#[utoipa::path(
    get,
    path = "/signatures/{id}/audit",
    params(("id" = String, Path, description = "Document identifier")),
    responses(
        (status = 200, description = "Audit events, oldest first", body = AuditTrailRes),
        (status = 404, description = "Unknown document", body = ErrorRes)
    )
)]
/// List the protocol audit trail of a document
#[axum::debug_handler]
pub async fn audit_trail(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<AuditTrailRes>, ApiError> {
    let events = state.service.audit_events(&id).await?;
    Ok(Json(AuditTrailRes {
        events: events.into_iter().map(AuditEventRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/signatures/{id}/revalidate",
    params(("id" = String, Path, description = "Document identifier")),
    responses(
        (status = 200, description = "Certificate status after an OCSP check", body = RevalidateRes),
        (status = 400, description = "Document is not signed", body = ErrorRes),
        (status = 404, description = "Unknown document", body = ErrorRes)
    )
)]
/// Re-check the signer certificate over OCSP now
///
/// Responder failures are reported as `UNKNOWN`, never as errors.
#[axum::debug_handler]
pub async fn revalidate(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<RevalidateRes>, ApiError> {
    let outcome = state.service.revalidate(&id).await?;
    Ok(Json(outcome.into()))
}

/// Query parameters of a presigned read link.
#[derive(Debug, Deserialize)]
pub struct ReadLinkQuery {
    expires: Option<String>,
    signature: Option<String>,
}

fn files_error(err: FilesError) -> ApiError {
    match err {
        FilesError::NotFound(_) | FilesError::InvalidKey(_) => {
            ApiError::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Object not found")
        }
        FilesError::LinkExpired | FilesError::LinkSignatureInvalid => {
            ApiError::new(StatusCode::FORBIDDEN, ErrorCode::Unauthorized, err.to_string())
        }
        other => {
            tracing::error!("object read failed: {}", other);
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::Internal,
                "Internal error",
            )
        }
    }
}

#[utoipa::path(
    get,
    path = "/files/{key}",
    params(
        ("key" = String, Path, description = "Object key"),
        ("expires" = i64, Query, description = "Link expiry, seconds since the epoch"),
        ("signature" = String, Query, description = "Link signature")
    ),
    responses(
        (status = 200, description = "Object bytes"),
        (status = 403, description = "Link expired or signature invalid", body = ErrorRes),
        (status = 404, description = "Object not found", body = ErrorRes)
    )
)]
/// Serve an object through a presigned read link
///
/// # Errors
/// Returns `403` for a missing, tampered or expired link and `404` if the object is absent.
#[axum::debug_handler]
pub async fn read_object(
    State(state): State<AppState>,
    AxumPath(key): AxumPath<String>,
    Query(query): Query<ReadLinkQuery>,
) -> Result<Response, ApiError> {
    let key = ObjectKey::parse(&key).map_err(files_error)?;
    let (Some(expires), Some(signature)) = (
        query.expires.and_then(|e| e.trim().parse::<i64>().ok()),
        query.signature,
    ) else {
        return Err(files_error(FilesError::LinkSignatureInvalid));
    };

    let files = state.files.clone();
    let (content_type, bytes) = tokio::task::spawn_blocking(move || {
        files.verify_presigned(&key, expires, &signature, Utc::now())?;
        let metadata = files.metadata(&key)?;
        let bytes = files.get(&key)?;
        Ok::<_, FilesError>((metadata.content_type, bytes))
    })
    .await
    .map_err(|e| {
        tracing::error!("object read task failed: {}", e);
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Internal,
            "Internal error",
        )
    })?
    .map_err(files_error)?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_precedence_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("signer/1.0"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        let ctx = request_context(&headers, Some(peer));
        assert_eq!(ctx.requester_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("signer/1.0"));
    }

    #[test]
    fn peer_address_is_the_fallback() {
        let peer: SocketAddr = "192.0.2.1:443".parse().unwrap();
        let ctx = request_context(&HeaderMap::new(), Some(peer));
        assert_eq!(ctx.requester_ip.as_deref(), Some("192.0.2.1"));
        assert_eq!(ctx.user_agent, None);
        assert_eq!(request_context(&HeaderMap::new(), None), RequestContext::default());
    }
}
