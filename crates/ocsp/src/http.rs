use crate::request::OcspTarget;
use crate::{response, OcspClient, OcspError, OcspStatus};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};

const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
const OCSP_RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

/// Responses larger than this are not read.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// [`OcspClient`] that POSTs DER requests to the responder.
#[derive(Debug, Clone)]
pub struct HttpOcspClient {
    client: reqwest::Client,
    max_response_age: Duration,
}

impl HttpOcspClient {
    /// Creates a client whose every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`OcspError::Unreachable`] if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, OcspError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OcspError::Unreachable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_response_age: response::DEFAULT_MAX_RESPONSE_AGE,
        })
    }

    /// Rejects responses whose `thisUpdate` is older than `max_age`.
    pub fn with_max_response_age(mut self, max_age: Duration) -> Self {
        self.max_response_age = max_age;
        self
    }
}

async fn read_capped(mut reply: reqwest::Response) -> Result<Vec<u8>, OcspError> {
    let too_large =
        || OcspError::Protocol(format!("response exceeds {MAX_RESPONSE_BYTES} bytes"));
    if reply
        .content_length()
        .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
    {
        return Err(too_large());
    }
    let mut body = Vec::new();
    while let Some(chunk) = reply.chunk().await.map_err(transport_error)? {
        if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn transport_error(e: reqwest::Error) -> OcspError {
    if e.is_timeout() {
        OcspError::TimedOut
    } else {
        OcspError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl OcspClient for HttpOcspClient {
    async fn check(
        &self,
        responder_url: &str,
        subject_pem: &str,
        issuer_pem: Option<&str>,
    ) -> Result<OcspStatus, OcspError> {
        let target = OcspTarget::new(subject_pem, issuer_pem)?;
        let body = target.to_request_der()?;

        let reply = self
            .client
            .post(responder_url)
            .header(reqwest::header::CONTENT_TYPE, OCSP_REQUEST_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, OCSP_RESPONSE_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = reply.status();
        if !status.is_success() {
            return Err(OcspError::Unreachable(format!(
                "responder answered HTTP {status}"
            )));
        }
        let bytes = read_capped(reply).await?;

        let verdict =
            response::evaluate_at(&target, &bytes, SystemTime::now(), self.max_response_age)?;
        tracing::debug!(responder = responder_url, ?verdict, "OCSP verdict");
        Ok(verdict)
    }
}
