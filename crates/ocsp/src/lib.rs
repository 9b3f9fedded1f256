//! # VPR OCSP
//!
//! Online Certificate Status Protocol (RFC 6960) client used to revalidate signer
//! certificates after a document has been signed.
//!
//! The crate is split along the protocol:
//! - [`request`]: builds the `CertID` and DER-encoded `OCSPRequest` for a certificate.
//! - [`response`]: decodes an `OCSPResponse`, verifies its signature and extracts the status
//!   for the requested certificate.
//! - [`HttpOcspClient`]: sends the request over HTTP POST and ties the two together.
//!
//! Callers depend on the [`OcspClient`] trait so tests can substitute a fake. Every failure is
//! reported as an [`OcspError`] whose [`OcspError::class`] names the failure family for
//! structured logging; deciding what a failure means for the certificate is the caller's job.

mod http;
pub mod request;
pub mod response;
#[cfg(test)]
mod testing;
mod verify;

pub use http::{HttpOcspClient, MAX_RESPONSE_BYTES};
pub use response::DEFAULT_MAX_RESPONSE_AGE;
pub use request::OcspTarget;

use async_trait::async_trait;

/// Verdict returned by a responder for one certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspStatus {
    Good,
    Revoked,
    Unknown,
}

/// Failure to obtain a verified verdict.
#[derive(thiserror::Error, Debug)]
pub enum OcspError {
    /// A certificate handed to the client could not be parsed or lacks required data.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// The responder could not be reached or answered with a non-success HTTP status.
    #[error("OCSP responder unreachable: {0}")]
    Unreachable(String),

    /// The responder did not answer in time.
    #[error("OCSP request timed out")]
    TimedOut,

    /// The response was malformed, unsuccessful, stale, or did not cover the requested certificate.
    #[error("OCSP protocol error: {0}")]
    Protocol(String),

    /// The response signature or the responder certificate failed verification.
    #[error("OCSP response verification failed: {0}")]
    Verification(String),
}

impl OcspError {
    /// Short, stable name of the failure family, used as a log field.
    pub fn class(&self) -> &'static str {
        match self {
            OcspError::InvalidCertificate(_) | OcspError::Protocol(_) => "protocol",
            OcspError::Unreachable(_) => "unreachable",
            OcspError::TimedOut => "timed_out",
            OcspError::Verification(_) => "verification",
        }
    }
}

/// Queries an OCSP responder about one certificate.
#[async_trait]
pub trait OcspClient: Send + Sync {
    /// Asks `responder_url` for the status of `subject_pem`.
    ///
    /// `issuer_pem` is the certificate that issued the subject, when known. It supplies the
    /// issuer key hash of the request and the trust anchor for the response: its own key, or a
    /// delegated responder it signed for OCSP. Without it the request is still built from the
    /// subject's Authority Key Identifier, but no response can be trusted and the check fails
    /// with [`OcspError::Verification`].
    ///
    /// # Errors
    ///
    /// Returns an [`OcspError`] whenever no verified verdict could be obtained.
    async fn check(
        &self,
        responder_url: &str,
        subject_pem: &str,
        issuer_pem: Option<&str>,
    ) -> Result<OcspStatus, OcspError>;
}
