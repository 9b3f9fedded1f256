//! # VPR Certificates
//!
//! Certificate handling for the document signing pipeline.
//!
//! - [`extract_metadata`] reads subject, issuer and serial number from a signer's PEM certificate.
//! - [`ocsp_responder_uri`] locates the OCSP responder advertised in the certificate's
//!   Authority Information Access extension.
//! - [`split_pem_chain`] normalises a certificate chain supplied either as separate PEM strings
//!   or as one concatenated bundle.
//! - [`issue`] creates professional signing certificates (and a small issuing authority) for
//!   demos and tests.
//!
//! Parsing here is advisory. Callers in the signing flow treat every [`CertificateError`] as
//! "metadata unavailable", never as a reason to reject a signature.

pub mod issue;
mod metadata;

pub use metadata::{
    extract_metadata, ocsp_responder_uri, split_pem_chain, CertificateMetadata,
};

/// Errors raised while parsing or creating certificates.
#[derive(thiserror::Error, Debug)]
pub enum CertificateError {
    /// The input was not a PEM-encoded X.509 certificate.
    #[error("failed to parse certificate: {0}")]
    Parse(String),

    /// A PEM bundle contained no certificates.
    #[error("certificate chain is empty")]
    EmptyChain,

    /// Certificate generation failed.
    #[error("failed to generate certificate: {0}")]
    GenerationError(String),
}
