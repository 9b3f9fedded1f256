//! Signer certificate inspection.
//!
//! Only the handful of fields the signing pipeline records are extracted: the human-readable
//! subject and issuer distinguished names, the serial number, and the OCSP responder URI.

use crate::CertificateError;
use serde::{Deserialize, Serialize};
use x509_parser::prelude::*;

/// `id-ad-ocsp` access method in the Authority Information Access extension (RFC 5280 4.2.2.1).
const ACCESS_METHOD_OCSP: &str = "1.3.6.1.5.5.7.48.1";

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Identity fields read from a signer certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    /// Subject distinguished name, e.g. `CN=Dr Jane Smith, O=GMC`.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Serial number as uppercase hexadecimal without separators.
    pub serial_number: String,
}

fn with_parsed<T>(
    pem_text: &str,
    f: impl FnOnce(&X509Certificate<'_>) -> T,
) -> Result<T, CertificateError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem_text.as_bytes())
        .map_err(|e| CertificateError::Parse(e.to_string()))?;
    if pem.label != CERTIFICATE_LABEL {
        return Err(CertificateError::Parse(format!(
            "expected a {CERTIFICATE_LABEL} PEM block, found {}",
            pem.label
        )));
    }
    let cert = pem
        .parse_x509()
        .map_err(|e| CertificateError::Parse(e.to_string()))?;
    Ok(f(&cert))
}

/// Extracts subject, issuer and serial number from a PEM certificate.
///
/// # Errors
///
/// Returns [`CertificateError::Parse`] if the input is not a PEM `CERTIFICATE` block or the
/// DER inside it is not a valid X.509 certificate.
pub fn extract_metadata(pem_text: &str) -> Result<CertificateMetadata, CertificateError> {
    with_parsed(pem_text, |cert| CertificateMetadata {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial_number: cert.tbs_certificate.serial.to_str_radix(16).to_uppercase(),
    })
}

/// Returns the OCSP responder URI from the certificate's AIA extension.
///
/// `None` covers every "no usable responder" case: unparsable certificate, no AIA extension,
/// no OCSP access description, or a location that is not a URI.
pub fn ocsp_responder_uri(pem_text: &str) -> Option<String> {
    let found = with_parsed(pem_text, |cert| {
        cert.extensions().iter().find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::AuthorityInfoAccess(aia) => {
                aia.accessdescs.iter().find_map(|desc| {
                    if desc.access_method.to_id_string() != ACCESS_METHOD_OCSP {
                        return None;
                    }
                    match &desc.access_location {
                        GeneralName::URI(uri) => Some(uri.to_string()),
                        _ => None,
                    }
                })
            }
            _ => None,
        })
    });

    match found {
        Ok(uri) => uri,
        Err(e) => {
            tracing::debug!("cannot read OCSP responder from certificate: {}", e);
            None
        }
    }
}

/// Splits a PEM bundle into individual certificates, preserving order.
///
/// Non-certificate blocks (keys, CRLs) are skipped. Each certificate is re-encoded with LF line
/// endings so equal certificates always produce equal strings.
///
/// # Errors
///
/// Returns [`CertificateError::Parse`] for malformed PEM and [`CertificateError::EmptyChain`]
/// when no certificate block is present.
pub fn split_pem_chain(bundle: &str) -> Result<Vec<String>, CertificateError> {
    // `x509_parser::prelude` brings its own `pem` module into scope.
    let blocks =
        ::pem::parse_many(bundle).map_err(|e| CertificateError::Parse(e.to_string()))?;
    let config = ::pem::EncodeConfig {
        line_ending: ::pem::LineEnding::LF,
    };
    let chain: Vec<String> = blocks
        .iter()
        .filter(|block| block.tag == CERTIFICATE_LABEL)
        .map(|block| ::pem::encode_config(block, config))
        .collect();

    if chain.is_empty() {
        return Err(CertificateError::EmptyChain);
    }
    Ok(chain)
}
