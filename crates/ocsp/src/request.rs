//! OCSP request construction.

use crate::OcspError;
use const_oid::db::rfc5912::{ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_SHA_1};
use der::asn1::OctetString;
use der::{Decode, DecodePem, Encode};
use sha1::{Digest, Sha1};
use x509_cert::ext::pkix::AuthorityKeyIdentifier;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;
use x509_ocsp::{CertId, OcspRequest, Request, TbsRequest, Version};

/// The certificate being asked about, with the issuer context needed to verify the answer.
#[derive(Debug, Clone)]
pub struct OcspTarget {
    pub(crate) cert_id: CertId,
    pub(crate) issuer: Option<Certificate>,
}

impl OcspTarget {
    /// Builds a SHA-1 `CertID` for `subject_pem`.
    ///
    /// # Errors
    ///
    /// Returns [`OcspError::InvalidCertificate`] when a PEM does not parse, or when no issuer
    /// is given and the subject carries no Authority Key Identifier.
    pub fn new(subject_pem: &str, issuer_pem: Option<&str>) -> Result<Self, OcspError> {
        let subject = parse_pem(subject_pem)?;
        let issuer = issuer_pem.map(parse_pem).transpose()?;

        let name_der = subject
            .tbs_certificate
            .issuer
            .to_der()
            .map_err(|e| OcspError::InvalidCertificate(e.to_string()))?;

        let key_hash = match &issuer {
            Some(issuer) => Sha1::digest(
                issuer
                    .tbs_certificate
                    .subject_public_key_info
                    .subject_public_key
                    .raw_bytes(),
            )
            .to_vec(),
            None => authority_key_id(&subject)?.ok_or_else(|| {
                OcspError::InvalidCertificate(
                    "no issuer certificate and no authority key identifier".into(),
                )
            })?,
        };

        let cert_id = CertId {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: ID_SHA_1,
                parameters: None,
            },
            issuer_name_hash: octets(Sha1::digest(&name_der).to_vec())?,
            issuer_key_hash: octets(key_hash)?,
            serial_number: subject.tbs_certificate.serial_number.clone(),
        };

        Ok(Self { cert_id, issuer })
    }

    /// DER-encoded, unsigned `OCSPRequest` for this target.
    pub fn to_request_der(&self) -> Result<Vec<u8>, OcspError> {
        let request = OcspRequest {
            tbs_request: TbsRequest {
                version: Version::V1,
                requestor_name: None,
                request_list: vec![Request {
                    req_cert: self.cert_id.clone(),
                    single_request_extensions: None,
                }],
                request_extensions: None,
            },
            optional_signature: None,
        };
        request
            .to_der()
            .map_err(|e| OcspError::Protocol(format!("cannot encode request: {e}")))
    }

    pub fn cert_id(&self) -> &CertId {
        &self.cert_id
    }
}

pub(crate) fn parse_pem(pem: &str) -> Result<Certificate, OcspError> {
    Certificate::from_pem(pem.trim().as_bytes())
        .map_err(|e| OcspError::InvalidCertificate(e.to_string()))
}

fn octets(bytes: Vec<u8>) -> Result<OctetString, OcspError> {
    OctetString::new(bytes).map_err(|e| OcspError::InvalidCertificate(e.to_string()))
}

fn authority_key_id(cert: &Certificate) -> Result<Option<Vec<u8>>, OcspError> {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(None);
    };
    let Some(ext) = extensions
        .iter()
        .find(|ext| ext.extn_id == ID_CE_AUTHORITY_KEY_IDENTIFIER)
    else {
        return Ok(None);
    };
    let aki = AuthorityKeyIdentifier::from_der(ext.extn_value.as_bytes())
        .map_err(|e| OcspError::InvalidCertificate(e.to_string()))?;
    Ok(aki.key_identifier.map(|id| id.as_bytes().to_vec()))
}
