//! Signature checks for OCSP responses and delegated responder certificates.

use crate::OcspError;
use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ID_CE_EXT_KEY_USAGE, ID_KP_OCSP_SIGNING,
    SECP_256_R_1, SECP_384_R_1, SHA_1_WITH_RSA_ENCRYPTION, SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION,
    SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::db::rfc8410::ID_ED_25519;
use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use x509_cert::ext::pkix::ExtendedKeyUsage;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::Certificate;

fn named_curve(spki: &SubjectPublicKeyInfoOwned) -> Option<ObjectIdentifier> {
    spki.algorithm
        .parameters
        .as_ref()
        .and_then(|params| params.decode_as::<ObjectIdentifier>().ok())
}

fn ring_algorithm(
    signature_algorithm: &AlgorithmIdentifierOwned,
    spki: &SubjectPublicKeyInfoOwned,
) -> Result<&'static dyn VerificationAlgorithm, OcspError> {
    let oid = signature_algorithm.oid;
    let algorithm: &'static dyn VerificationAlgorithm = if oid == SHA_1_WITH_RSA_ENCRYPTION {
        &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY
    } else if oid == SHA_256_WITH_RSA_ENCRYPTION {
        &signature::RSA_PKCS1_2048_8192_SHA256
    } else if oid == SHA_384_WITH_RSA_ENCRYPTION {
        &signature::RSA_PKCS1_2048_8192_SHA384
    } else if oid == SHA_512_WITH_RSA_ENCRYPTION {
        &signature::RSA_PKCS1_2048_8192_SHA512
    } else if oid == ECDSA_WITH_SHA_256 || oid == ECDSA_WITH_SHA_384 {
        let curve = named_curve(spki);
        match (oid == ECDSA_WITH_SHA_256, curve) {
            (true, Some(c)) if c == SECP_256_R_1 => &signature::ECDSA_P256_SHA256_ASN1,
            (true, Some(c)) if c == SECP_384_R_1 => &signature::ECDSA_P384_SHA256_ASN1,
            (false, Some(c)) if c == SECP_256_R_1 => &signature::ECDSA_P256_SHA384_ASN1,
            (false, Some(c)) if c == SECP_384_R_1 => &signature::ECDSA_P384_SHA384_ASN1,
            _ => {
                return Err(OcspError::Verification(format!(
                    "unsupported ECDSA curve {curve:?}"
                )))
            }
        }
    } else if oid == ID_ED_25519 {
        &signature::ED25519
    } else {
        return Err(OcspError::Verification(format!(
            "unsupported signature algorithm {oid}"
        )));
    };
    Ok(algorithm)
}

/// Verifies `signature` over `message` with the key in `spki`.
pub(crate) fn verify_signature(
    spki: &SubjectPublicKeyInfoOwned,
    signature_algorithm: &AlgorithmIdentifierOwned,
    message: &[u8],
    signature: &[u8],
) -> Result<(), OcspError> {
    let algorithm = ring_algorithm(signature_algorithm, spki)?;
    UnparsedPublicKey::new(algorithm, spki.subject_public_key.raw_bytes())
        .verify(message, signature)
        .map_err(|_| OcspError::Verification("signature does not match".into()))
}

/// Checks that `issuer` issued and signed `cert`.
pub(crate) fn verify_issued_by(cert: &Certificate, issuer: &Certificate) -> Result<(), OcspError> {
    if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return Err(OcspError::Verification(
            "responder certificate was not issued by the certificate issuer".into(),
        ));
    }
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| OcspError::Verification(e.to_string()))?;
    verify_signature(
        &issuer.tbs_certificate.subject_public_key_info,
        &cert.signature_algorithm,
        &tbs,
        cert.signature.raw_bytes(),
    )
}

/// Checks that `cert` may answer OCSP requests on behalf of `issuer`: signed by it and
/// carrying `id-kp-OCSPSigning` (RFC 6960 section 4.2.2.2).
pub(crate) fn verify_delegated_responder(
    cert: &Certificate,
    issuer: &Certificate,
) -> Result<(), OcspError> {
    verify_issued_by(cert, issuer)?;

    let ext = cert
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .find(|ext| ext.extn_id == ID_CE_EXT_KEY_USAGE)
        .ok_or_else(|| {
            OcspError::Verification("responder certificate has no extended key usage".into())
        })?;
    let purposes = ExtendedKeyUsage::from_der(ext.extn_value.as_bytes())
        .map_err(|e| OcspError::Verification(format!("malformed extended key usage: {e}")))?;
    if purposes.0.contains(&ID_KP_OCSP_SIGNING) {
        Ok(())
    } else {
        Err(OcspError::Verification(
            "responder certificate is not authorised for OCSP signing".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::parse_pem;
    use vpr_certificates::issue::{IssuingAuthority, SignerProfile};

    #[test]
    fn issued_certificate_verifies_against_its_issuer_only() {
        let ca = IssuingAuthority::new("CA", None).unwrap();
        let other = IssuingAuthority::new("Other CA", None).unwrap();
        let responder = ca.issue_responder("Responder").unwrap();

        let responder = parse_pem(&responder.certificate_pem).unwrap();
        let ca_cert = parse_pem(&ca.certificate_pem()).unwrap();
        let other_cert = parse_pem(&other.certificate_pem()).unwrap();

        assert!(verify_issued_by(&responder, &ca_cert).is_ok());
        assert!(matches!(
            verify_issued_by(&responder, &other_cert),
            Err(OcspError::Verification(_))
        ));
    }

    #[test]
    fn delegated_responder_needs_ocsp_signing_purpose() {
        let ca = IssuingAuthority::new("CA", None).unwrap();
        let ca_cert = parse_pem(&ca.certificate_pem()).unwrap();

        let responder = ca.issue_responder("Responder").unwrap();
        let responder = parse_pem(&responder.certificate_pem).unwrap();
        assert!(verify_delegated_responder(&responder, &ca_cert).is_ok());

        let signer = ca
            .issue(&SignerProfile {
                name: "Dr Other",
                registration_authority: "GMC",
                registration_number: "2",
                ocsp_url: None,
            })
            .unwrap();
        let signer = parse_pem(&signer.certificate_pem).unwrap();
        assert!(verify_issued_by(&signer, &ca_cert).is_ok());
        assert!(matches!(
            verify_delegated_responder(&signer, &ca_cert),
            Err(OcspError::Verification(_))
        ));
    }

    #[test]
    fn same_name_different_key_fails_signature_check() {
        let ca = IssuingAuthority::new("CA", None).unwrap();
        let impostor = IssuingAuthority::new("CA", None).unwrap();
        let leaf = ca
            .issue(&SignerProfile {
                name: "Dr Jane Smith",
                registration_authority: "GMC",
                registration_number: "1",
                ocsp_url: None,
            })
            .unwrap();

        let leaf = parse_pem(&leaf.certificate_pem).unwrap();
        let impostor = parse_pem(&impostor.certificate_pem()).unwrap();
        assert!(matches!(
            verify_issued_by(&leaf, &impostor),
            Err(OcspError::Verification(_))
        ));
    }

    #[test]
    fn unsupported_algorithm_is_a_verification_error() {
        let ca = IssuingAuthority::new("CA", None).unwrap();
        let cert = parse_pem(&ca.certificate_pem()).unwrap();
        let md5 = AlgorithmIdentifierOwned {
            oid: ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.4"),
            parameters: None,
        };
        assert!(matches!(
            verify_signature(&cert.tbs_certificate.subject_public_key_info, &md5, b"m", b"s"),
            Err(OcspError::Verification(_))
        ));
    }
}
