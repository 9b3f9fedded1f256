//! OCSP response decoding and verification.

use crate::request::OcspTarget;
use crate::verify::{verify_delegated_responder, verify_signature};
use crate::{OcspError, OcspStatus};
use const_oid::db::rfc6960::ID_PKIX_OCSP_BASIC;
use der::{Decode, Encode};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspResponse, OcspResponseStatus, SingleResponse,
};

/// Oldest `thisUpdate` accepted by default.
pub const DEFAULT_MAX_RESPONSE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Tolerated difference between the responder's clock and ours.
pub const CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);

/// [`evaluate_at`] with the current time and [`DEFAULT_MAX_RESPONSE_AGE`].
///
/// # Errors
///
/// See [`evaluate_at`].
pub fn evaluate(target: &OcspTarget, response_der: &[u8]) -> Result<OcspStatus, OcspError> {
    evaluate_at(
        target,
        response_der,
        SystemTime::now(),
        DEFAULT_MAX_RESPONSE_AGE,
    )
}

/// Decodes `response_der`, verifies it and returns the status for `target` as seen at `now`.
///
/// The response must be `successful` and carry a `BasicOCSPResponse`. It must be signed by the
/// issuer key, or by an embedded responder certificate that the issuer signed and that carries
/// `id-kp-OCSPSigning`. Without a known issuer nothing is trusted. The `SingleResponse` whose
/// `CertID` matches the request must be current: `thisUpdate` not in the future, no older than
/// `max_age`, and `nextUpdate` (when present) not yet passed.
///
/// # Errors
///
/// [`OcspError::Protocol`] for malformed, unsuccessful, non-matching or stale responses and
/// [`OcspError::Verification`] when no trusted key validates the signature.
pub fn evaluate_at(
    target: &OcspTarget,
    response_der: &[u8],
    now: SystemTime,
    max_age: Duration,
) -> Result<OcspStatus, OcspError> {
    let response = OcspResponse::from_der(response_der)
        .map_err(|e| OcspError::Protocol(format!("malformed OCSPResponse: {e}")))?;

    if response.response_status != OcspResponseStatus::Successful {
        return Err(OcspError::Protocol(format!(
            "responder returned status {:?}",
            response.response_status
        )));
    }
    let bytes = response
        .response_bytes
        .ok_or_else(|| OcspError::Protocol("successful response without body".into()))?;
    if bytes.response_type != ID_PKIX_OCSP_BASIC {
        return Err(OcspError::Protocol(format!(
            "unsupported response type {}",
            bytes.response_type
        )));
    }
    let basic = BasicOcspResponse::from_der(bytes.response.as_bytes())
        .map_err(|e| OcspError::Protocol(format!("malformed BasicOCSPResponse: {e}")))?;

    verify_basic(target, &basic)?;

    let single = basic
        .tbs_response_data
        .responses
        .iter()
        .find(|single| cert_id_matches(&single.cert_id, &target.cert_id))
        .ok_or_else(|| {
            OcspError::Protocol("response does not cover the requested certificate".into())
        })?;
    check_freshness(single, now, max_age)?;

    Ok(match single.cert_status {
        CertStatus::Good(_) => OcspStatus::Good,
        CertStatus::Revoked(_) => OcspStatus::Revoked,
        CertStatus::Unknown(_) => OcspStatus::Unknown,
    })
}

fn verify_basic(target: &OcspTarget, basic: &BasicOcspResponse) -> Result<(), OcspError> {
    let tbs = basic
        .tbs_response_data
        .to_der()
        .map_err(|e| OcspError::Protocol(e.to_string()))?;
    let signature = basic.signature.raw_bytes();

    let Some(issuer) = &target.issuer else {
        return Err(OcspError::Verification(
            "issuer certificate unknown, no trusted key to verify the response".into(),
        ));
    };

    let mut keys: Vec<&SubjectPublicKeyInfoOwned> =
        vec![&issuer.tbs_certificate.subject_public_key_info];
    for responder in basic.certs.iter().flatten() {
        if let Err(e) = verify_delegated_responder(responder, issuer) {
            tracing::debug!("ignoring embedded responder certificate: {}", e);
            continue;
        }
        keys.push(&responder.tbs_certificate.subject_public_key_info);
    }

    let verified = keys.iter().any(|spki| {
        verify_signature(spki, &basic.signature_algorithm, &tbs, signature).is_ok()
    });
    if verified {
        Ok(())
    } else {
        Err(OcspError::Verification(
            "response signature does not verify against any trusted key".into(),
        ))
    }
}

fn check_freshness(
    single: &SingleResponse,
    now: SystemTime,
    max_age: Duration,
) -> Result<(), OcspError> {
    let now = now
        .duration_since(UNIX_EPOCH)
        .map_err(|_| OcspError::Protocol("system clock is before 1970".into()))?;

    let this_update = single.this_update.0.to_unix_duration();
    if this_update > now + CLOCK_SKEW {
        return Err(OcspError::Protocol("thisUpdate is in the future".into()));
    }
    if now.saturating_sub(this_update) > max_age {
        return Err(OcspError::Protocol(format!(
            "response is older than {}s",
            max_age.as_secs()
        )));
    }
    if let Some(next_update) = &single.next_update {
        if next_update.0.to_unix_duration() + CLOCK_SKEW < now {
            return Err(OcspError::Protocol("nextUpdate has passed".into()));
        }
    }
    Ok(())
}

fn cert_id_matches(a: &CertId, b: &CertId) -> bool {
    a.hash_algorithm.oid == b.hash_algorithm.oid
        && a.issuer_name_hash == b.issuer_name_hash
        && a.issuer_key_hash == b.issuer_key_hash
        && a.serial_number == b.serial_number
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Chain, ResponseSpec};
    use der::asn1::OctetString;
    use vpr_certificates::issue::SignerProfile;
    use x509_ocsp::{OcspResponse, OcspResponseStatus};

    #[test]
    fn good_response_signed_by_issuer() {
        let chain = Chain::new();
        let target = chain.target(true);
        let der = testing::response(&target, ResponseSpec::good(&chain.ca_key));
        assert_eq!(evaluate(&target, &der).unwrap(), OcspStatus::Good);
    }

    #[test]
    fn revoked_and_unknown_verdicts_are_mapped() {
        let chain = Chain::new();
        let target = chain.target(true);

        let mut spec = ResponseSpec::good(&chain.ca_key);
        spec.status = testing::revoked();
        assert_eq!(
            evaluate(&target, &testing::response(&target, spec)).unwrap(),
            OcspStatus::Revoked
        );

        let mut spec = ResponseSpec::good(&chain.ca_key);
        spec.status = testing::unknown();
        assert_eq!(
            evaluate(&target, &testing::response(&target, spec)).unwrap(),
            OcspStatus::Unknown
        );
    }

    #[test]
    fn response_signed_by_unrelated_key_fails_verification() {
        let chain = Chain::new();
        let stranger = Chain::new();
        let target = chain.target(true);
        let der = testing::response(&target, ResponseSpec::good(&stranger.ca_key));
        let err = evaluate(&target, &der).unwrap_err();
        assert!(matches!(err, OcspError::Verification(_)), "{err}");
        assert_eq!(err.class(), "verification");
    }

    #[test]
    fn delegated_responder_issued_by_issuer_is_trusted() {
        let chain = Chain::new();
        let target = chain.target(true);
        let responder = chain.responder();
        let mut spec = ResponseSpec::good(&responder.private_key_der);
        spec.embedded = Some(responder.certificate_pem.clone());
        assert_eq!(
            evaluate(&target, &testing::response(&target, spec)).unwrap(),
            OcspStatus::Good
        );
    }

    #[test]
    fn delegated_responder_from_another_authority_is_rejected() {
        let chain = Chain::new();
        let stranger = Chain::new();
        let target = chain.target(true);
        let responder = stranger.responder();
        let mut spec = ResponseSpec::good(&responder.private_key_der);
        spec.embedded = Some(responder.certificate_pem.clone());
        assert!(matches!(
            evaluate(&target, &testing::response(&target, spec)),
            Err(OcspError::Verification(_))
        ));
    }

    #[test]
    fn without_issuer_no_response_is_trusted() {
        let chain = Chain::new();
        let target = chain.target(false);

        let der = testing::response(&target, ResponseSpec::good(&chain.ca_key));
        assert!(matches!(
            evaluate(&target, &der),
            Err(OcspError::Verification(_))
        ));

        let responder = chain.responder();
        let mut spec = ResponseSpec::good(&responder.private_key_der);
        spec.embedded = Some(responder.certificate_pem.clone());
        assert!(matches!(
            evaluate(&target, &testing::response(&target, spec)),
            Err(OcspError::Verification(_))
        ));
    }

    #[test]
    fn self_signed_stranger_embedding_its_own_cert_is_rejected() {
        let chain = Chain::new();
        let stranger = SignerProfile {
            name: "Mallory",
            registration_authority: "GMC",
            registration_number: "666",
            ocsp_url: None,
        }
        .self_signed()
        .unwrap();

        for target in [chain.target(false), chain.target(true)] {
            let mut spec = ResponseSpec::good(&stranger.private_key_der);
            spec.embedded = Some(stranger.certificate_pem.clone());
            let err = evaluate(&target, &testing::response(&target, spec)).unwrap_err();
            assert!(matches!(err, OcspError::Verification(_)), "{err}");
        }
    }

    #[test]
    fn sibling_signer_without_ocsp_signing_purpose_is_rejected() {
        let chain = Chain::new();
        let target = chain.target(true);
        let sibling = chain.sibling();

        let mut spec = ResponseSpec::good(&sibling.private_key_der);
        spec.embedded = Some(sibling.certificate_pem.clone());
        let err = evaluate(&target, &testing::response(&target, spec)).unwrap_err();
        assert!(matches!(err, OcspError::Verification(_)), "{err}");
    }

    #[test]
    fn expired_next_update_is_a_protocol_error() {
        let chain = Chain::new();
        let target = chain.target(true);
        let mut spec = ResponseSpec::good(&chain.ca_key);
        spec.this_update = SystemTime::now() - Duration::from_secs(3 * 24 * 3600);
        spec.next_update = Some(SystemTime::now() - Duration::from_secs(24 * 3600));
        let err = evaluate(&target, &testing::response(&target, spec)).unwrap_err();
        assert!(matches!(err, OcspError::Protocol(_)), "{err}");
    }

    #[test]
    fn future_this_update_is_a_protocol_error() {
        let chain = Chain::new();
        let target = chain.target(true);
        let mut spec = ResponseSpec::good(&chain.ca_key);
        spec.this_update = SystemTime::now() + Duration::from_secs(3600);
        let err = evaluate(&target, &testing::response(&target, spec)).unwrap_err();
        assert!(matches!(err, OcspError::Protocol(_)), "{err}");
    }

    #[test]
    fn replayed_old_response_exceeds_max_age() {
        let chain = Chain::new();
        let target = chain.target(true);
        let mut spec = ResponseSpec::good(&chain.ca_key);
        spec.this_update = SystemTime::now() - Duration::from_secs(30 * 24 * 3600);
        let der = testing::response(&target, spec);

        let err = evaluate(&target, &der).unwrap_err();
        assert!(matches!(err, OcspError::Protocol(_)), "{err}");
        assert_eq!(
            evaluate_at(
                &target,
                &der,
                SystemTime::now(),
                Duration::from_secs(60 * 24 * 3600)
            )
            .unwrap(),
            OcspStatus::Good
        );
    }

    #[test]
    fn current_next_update_and_small_skew_are_accepted() {
        let chain = Chain::new();
        let target = chain.target(true);
        let mut spec = ResponseSpec::good(&chain.ca_key);
        spec.this_update = SystemTime::now() + Duration::from_secs(60);
        spec.next_update = Some(SystemTime::now() + Duration::from_secs(24 * 3600));
        assert_eq!(
            evaluate(&target, &testing::response(&target, spec)).unwrap(),
            OcspStatus::Good
        );
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let chain = Chain::new();
        let target = chain.target(true);
        let mut spec = ResponseSpec::good(&chain.ca_key);
        spec.corrupt_signature = true;
        assert!(matches!(
            evaluate(&target, &testing::response(&target, spec)),
            Err(OcspError::Verification(_))
        ));
    }

    #[test]
    fn response_for_another_certificate_is_a_protocol_error() {
        let chain = Chain::new();
        let target = chain.target(true);
        let mut spec = ResponseSpec::good(&chain.ca_key);
        spec.serial_override = Some(vec![0x01, 0x02]);
        let err = evaluate(&target, &testing::response(&target, spec)).unwrap_err();
        assert!(matches!(err, OcspError::Protocol(_)), "{err}");
    }

    #[test]
    fn unsuccessful_and_malformed_responses_are_protocol_errors() {
        let chain = Chain::new();
        let target = chain.target(true);

        let try_later = OcspResponse {
            response_status: OcspResponseStatus::TryLater,
            response_bytes: None,
        }
        .to_der()
        .unwrap();
        assert!(matches!(
            evaluate(&target, &try_later),
            Err(OcspError::Protocol(_))
        ));

        assert!(matches!(
            evaluate(&target, b"<html>not ocsp</html>"),
            Err(OcspError::Protocol(_))
        ));

        let wrong_type = OcspResponse {
            response_status: OcspResponseStatus::Successful,
            response_bytes: Some(x509_ocsp::ResponseBytes {
                response_type: const_oid::db::rfc5912::ID_SHA_1,
                response: OctetString::new(vec![0x05, 0x00]).unwrap(),
            }),
        }
        .to_der()
        .unwrap();
        assert!(matches!(
            evaluate(&target, &wrong_type),
            Err(OcspError::Protocol(_))
        ));
    }
}
