//! Test fixtures: a small CA and a responder that signs RFC 6960 responses with ring.

use crate::request::{parse_pem, OcspTarget};
use const_oid::db::rfc5912::ECDSA_WITH_SHA_256;
use const_oid::db::rfc6960::ID_PKIX_OCSP_BASIC;
use der::asn1::{BitString, GeneralizedTime, Null, OctetString};
use der::Encode;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use vpr_certificates::issue::{IssuedCertificate, IssuingAuthority, SignerProfile};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_ocsp::{
    BasicOcspResponse, CertStatus, OcspGeneralizedTime, OcspResponse, OcspResponseStatus,
    ResponderId, ResponseBytes, ResponseData, RevokedInfo, SingleResponse, Version,
};

pub(crate) struct Chain {
    pub ca: IssuingAuthority,
    pub ca_key: Vec<u8>,
    pub leaf: IssuedCertificate,
}

impl Chain {
    pub fn new() -> Self {
        let ca = IssuingAuthority::new("Test CA", None).unwrap();
        let leaf = ca
            .issue(&SignerProfile {
                name: "Dr Jane Smith",
                registration_authority: "GMC",
                registration_number: "1234567",
                ocsp_url: Some("http://ocsp.test"),
            })
            .unwrap();
        let ca_key = ca.private_key_der();
        Self { ca, ca_key, leaf }
    }

    pub fn target(&self, with_issuer: bool) -> OcspTarget {
        let issuer = self.ca.certificate_pem();
        OcspTarget::new(
            &self.leaf.certificate_pem,
            with_issuer.then_some(issuer.as_str()),
        )
        .unwrap()
    }

    pub fn responder(&self) -> IssuedCertificate {
        self.ca.issue_responder("Test Responder").unwrap()
    }

    /// Another end-entity signer from the same CA, with no OCSP signing purpose.
    pub fn sibling(&self) -> IssuedCertificate {
        self.ca
            .issue(&SignerProfile {
                name: "Dr Other",
                registration_authority: "GMC",
                registration_number: "7654321",
                ocsp_url: Some("http://ocsp.test"),
            })
            .unwrap()
    }
}

pub(crate) struct ResponseSpec<'a> {
    pub signer_pkcs8: &'a [u8],
    pub status: CertStatus,
    pub embedded: Option<String>,
    pub corrupt_signature: bool,
    pub serial_override: Option<Vec<u8>>,
    pub this_update: SystemTime,
    pub next_update: Option<SystemTime>,
}

impl<'a> ResponseSpec<'a> {
    pub fn good(signer_pkcs8: &'a [u8]) -> Self {
        Self {
            signer_pkcs8,
            status: CertStatus::Good(Null),
            embedded: None,
            corrupt_signature: false,
            serial_override: None,
            this_update: SystemTime::now(),
            next_update: None,
        }
    }
}

fn now() -> OcspGeneralizedTime {
    at(SystemTime::now())
}

fn at(time: SystemTime) -> OcspGeneralizedTime {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    GeneralizedTime::from_unix_duration(Duration::from_secs(secs))
        .unwrap()
        .into()
}

pub(crate) fn revoked() -> CertStatus {
    CertStatus::Revoked(RevokedInfo {
        revocation_time: now(),
        revocation_reason: None,
    })
}

pub(crate) fn unknown() -> CertStatus {
    CertStatus::Unknown(Null)
}

/// Builds a DER `OCSPResponse` answering `target`'s request.
pub(crate) fn response(target: &OcspTarget, spec: ResponseSpec<'_>) -> Vec<u8> {
    response_for(target.cert_id().clone(), spec)
}

pub(crate) fn response_for(mut cert_id: x509_ocsp::CertId, spec: ResponseSpec<'_>) -> Vec<u8> {
    if let Some(serial) = spec.serial_override {
        cert_id.serial_number = SerialNumber::new(&serial).unwrap();
    }

    let tbs = ResponseData {
        version: Version::V1,
        responder_id: ResponderId::ByKey(OctetString::new(vec![0u8; 20]).unwrap()),
        produced_at: now(),
        responses: vec![SingleResponse {
            cert_id,
            cert_status: spec.status,
            this_update: at(spec.this_update),
            next_update: spec.next_update.map(at),
            single_extensions: None,
        }],
        response_extensions: None,
    };

    let rng = SystemRandom::new();
    let key = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, spec.signer_pkcs8, &rng)
        .unwrap();
    let mut signature = key
        .sign(&rng, &tbs.to_der().unwrap())
        .unwrap()
        .as_ref()
        .to_vec();
    if spec.corrupt_signature {
        let last = signature.len() - 1;
        signature[last] ^= 0x01;
    }

    let basic = BasicOcspResponse {
        tbs_response_data: tbs,
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA_256,
            parameters: None,
        },
        signature: BitString::from_bytes(&signature).unwrap(),
        certs: spec
            .embedded
            .map(|pem| vec![parse_pem(&pem).unwrap()]),
    };

    OcspResponse {
        response_status: OcspResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: ID_PKIX_OCSP_BASIC,
            response: OctetString::new(basic.to_der().unwrap()).unwrap(),
        }),
    }
    .to_der()
    .unwrap()
}
