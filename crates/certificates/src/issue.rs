//! Professional signing certificate issuance.
//!
//! Used by the CLI to create demo signer identities and by tests across the workspace to build
//! realistic chains. Certificates carry the clinician's name as Common Name and their
//! professional registration as a `vpr://<authority>/<number>` URI in subjectAltName, and can
//! advertise an OCSP responder through the Authority Information Access extension.

use crate::CertificateError;
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// `id-pe-authorityInfoAccess`.
const AIA_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];

/// DER of the `id-ad-ocsp` OBJECT IDENTIFIER (1.3.6.1.5.5.7.48.1), tag included.
const OCSP_ACCESS_METHOD_DER: &[u8] = &[
    0x06, 0x08, 0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01,
];

static SERIAL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A PEM certificate together with its PKCS#8 private key.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
    /// PKCS#8 DER of the private key, for callers that sign with it directly.
    pub private_key_der: Vec<u8>,
}

/// Who the certificate is for.
#[derive(Debug, Clone, Copy)]
pub struct SignerProfile<'a> {
    /// Full name of the clinician (Common Name).
    pub name: &'a str,
    /// Registration authority, e.g. "GMC" or "NMC".
    pub registration_authority: &'a str,
    /// Professional registration number.
    pub registration_number: &'a str,
    /// OCSP responder to advertise, if any.
    pub ocsp_url: Option<&'a str>,
}

impl SignerProfile<'_> {
    fn params(&self) -> Result<CertificateParams, CertificateError> {
        let mut params = CertificateParams::default();

        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, self.name);
        params.distinguished_name = subject;
        params.is_ca = IsCa::NoCa;

        let uri = format!(
            "vpr://{}/{}",
            self.registration_authority, self.registration_number
        );
        let uri = Ia5String::try_from(uri)
            .map_err(|e| CertificateError::GenerationError(e.to_string()))?;
        params.subject_alt_names.push(SanType::URI(uri));

        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::ContentCommitment,
        ];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(365);

        if let Some(url) = self.ocsp_url {
            params.custom_extensions.push(aia_extension(url)?);
        }
        Ok(params)
    }

    /// Creates a self-signed certificate for this signer.
    ///
    /// Self-signed certificates have no issuer to consult, so they are mostly useful for
    /// exercising the "no revocation signal" paths.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::GenerationError`] if key or certificate generation fails.
    pub fn self_signed(&self) -> Result<IssuedCertificate, CertificateError> {
        let mut params = self.params()?;
        params.serial_number = Some(SerialNumber::from(vec![
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        ]));

        let key_pair = generate_key()?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CertificateError::GenerationError(e.to_string()))?;

        Ok(IssuedCertificate {
            certificate_pem: cert.pem(),
            private_key_pem: key_pair.serialize_pem(),
            private_key_der: key_pair.serialize_der(),
        })
    }
}

/// A minimal certificate authority that can issue signer and OCSP responder certificates.
pub struct IssuingAuthority {
    certificate: rcgen::Certificate,
    key_pair: KeyPair,
}

impl IssuingAuthority {
    /// Creates a self-signed CA, optionally advertising its own OCSP responder.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::GenerationError`] if generation fails.
    pub fn new(common_name: &str, ocsp_url: Option<&str>) -> Result<Self, CertificateError> {
        let mut params = CertificateParams::default();
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, common_name);
        subject.push(DnType::OrganizationName, "VPR");
        params.distinguished_name = subject;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.serial_number = Some(next_serial());
        if let Some(url) = ocsp_url {
            params.custom_extensions.push(aia_extension(url)?);
        }

        let key_pair = generate_key()?;
        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| CertificateError::GenerationError(e.to_string()))?;
        Ok(Self {
            certificate,
            key_pair,
        })
    }

    /// Creates an intermediate CA signed by this authority.
    pub fn intermediate(
        &self,
        common_name: &str,
        ocsp_url: Option<&str>,
    ) -> Result<Self, CertificateError> {
        let mut params = CertificateParams::default();
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, common_name);
        subject.push(DnType::OrganizationName, "VPR");
        params.distinguished_name = subject;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.serial_number = Some(next_serial());
        params.use_authority_key_identifier_extension = true;
        if let Some(url) = ocsp_url {
            params.custom_extensions.push(aia_extension(url)?);
        }

        let key_pair = generate_key()?;
        let certificate = params
            .signed_by(&key_pair, &self.certificate, &self.key_pair)
            .map_err(|e| CertificateError::GenerationError(e.to_string()))?;
        Ok(Self {
            certificate,
            key_pair,
        })
    }

    pub fn certificate_pem(&self) -> String {
        self.certificate.pem()
    }

    /// PKCS#8 DER of the authority's private key.
    pub fn private_key_der(&self) -> Vec<u8> {
        self.key_pair.serialize_der()
    }

    /// Issues a signer certificate. The certificate carries an Authority Key Identifier so an
    /// OCSP request can be built from it even when the issuer certificate is not at hand.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::GenerationError`] if generation fails.
    pub fn issue(&self, profile: &SignerProfile<'_>) -> Result<IssuedCertificate, CertificateError> {
        let mut params = profile.params()?;
        params.serial_number = Some(next_serial());
        params.use_authority_key_identifier_extension = true;
        self.sign(params)
    }

    /// Issues a delegated OCSP responder certificate (`id-kp-OCSPSigning`).
    pub fn issue_responder(&self, common_name: &str) -> Result<IssuedCertificate, CertificateError> {
        let mut params = CertificateParams::default();
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, common_name);
        params.distinguished_name = subject;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::OcspSigning];
        params.serial_number = Some(next_serial());
        params.use_authority_key_identifier_extension = true;
        self.sign(params)
    }

    fn sign(&self, params: CertificateParams) -> Result<IssuedCertificate, CertificateError> {
        let key_pair = generate_key()?;
        let cert = params
            .signed_by(&key_pair, &self.certificate, &self.key_pair)
            .map_err(|e| CertificateError::GenerationError(e.to_string()))?;
        Ok(IssuedCertificate {
            certificate_pem: cert.pem(),
            private_key_pem: key_pair.serialize_pem(),
            private_key_der: key_pair.serialize_der(),
        })
    }
}

fn generate_key() -> Result<KeyPair, CertificateError> {
    KeyPair::generate().map_err(|e| CertificateError::GenerationError(e.to_string()))
}

/// Positive, minimally encoded serial numbers that stay unique within a process.
fn next_serial() -> SerialNumber {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos() as u64;
    let counter = SERIAL_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&nanos.to_be_bytes());
    bytes.extend_from_slice(&counter.to_be_bytes());
    bytes[0] = (bytes[0] & 0x3F) | 0x40;
    SerialNumber::from(bytes)
}

/// Builds an AIA extension with a single OCSP access description.
fn aia_extension(uri: &str) -> Result<CustomExtension, CertificateError> {
    if !uri.is_ascii() {
        return Err(CertificateError::GenerationError(
            "OCSP responder URI must be ASCII".into(),
        ));
    }
    // AccessDescription ::= SEQUENCE { accessMethod OID, accessLocation [6] IA5String }
    let mut access_description = OCSP_ACCESS_METHOD_DER.to_vec();
    access_description.extend(der_tlv(0x86, uri.as_bytes()));
    let access_description = der_tlv(0x30, &access_description);
    let content = der_tlv(0x30, &access_description);
    Ok(CustomExtension::from_oid_content(AIA_OID, content))
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let len_bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        out.push(0x80 | len_bytes.len() as u8);
        out.extend(len_bytes);
    }
    out.extend_from_slice(content);
    out
}
