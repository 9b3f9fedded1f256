//! The signable document record and its state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vpr_files::ObjectKey;
use vpr_types::{DocumentId, Sha256Hex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureStatus {
    Unsigned,
    Signed,
}

/// How the signature is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureFormat {
    /// PAdES: the signature is embedded in the PDF.
    Embedded,
    /// CMS: the signature is a separate file next to the PDF.
    Detached,
}

impl SignatureFormat {
    /// Parses a wire spelling. `PADES` and `CMS` are accepted as aliases; case is ignored.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "EMBEDDED" | "PADES" => Some(Self::Embedded),
            "DETACHED" | "CMS" => Some(Self::Detached),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedded => "EMBEDDED",
            Self::Detached => "DETACHED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Valid,
    Revoked,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA-256")]
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
        }
    }
}

/// A clinical PDF that can be signed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignableDocument {
    pub id: DocumentId,
    pub artifact_key: ObjectKey,
    pub hash_algorithm: Option<HashAlgorithm>,
    pub hash_hex: Option<Sha256Hex>,
    pub signature_status: SignatureStatus,
    pub signature_format: Option<SignatureFormat>,
    pub signed_artifact_key: Option<ObjectKey>,
    pub signature_sha256: Option<Sha256Hex>,
    pub signature_algorithm: Option<String>,
    pub timestamp_token_key: Option<ObjectKey>,
    pub signer_name: Option<String>,
    pub signer_cert_subject: Option<String>,
    pub signer_cert_issuer: Option<String>,
    pub signer_cert_serial: Option<String>,
    #[serde(default)]
    pub signer_certificate_chain: Vec<String>,
    pub certificate_status: CertificateStatus,
    pub certificate_validated_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Everything written by the single UNSIGNED -> SIGNED transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureUpdate {
    pub format: SignatureFormat,
    pub signed_artifact_key: ObjectKey,
    pub signature_sha256: Sha256Hex,
    pub signature_algorithm: Option<String>,
    pub timestamp_token_key: Option<ObjectKey>,
    pub signer_name: Option<String>,
    pub signer_cert_subject: Option<String>,
    pub signer_cert_issuer: Option<String>,
    pub signer_cert_serial: Option<String>,
    pub signer_certificate_chain: Vec<String>,
    pub signed_at: DateTime<Utc>,
}

/// Result of applying a signature to a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Signed,
    AlreadySigned,
    Missing,
}

impl SignableDocument {
    /// A freshly generated, unsigned document.
    pub fn new_unsigned(artifact_key: ObjectKey, now: DateTime<Utc>) -> Self {
        Self {
            id: DocumentId::new(),
            artifact_key,
            hash_algorithm: None,
            hash_hex: None,
            signature_status: SignatureStatus::Unsigned,
            signature_format: None,
            signed_artifact_key: None,
            signature_sha256: None,
            signature_algorithm: None,
            timestamp_token_key: None,
            signer_name: None,
            signer_cert_subject: None,
            signer_cert_issuer: None,
            signer_cert_serial: None,
            signer_certificate_chain: Vec::new(),
            certificate_status: CertificateStatus::Unknown,
            certificate_validated_at: None,
            signed_at: None,
            created_at: now,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.signature_status == SignatureStatus::Signed
    }

    /// Applies `update` if the document is still unsigned. Signed documents are left untouched.
    pub(crate) fn apply_signature(&mut self, update: SignatureUpdate) -> ApplyOutcome {
        if self.is_signed() {
            return ApplyOutcome::AlreadySigned;
        }
        self.signature_status = SignatureStatus::Signed;
        self.signature_format = Some(update.format);
        self.signed_artifact_key = Some(update.signed_artifact_key);
        self.signature_sha256 = Some(update.signature_sha256);
        self.signature_algorithm = update.signature_algorithm;
        self.timestamp_token_key = update.timestamp_token_key;
        self.signer_name = update.signer_name;
        self.signer_cert_subject = update.signer_cert_subject;
        self.signer_cert_issuer = update.signer_cert_issuer;
        self.signer_cert_serial = update.signer_cert_serial;
        self.signer_certificate_chain = update.signer_certificate_chain;
        self.certificate_status = CertificateStatus::Unknown;
        self.certificate_validated_at = None;
        self.signed_at = Some(update.signed_at);
        ApplyOutcome::Signed
    }

    /// Whether the document is signed and its certificate status is older than `cutoff`.
    pub fn is_due_for_revalidation(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_signed()
            && self
                .certificate_validated_at
                .map_or(true, |validated| validated < cutoff)
    }
}

/// Orders revalidation candidates: never validated first, then oldest validation, then id.
pub(crate) fn revalidation_order(a: &SignableDocument, b: &SignableDocument) -> std::cmp::Ordering {
    match (a.certificate_validated_at, b.certificate_validated_at) {
        (None, None) => a.id.cmp(&b.id),
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn update(key: &str) -> SignatureUpdate {
        SignatureUpdate {
            format: SignatureFormat::Embedded,
            signed_artifact_key: ObjectKey::parse(key).unwrap(),
            signature_sha256: Sha256Hex::from_bytes(&[7u8; 32]),
            signature_algorithm: Some("SHA256withRSA".into()),
            timestamp_token_key: None,
            signer_name: Some("Dr Jane Smith".into()),
            signer_cert_subject: None,
            signer_cert_issuer: None,
            signer_cert_serial: None,
            signer_certificate_chain: vec![],
            signed_at: Utc::now(),
        }
    }

    #[test]
    fn format_aliases_are_case_insensitive() {
        assert_eq!(SignatureFormat::parse("pades"), Some(SignatureFormat::Embedded));
        assert_eq!(SignatureFormat::parse("Embedded"), Some(SignatureFormat::Embedded));
        assert_eq!(SignatureFormat::parse("cms"), Some(SignatureFormat::Detached));
        assert_eq!(SignatureFormat::parse(" DETACHED "), Some(SignatureFormat::Detached));
        assert_eq!(SignatureFormat::parse("XADES"), None);
    }

    #[test]
    fn signature_applies_once() {
        let mut doc =
            SignableDocument::new_unsigned(ObjectKey::parse("rx.pdf").unwrap(), Utc::now());
        doc.certificate_status = CertificateStatus::Valid;
        doc.certificate_validated_at = Some(Utc::now());

        assert_eq!(doc.apply_signature(update("rx.signed.pdf")), ApplyOutcome::Signed);
        assert!(doc.is_signed());
        assert_eq!(doc.certificate_status, CertificateStatus::Unknown);
        assert!(doc.certificate_validated_at.is_none());

        let before = doc.clone();
        assert_eq!(
            doc.apply_signature(update("other.signed.pdf")),
            ApplyOutcome::AlreadySigned
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn serializes_with_camel_case_and_wire_enums() {
        let doc = SignableDocument::new_unsigned(ObjectKey::parse("rx.pdf").unwrap(), Utc::now());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["signatureStatus"], "UNSIGNED");
        assert_eq!(json["certificateStatus"], "UNKNOWN");
        assert_eq!(json["artifactKey"], "rx.pdf");
        assert!(json["certificateValidatedAt"].is_null());
        assert_eq!(
            serde_json::to_value(HashAlgorithm::Sha256).unwrap(),
            "SHA-256"
        );
    }

    #[test]
    fn revalidation_due_and_ordering() {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::days(7);
        let mut never = SignableDocument::new_unsigned(ObjectKey::parse("a.pdf").unwrap(), now);
        assert!(!never.is_due_for_revalidation(cutoff));
        never.apply_signature(update("a.signed.pdf"));
        assert!(never.is_due_for_revalidation(cutoff));

        let mut old = never.clone();
        old.id = DocumentId::new();
        old.certificate_validated_at = Some(now - chrono::Duration::days(30));
        let mut fresh = never.clone();
        fresh.id = DocumentId::new();
        fresh.certificate_validated_at = Some(now - chrono::Duration::days(1));
        assert!(old.is_due_for_revalidation(cutoff));
        assert!(!fresh.is_due_for_revalidation(cutoff));

        let mut docs = vec![old.clone(), never.clone()];
        docs.sort_by(revalidation_order);
        assert_eq!(docs[0].id, never.id);
        assert_eq!(docs[1].id, old.id);
    }
}
