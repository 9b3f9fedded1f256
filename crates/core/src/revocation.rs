//! OCSP revalidation of signer certificates.
//!
//! The leaf certificate is checked against the responder in its AIA extension. When that
//! attempt cannot produce a verdict (no responder, timeout, transport, protocol or
//! verification failure) the issuer certificate is checked against its own responder instead.
//! If neither attempt yields a verdict the status is UNKNOWN. Network and protocol failures
//! never surface as errors; they are logged with their failure class.
//!
//! A responder answering "unknown" is a completed attempt and does not trigger the fallback.

use crate::document::{CertificateStatus, SignableDocument};
use crate::store::DocumentRecords;
use crate::{SigningError, SigningResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use vpr_ocsp::{OcspClient, OcspError, OcspStatus};
use vpr_types::DocumentId;

/// Result of one revalidation, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevalidationOutcome {
    pub document_id: DocumentId,
    pub certificate_status: CertificateStatus,
    pub certificate_validated_at: DateTime<Utc>,
}

/// Why an attempt produced no verdict.
#[derive(Debug)]
enum AttemptFailure {
    NoResponder,
    TimedOut,
    Client(OcspError),
}

impl AttemptFailure {
    fn class(&self) -> &'static str {
        match self {
            AttemptFailure::NoResponder => "no_responder",
            AttemptFailure::TimedOut => "timed_out",
            AttemptFailure::Client(e) => e.class(),
        }
    }
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::NoResponder => f.write_str("certificate advertises no OCSP responder"),
            AttemptFailure::TimedOut => f.write_str("attempt exceeded its deadline"),
            AttemptFailure::Client(e) => write!(f, "{e}"),
        }
    }
}

fn certificate_status(status: OcspStatus) -> CertificateStatus {
    match status {
        OcspStatus::Good => CertificateStatus::Valid,
        OcspStatus::Revoked => CertificateStatus::Revoked,
        OcspStatus::Unknown => CertificateStatus::Unknown,
    }
}

#[derive(Clone)]
pub struct OcspValidator {
    client: Arc<dyn OcspClient>,
    records: Arc<dyn DocumentRecords>,
    attempt_timeout: Duration,
}

impl OcspValidator {
    /// # Arguments
    ///
    /// * `client` - OCSP protocol client
    /// * `records` - Where results are persisted
    /// * `attempt_timeout` - Upper bound for each of the two attempts
    pub fn new(
        client: Arc<dyn OcspClient>,
        records: Arc<dyn DocumentRecords>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            client,
            records,
            attempt_timeout,
        }
    }

    /// Determines the revocation status of a leaf-first PEM chain. Never fails.
    pub async fn check_chain(&self, chain: &[String]) -> CertificateStatus {
        let Some(leaf) = chain.first() else {
            tracing::debug!("empty certificate chain, status unknown");
            return CertificateStatus::Unknown;
        };
        let issuer = chain.get(1);

        match self.attempt(leaf, issuer.map(String::as_str)).await {
            Ok(status) => {
                tracing::debug!(attempt = "leaf", status = ?status, "OCSP verdict");
                return certificate_status(status);
            }
            Err(failure) => {
                tracing::warn!(attempt = "leaf", class = failure.class(), "OCSP attempt failed: {}", failure);
            }
        }

        let Some(issuer) = issuer else {
            return CertificateStatus::Unknown;
        };
        match self
            .attempt(issuer, chain.get(2).map(String::as_str))
            .await
        {
            Ok(status) => {
                tracing::debug!(attempt = "issuer", status = ?status, "OCSP verdict");
                certificate_status(status)
            }
            Err(failure) => {
                tracing::warn!(attempt = "issuer", class = failure.class(), "OCSP attempt failed: {}", failure);
                CertificateStatus::Unknown
            }
        }
    }

    async fn attempt(
        &self,
        subject_pem: &str,
        issuer_pem: Option<&str>,
    ) -> Result<OcspStatus, AttemptFailure> {
        let responder =
            vpr_certificates::ocsp_responder_uri(subject_pem).ok_or(AttemptFailure::NoResponder)?;
        tracing::debug!(responder = %responder, "querying OCSP responder");

        match tokio::time::timeout(
            self.attempt_timeout,
            self.client.check(&responder, subject_pem, issuer_pem),
        )
        .await
        {
            Ok(result) => result.map_err(AttemptFailure::Client),
            Err(_) => Err(AttemptFailure::TimedOut),
        }
    }

    /// Revalidates a signed document and persists the status with `now` as validation time.
    ///
    /// # Errors
    ///
    /// - `SigningError::NotSigned` if the document is not signed
    /// - `SigningError::NotFound` if the document disappeared before the result was stored
    /// - `SigningError::Store` if persisting fails
    pub async fn revalidate(
        &self,
        document: &SignableDocument,
        now: DateTime<Utc>,
    ) -> SigningResult<RevalidationOutcome> {
        if !document.is_signed() {
            return Err(SigningError::NotSigned(document.id));
        }

        let status = self.check_chain(&document.signer_certificate_chain).await;
        if !self
            .records
            .record_certificate_status(document.id, status, now)
            .await?
        {
            return Err(SigningError::NotFound(document.id.to_string()));
        }

        tracing::info!(document_id = %document.id, status = ?status, "certificate revalidated");
        Ok(RevalidationOutcome {
            document_id: document.id,
            certificate_status: status,
            certificate_validated_at: now,
        })
    }

    /// Loads and revalidates one document.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::NotFound` for a malformed or unknown id, otherwise as
    /// [`OcspValidator::revalidate`].
    pub async fn revalidate_by_id(
        &self,
        raw_id: &str,
        now: DateTime<Utc>,
    ) -> SigningResult<RevalidationOutcome> {
        let id: DocumentId = raw_id
            .parse()
            .map_err(|_| SigningError::NotFound(raw_id.to_owned()))?;
        let document = self
            .records
            .load(id)
            .await?
            .ok_or_else(|| SigningError::NotFound(id.to_string()))?;
        self.revalidate(&document, now).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::document::tests::update;
    use crate::persistence::memory::MemoryDocumentRecords;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tracing_test::traced_test;
    use vpr_certificates::issue::{IssuingAuthority, SignerProfile};
    use vpr_files::ObjectKey;

    pub(crate) const LEAF_RESPONDER: &str = "http://ocsp.leaf.test/";
    pub(crate) const ISSUER_RESPONDER: &str = "http://ocsp.issuer.test/";

    /// Scripted OCSP client keyed by responder URL.
    #[derive(Default)]
    pub(crate) struct FakeOcsp {
        pub(crate) answers: Mutex<HashMap<String, FakeAnswer>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    #[derive(Clone, Copy)]
    pub(crate) enum FakeAnswer {
        Status(OcspStatus),
        Unreachable,
        Hang,
        Panic,
    }

    impl FakeOcsp {
        pub(crate) fn answering(answers: &[(&str, FakeAnswer)]) -> Self {
            let fake = Self::default();
            {
                let mut map = fake.answers.lock().unwrap();
                for (url, answer) in answers {
                    map.insert((*url).to_owned(), *answer);
                }
            }
            fake
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OcspClient for FakeOcsp {
        async fn check(
            &self,
            responder_url: &str,
            _subject_pem: &str,
            _issuer_pem: Option<&str>,
        ) -> Result<OcspStatus, OcspError> {
            self.calls.lock().unwrap().push(responder_url.to_owned());
            let answer = self.answers.lock().unwrap().get(responder_url).copied();
            match answer {
                Some(FakeAnswer::Status(status)) => Ok(status),
                Some(FakeAnswer::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(OcspStatus::Good)
                }
                Some(FakeAnswer::Panic) => panic!("responder exploded"),
                Some(FakeAnswer::Unreachable) | None => {
                    Err(OcspError::Unreachable("connection refused".into()))
                }
            }
        }
    }

    /// Leaf-first chain: signer, intermediate, root. Responders are advertised as requested.
    pub(crate) fn chain(leaf_responder: bool, issuer_responder: bool) -> Vec<String> {
        let root = IssuingAuthority::new("Test Root", None).unwrap();
        let intermediate = root
            .intermediate(
                "Test Intermediate",
                issuer_responder.then_some(ISSUER_RESPONDER),
            )
            .unwrap();
        let leaf = intermediate
            .issue(&SignerProfile {
                name: "Dr Jane Smith",
                registration_authority: "GMC",
                registration_number: "1234567",
                ocsp_url: leaf_responder.then_some(LEAF_RESPONDER),
            })
            .unwrap();
        vec![
            leaf.certificate_pem,
            intermediate.certificate_pem(),
            root.certificate_pem(),
        ]
    }

    fn validator(fake: Arc<FakeOcsp>, records: Arc<MemoryDocumentRecords>) -> OcspValidator {
        OcspValidator::new(fake, records, Duration::from_secs(10))
    }

    pub(crate) fn signed_document(chain: Vec<String>) -> SignableDocument {
        let mut doc =
            SignableDocument::new_unsigned(ObjectKey::parse("rx/1.pdf").unwrap(), Utc::now());
        let mut signature = update("rx/1.signed.pdf");
        signature.signer_certificate_chain = chain;
        doc.apply_signature(signature);
        doc
    }

    #[tokio::test]
    async fn empty_chain_is_unknown_without_network() {
        let fake = Arc::new(FakeOcsp::default());
        let v = validator(fake.clone(), Arc::new(MemoryDocumentRecords::new()));
        assert_eq!(v.check_chain(&[]).await, CertificateStatus::Unknown);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn no_aia_anywhere_is_unknown_without_network() {
        let fake = Arc::new(FakeOcsp::default());
        let v = validator(fake.clone(), Arc::new(MemoryDocumentRecords::new()));
        assert_eq!(
            v.check_chain(&chain(false, false)).await,
            CertificateStatus::Unknown
        );
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn leaf_verdicts_map_to_certificate_status() {
        for (answer, expected) in [
            (OcspStatus::Good, CertificateStatus::Valid),
            (OcspStatus::Revoked, CertificateStatus::Revoked),
            (OcspStatus::Unknown, CertificateStatus::Unknown),
        ] {
            let fake = Arc::new(FakeOcsp::answering(&[
                (LEAF_RESPONDER, FakeAnswer::Status(answer)),
                (ISSUER_RESPONDER, FakeAnswer::Status(OcspStatus::Good)),
            ]));
            let v = validator(fake.clone(), Arc::new(MemoryDocumentRecords::new()));
            assert_eq!(v.check_chain(&chain(true, true)).await, expected);
            assert_eq!(fake.calls(), vec![LEAF_RESPONDER.to_owned()]);
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn unreachable_leaf_falls_back_to_issuer() {
        let fake = Arc::new(FakeOcsp::answering(&[
            (LEAF_RESPONDER, FakeAnswer::Unreachable),
            (ISSUER_RESPONDER, FakeAnswer::Status(OcspStatus::Revoked)),
        ]));
        let v = validator(fake.clone(), Arc::new(MemoryDocumentRecords::new()));

        assert_eq!(
            v.check_chain(&chain(true, true)).await,
            CertificateStatus::Revoked
        );
        assert_eq!(
            fake.calls(),
            vec![LEAF_RESPONDER.to_owned(), ISSUER_RESPONDER.to_owned()]
        );
        assert!(logs_contain("unreachable"));
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_leaf_responder_falls_back_to_issuer() {
        let fake = Arc::new(FakeOcsp::answering(&[(
            ISSUER_RESPONDER,
            FakeAnswer::Status(OcspStatus::Good),
        )]));
        let v = validator(fake.clone(), Arc::new(MemoryDocumentRecords::new()));

        assert_eq!(
            v.check_chain(&chain(false, true)).await,
            CertificateStatus::Valid
        );
        assert_eq!(fake.calls(), vec![ISSUER_RESPONDER.to_owned()]);
        assert!(logs_contain("no_responder"));
    }

    #[tokio::test]
    async fn both_attempts_failing_is_unknown() {
        let fake = Arc::new(FakeOcsp::answering(&[
            (LEAF_RESPONDER, FakeAnswer::Unreachable),
            (ISSUER_RESPONDER, FakeAnswer::Unreachable),
        ]));
        let v = validator(fake.clone(), Arc::new(MemoryDocumentRecords::new()));
        assert_eq!(
            v.check_chain(&chain(true, true)).await,
            CertificateStatus::Unknown
        );
        assert_eq!(fake.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn timeout_is_unknown_and_still_recorded() {
        let fake = Arc::new(FakeOcsp::answering(&[(LEAF_RESPONDER, FakeAnswer::Hang)]));
        let records = Arc::new(MemoryDocumentRecords::new());
        let doc = signed_document(chain(true, false));
        records.insert(doc.clone()).await.unwrap();
        let v = validator(fake, records.clone());

        let now = Utc::now();
        let outcome = v.revalidate(&doc, now).await.unwrap();
        assert_eq!(outcome.certificate_status, CertificateStatus::Unknown);

        let stored = records.load(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.certificate_status, CertificateStatus::Unknown);
        assert_eq!(stored.certificate_validated_at, Some(now));
        assert!(logs_contain("timed_out"));
    }

    #[tokio::test]
    async fn revalidate_by_id_checks_document_state() {
        let fake = Arc::new(FakeOcsp::default());
        let records = Arc::new(MemoryDocumentRecords::new());
        let v = validator(fake, records.clone());
        let now = Utc::now();

        let err = v
            .revalidate_by_id(&DocumentId::new().to_string(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::NotFound(_)));

        let unsigned =
            SignableDocument::new_unsigned(ObjectKey::parse("rx/2.pdf").unwrap(), now);
        records.insert(unsigned.clone()).await.unwrap();
        let err = v
            .revalidate_by_id(&unsigned.id.to_string(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::NotSigned(_)));

        let signed = signed_document(Vec::new());
        records.insert(signed.clone()).await.unwrap();
        let outcome = v
            .revalidate_by_id(&signed.id.to_string(), now)
            .await
            .unwrap();
        assert_eq!(outcome.certificate_status, CertificateStatus::Unknown);
        assert_eq!(outcome.certificate_validated_at, now);
    }

    #[tokio::test]
    async fn revocation_never_unsigns() {
        let fake = Arc::new(FakeOcsp::answering(&[(
            LEAF_RESPONDER,
            FakeAnswer::Status(OcspStatus::Revoked),
        )]));
        let records = Arc::new(MemoryDocumentRecords::new());
        let doc = signed_document(chain(true, false));
        records.insert(doc.clone()).await.unwrap();

        validator(fake, records.clone())
            .revalidate(&doc, Utc::now())
            .await
            .unwrap();
        let stored = records.load(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.certificate_status, CertificateStatus::Revoked);
        assert!(stored.is_signed());
        assert_eq!(stored.signed_artifact_key, doc.signed_artifact_key);
    }
}
