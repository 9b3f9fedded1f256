//! Periodic certificate revalidation.
//!
//! [`RevalidationScheduler::run_batch`] is one sweep and is what tests drive directly.
//! [`RevalidationScheduler::spawn`] runs it on a fixed interval for the lifetime of the
//! process. Overlapping sweeps only repeat work, so there is no locking between them.

use crate::config::RevalidationPolicy;
use crate::document::CertificateStatus;
use crate::revocation::OcspValidator;
use crate::store::DocumentRecords;
use crate::SigningResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub selected: usize,
    pub valid: usize,
    pub revoked: usize,
    pub unknown: usize,
    pub failed: usize,
}

pub struct RevalidationScheduler {
    validator: Arc<OcspValidator>,
    records: Arc<dyn DocumentRecords>,
    policy: RevalidationPolicy,
}

impl RevalidationScheduler {
    pub fn new(
        validator: Arc<OcspValidator>,
        records: Arc<dyn DocumentRecords>,
        policy: RevalidationPolicy,
    ) -> Self {
        Self {
            validator,
            records,
            policy,
        }
    }

    pub fn policy(&self) -> &RevalidationPolicy {
        &self.policy
    }

    /// Revalidates up to one batch of stale signed documents.
    ///
    /// Each document runs in its own task; an error or panic is logged and counted as
    /// `failed` without affecting the others.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::Store` only if the candidate selection itself fails.
    pub async fn run_batch(&self, now: DateTime<Utc>) -> SigningResult<BatchReport> {
        let cutoff = now - self.policy.staleness();
        let candidates = self
            .records
            .stale_signed(cutoff, self.policy.batch_size())
            .await?;

        let mut report = BatchReport {
            selected: candidates.len(),
            ..BatchReport::default()
        };

        let mut tasks = Vec::with_capacity(candidates.len());
        for document in candidates {
            let validator = Arc::clone(&self.validator);
            let id = document.id;
            let handle =
                tokio::spawn(async move { validator.revalidate(&document, now).await });
            tasks.push((id, handle));
        }

        for (id, handle) in tasks {
            match handle.await {
                Ok(Ok(outcome)) => match outcome.certificate_status {
                    CertificateStatus::Valid => report.valid += 1,
                    CertificateStatus::Revoked => report.revoked += 1,
                    CertificateStatus::Unknown => report.unknown += 1,
                },
                Ok(Err(err)) => {
                    report.failed += 1;
                    tracing::error!(document_id = %id, "revalidation failed: {}", err);
                }
                Err(join_err) => {
                    report.failed += 1;
                    tracing::error!(document_id = %id, "revalidation task aborted: {}", join_err);
                }
            }
        }

        tracing::info!(
            selected = report.selected,
            valid = report.valid,
            revoked = report.revoked,
            unknown = report.unknown,
            failed = report.failed,
            "revalidation batch complete"
        );
        Ok(report)
    }

    /// Runs [`Self::run_batch`] immediately and then every policy interval.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.policy.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                interval_secs = self.policy.interval().as_secs(),
                batch_size = self.policy.batch_size(),
                "revalidation scheduler started"
            );
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_batch(Utc::now()).await {
                    tracing::error!("revalidation batch could not start: {}", err);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryDocumentRecords;
    use crate::revocation::tests::{chain, signed_document, FakeAnswer, FakeOcsp, LEAF_RESPONDER};
    use std::time::Duration;
    use vpr_ocsp::OcspStatus;

    const PANIC_RESPONDER: &str = "http://ocsp.panics.test/";

    fn scheduler(
        fake: Arc<FakeOcsp>,
        records: Arc<MemoryDocumentRecords>,
        policy: RevalidationPolicy,
    ) -> RevalidationScheduler {
        let validator = Arc::new(OcspValidator::new(
            fake,
            records.clone(),
            Duration::from_secs(10),
        ));
        RevalidationScheduler::new(validator, records, policy)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_failure_does_not_abort_the_batch() {
        let fake = Arc::new(FakeOcsp::answering(&[
            (LEAF_RESPONDER, FakeAnswer::Status(OcspStatus::Good)),
            (PANIC_RESPONDER, FakeAnswer::Panic),
        ]));
        let records = Arc::new(MemoryDocumentRecords::new());

        let good_chain = chain(true, false);
        let mut good_ids = Vec::new();
        for _ in 0..49 {
            let doc = signed_document(good_chain.clone());
            good_ids.push(doc.id);
            records.insert(doc).await.unwrap();
        }
        let bad_chain = {
            let authority =
                vpr_certificates::issue::IssuingAuthority::new("Panic Root", None).unwrap();
            let leaf = authority
                .issue(&vpr_certificates::issue::SignerProfile {
                    name: "Dr Broken",
                    registration_authority: "GMC",
                    registration_number: "0000000",
                    ocsp_url: Some(PANIC_RESPONDER),
                })
                .unwrap();
            vec![leaf.certificate_pem]
        };
        let bad = signed_document(bad_chain);
        records.insert(bad.clone()).await.unwrap();

        let now = Utc::now();
        let report = scheduler(fake, records.clone(), RevalidationPolicy::default())
            .run_batch(now)
            .await
            .unwrap();

        assert_eq!(report.selected, 50);
        assert_eq!(report.valid, 49);
        assert_eq!(report.failed, 1);
        for id in good_ids {
            let doc = records.load(id).await.unwrap().unwrap();
            assert_eq!(doc.certificate_status, CertificateStatus::Valid);
            assert_eq!(doc.certificate_validated_at, Some(now));
        }
        let bad = records.load(bad.id).await.unwrap().unwrap();
        assert_eq!(bad.certificate_validated_at, None);
    }

    #[tokio::test]
    async fn selects_only_stale_signed_documents_up_to_batch_size() {
        let fake = Arc::new(FakeOcsp::default());
        let records = Arc::new(MemoryDocumentRecords::new());
        let now = Utc::now();

        for _ in 0..3 {
            records.insert(signed_document(Vec::new())).await.unwrap();
        }
        let mut fresh = signed_document(Vec::new());
        fresh.certificate_validated_at = Some(now - chrono::Duration::days(1));
        records.insert(fresh).await.unwrap();
        let mut stale = signed_document(Vec::new());
        stale.certificate_validated_at = Some(now - chrono::Duration::days(8));
        records.insert(stale).await.unwrap();

        let policy = RevalidationPolicy::new(Duration::from_secs(60), 2, 7).unwrap();
        let scheduler = scheduler(fake.clone(), records.clone(), policy);

        let first = scheduler.run_batch(now).await.unwrap();
        assert_eq!(first.selected, 2);
        assert_eq!(first.unknown, 2);

        let second = scheduler.run_batch(now).await.unwrap();
        assert_eq!(second.selected, 2);
        let third = scheduler.run_batch(now).await.unwrap();
        assert_eq!(third.selected, 0);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_runs_a_batch_at_startup() {
        let fake = Arc::new(FakeOcsp::default());
        let records = Arc::new(MemoryDocumentRecords::new());
        let doc = signed_document(Vec::new());
        records.insert(doc.clone()).await.unwrap();

        let policy = RevalidationPolicy::new(Duration::from_secs(3600), 50, 7).unwrap();
        let handle = Arc::new(scheduler(fake, records.clone(), policy)).spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let first = records.load(doc.id).await.unwrap().unwrap();
        assert!(first.certificate_validated_at.is_some());

        handle.abort();
    }
}
