//! Process configuration, read once at startup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vpr_core::config::{positive_u64_from_env_value, webhook_secret_from_env_value};
use vpr_core::constants::{
    DEFAULT_DATA_DIR, DEFAULT_OCSP_TIMEOUT, DEFAULT_PUBLIC_BASE_URL, DEFAULT_READ_URL_TTL,
    DEFAULT_REVALIDATE_BATCH_SIZE, DEFAULT_REVALIDATE_INTERVAL, DEFAULT_REVALIDATE_STALE_DAYS,
};
use vpr_core::{
    Collaborators, FilesystemBackend, RevalidationPolicy, SigningConfig, SigningService,
    WebhookSecret,
};
use vpr_ocsp::{HttpOcspClient, DEFAULT_MAX_RESPONSE_AGE};

use crate::AppState;

pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Everything read from `VPR_*` environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub rest_addr: String,
    pub data_dir: PathBuf,
    pub files_signing_key: Vec<u8>,
    /// Oldest OCSP response still trusted.
    pub ocsp_max_age: Duration,
    pub signing: SigningConfig,
    pub policy: RevalidationPolicy,
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> anyhow::Result<Duration> {
    let secs = positive_u64_from_env_value(name, lookup(name), default.as_secs())?;
    Ok(Duration::from_secs(secs))
}

impl Settings {
    /// # Errors
    ///
    /// Returns an error if a numeric variable is not a positive integer or the public base
    /// URL is not http(s).
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves settings through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let rest_addr = lookup("VPR_REST_ADDR").unwrap_or_else(|| DEFAULT_REST_ADDR.into());
        let data_dir =
            PathBuf::from(lookup("VPR_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));
        let public_base_url =
            lookup("VPR_PUBLIC_BASE_URL").unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.into());

        let webhook_secret: Option<WebhookSecret> =
            webhook_secret_from_env_value(lookup("VPR_WEBHOOK_SECRET"));
        if webhook_secret.is_none() {
            tracing::warn!(
                "VPR_WEBHOOK_SECRET is not set; every signature callback will be rejected"
            );
        }

        let files_signing_key = match lookup("VPR_FILES_SIGNING_KEY")
            .filter(|k| !k.trim().is_empty())
        {
            Some(key) => key.into_bytes(),
            None => {
                tracing::info!("VPR_FILES_SIGNING_KEY is not set; using a per-process key");
                rand::random::<[u8; 32]>().to_vec()
            }
        };

        let read_url_ttl = seconds(&lookup, "VPR_READ_URL_TTL_SECS", DEFAULT_READ_URL_TTL)?;
        let ocsp_timeout = seconds(&lookup, "VPR_OCSP_TIMEOUT_SECS", DEFAULT_OCSP_TIMEOUT)?;
        let ocsp_max_age = seconds(&lookup, "VPR_OCSP_MAX_AGE_SECS", DEFAULT_MAX_RESPONSE_AGE)?;
        let interval = seconds(
            &lookup,
            "VPR_REVALIDATE_INTERVAL_SECS",
            DEFAULT_REVALIDATE_INTERVAL,
        )?;
        let batch_size = positive_u64_from_env_value(
            "VPR_REVALIDATE_BATCH_SIZE",
            lookup("VPR_REVALIDATE_BATCH_SIZE"),
            DEFAULT_REVALIDATE_BATCH_SIZE as u64,
        )?;
        let stale_days = positive_u64_from_env_value(
            "VPR_REVALIDATE_STALE_DAYS",
            lookup("VPR_REVALIDATE_STALE_DAYS"),
            DEFAULT_REVALIDATE_STALE_DAYS as u64,
        )?;

        let signing =
            SigningConfig::new(public_base_url, webhook_secret, read_url_ttl, ocsp_timeout)?;
        let policy = RevalidationPolicy::new(
            interval,
            usize::try_from(batch_size)?,
            i64::try_from(stale_days)?,
        )?;

        Ok(Self {
            rest_addr,
            data_dir,
            files_signing_key,
            ocsp_max_age,
            signing,
            policy,
        })
    }

    /// Opens the filesystem stores under the data directory and wires the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory does not exist or a store cannot be opened.
    pub fn open_state(&self) -> anyhow::Result<AppState> {
        if !self.data_dir.is_dir() {
            anyhow::bail!("Data directory does not exist: {}", self.data_dir.display());
        }
        let backend = FilesystemBackend::open(
            &self.data_dir,
            self.signing.public_base_url(),
            self.signing.read_url_ttl(),
            self.files_signing_key.clone(),
            self.signing.ocsp_timeout(),
        )?;
        let ocsp = HttpOcspClient::new(self.signing.ocsp_timeout())?
            .with_max_response_age(self.ocsp_max_age);

        let files = Arc::clone(backend.objects.object_store());
        let service = SigningService::new(
            self.signing.clone(),
            Collaborators {
                records: backend.records,
                idempotency: backend.idempotency,
                audit: backend.audit,
                artifacts: backend.objects.clone(),
                fetcher: backend.objects,
                ocsp: Arc::new(ocsp),
            },
        );
        Ok(AppState::new(service, files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.rest_addr, DEFAULT_REST_ADDR);
        assert_eq!(settings.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(settings.signing.public_base_url(), DEFAULT_PUBLIC_BASE_URL);
        assert!(settings.signing.webhook_secret().is_none());
        assert_eq!(settings.signing.read_url_ttl(), Duration::from_secs(300));
        assert_eq!(settings.policy.batch_size(), 50);
        assert_eq!(settings.policy.interval(), Duration::from_secs(43_200));
        assert_eq!(settings.files_signing_key.len(), 32);
        assert_eq!(settings.ocsp_max_age, DEFAULT_MAX_RESPONSE_AGE);
    }

    #[test]
    fn explicit_values_are_used() {
        let settings = Settings::from_lookup(lookup(&[
            ("VPR_PUBLIC_BASE_URL", "https://sign.example/"),
            ("VPR_WEBHOOK_SECRET", "whsec"),
            ("VPR_FILES_SIGNING_KEY", "files-key"),
            ("VPR_REVALIDATE_BATCH_SIZE", "10"),
            ("VPR_OCSP_TIMEOUT_SECS", "3"),
            ("VPR_OCSP_MAX_AGE_SECS", "86400"),
        ]))
        .unwrap();
        assert_eq!(settings.signing.public_base_url(), "https://sign.example");
        assert!(settings.signing.webhook_secret().is_some());
        assert_eq!(settings.files_signing_key, b"files-key");
        assert_eq!(settings.policy.batch_size(), 10);
        assert_eq!(settings.signing.ocsp_timeout(), Duration::from_secs(3));
        assert_eq!(settings.ocsp_max_age, Duration::from_secs(86_400));
    }

    #[test]
    fn invalid_numbers_fail_startup() {
        for (name, value) in [
            ("VPR_READ_URL_TTL_SECS", "0"),
            ("VPR_REVALIDATE_STALE_DAYS", "seven"),
            ("VPR_REVALIDATE_INTERVAL_SECS", "-5"),
        ] {
            assert!(Settings::from_lookup(lookup(&[(name, value)])).is_err());
        }
    }

    #[test]
    fn open_state_requires_data_dir() {
        let settings =
            Settings::from_lookup(lookup(&[("VPR_DATA_DIR", "/definitely/not/here")])).unwrap();
        assert!(settings.open_state().is_err());
    }
}
