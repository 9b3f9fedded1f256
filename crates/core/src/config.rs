//! Signing runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the pipeline. Nothing
//! in this crate reads environment variables during request handling; binaries read them and
//! hand the raw values to the `*_from_env_value` helpers below.

use crate::constants::{
    DEFAULT_OCSP_TIMEOUT, DEFAULT_READ_URL_TTL, DEFAULT_REVALIDATE_BATCH_SIZE,
    DEFAULT_REVALIDATE_INTERVAL, DEFAULT_REVALIDATE_STALE_DAYS,
};
use crate::{SigningError, SigningResult};
use std::time::Duration;
use vpr_types::DocumentId;

/// Shared HMAC secret for webhook verification. Never printed.
#[derive(Clone)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    /// Wraps a non-blank secret.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::InvalidConfig` for an empty or whitespace-only secret.
    pub fn new(secret: impl Into<String>) -> SigningResult<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(SigningError::InvalidConfig(
                "webhook secret cannot be blank".into(),
            ));
        }
        Ok(Self(secret.into_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookSecret(<redacted>)")
    }
}

/// Pipeline configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct SigningConfig {
    public_base_url: String,
    webhook_secret: Option<WebhookSecret>,
    read_url_ttl: Duration,
    ocsp_timeout: Duration,
}

impl SigningConfig {
    /// Create a new `SigningConfig`.
    ///
    /// A missing webhook secret is accepted here; callbacks then fail with
    /// `CONFIGURATION_ERROR` instead of being processed unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::InvalidConfig` if the base URL is not an http(s) URL or a
    /// duration is zero.
    pub fn new(
        public_base_url: impl Into<String>,
        webhook_secret: Option<WebhookSecret>,
        read_url_ttl: Duration,
        ocsp_timeout: Duration,
    ) -> SigningResult<Self> {
        let public_base_url = public_base_url.into().trim().trim_end_matches('/').to_owned();
        if !(public_base_url.starts_with("http://") || public_base_url.starts_with("https://")) {
            return Err(SigningError::InvalidConfig(format!(
                "public base URL must start with http:// or https://, got '{public_base_url}'"
            )));
        }
        if read_url_ttl.is_zero() || ocsp_timeout.is_zero() {
            return Err(SigningError::InvalidConfig(
                "read URL TTL and OCSP timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            public_base_url,
            webhook_secret,
            read_url_ttl,
            ocsp_timeout,
        })
    }

    /// Configuration with default TTLs, for tests and embedding.
    pub fn with_defaults(
        public_base_url: impl Into<String>,
        webhook_secret: Option<WebhookSecret>,
    ) -> SigningResult<Self> {
        Self::new(
            public_base_url,
            webhook_secret,
            DEFAULT_READ_URL_TTL,
            DEFAULT_OCSP_TIMEOUT,
        )
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    pub fn webhook_secret(&self) -> Option<&WebhookSecret> {
        self.webhook_secret.as_ref()
    }

    pub fn read_url_ttl(&self) -> Duration {
        self.read_url_ttl
    }

    pub fn ocsp_timeout(&self) -> Duration {
        self.ocsp_timeout
    }

    /// Deterministic callback endpoint for a document.
    pub fn callback_url(&self, id: DocumentId) -> String {
        format!("{}/signatures/{}/callback", self.public_base_url, id)
    }
}

/// Scheduling parameters for periodic certificate revalidation.
#[derive(Clone, Debug)]
pub struct RevalidationPolicy {
    interval: Duration,
    batch_size: usize,
    staleness: chrono::Duration,
}

impl RevalidationPolicy {
    /// # Errors
    ///
    /// Returns `SigningError::InvalidConfig` if any value is zero.
    pub fn new(interval: Duration, batch_size: usize, stale_days: i64) -> SigningResult<Self> {
        if interval.is_zero() || batch_size == 0 || stale_days <= 0 {
            return Err(SigningError::InvalidConfig(
                "revalidation interval, batch size and staleness must be greater than zero"
                    .into(),
            ));
        }
        Ok(Self {
            interval,
            batch_size,
            staleness: chrono::Duration::days(stale_days),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn staleness(&self) -> chrono::Duration {
        self.staleness
    }
}

impl Default for RevalidationPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REVALIDATE_INTERVAL,
            batch_size: DEFAULT_REVALIDATE_BATCH_SIZE,
            staleness: chrono::Duration::days(DEFAULT_REVALIDATE_STALE_DAYS),
        }
    }
}

/// Parse a positive integer environment value, falling back to `default` when unset or blank.
///
/// # Errors
///
/// Returns `SigningError::InvalidConfig` naming `name` if the value is not a positive integer.
pub fn positive_u64_from_env_value(
    name: &str,
    value: Option<String>,
    default: u64,
) -> SigningResult<u64> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let Some(value) = value else {
        return Ok(default);
    };
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(SigningError::InvalidConfig(format!(
            "{name} must be a positive integer, got '{value}'"
        ))),
    }
}

/// Resolve the webhook secret from its environment value. Unset or blank means "not configured".
pub fn webhook_secret_from_env_value(value: Option<String>) -> Option<WebhookSecret> {
    value.and_then(|v| WebhookSecret::new(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_url_is_derived_from_base_and_id() {
        let cfg = SigningConfig::with_defaults("https://sign.example.test/", None).unwrap();
        let id = DocumentId::parse("0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(
            cfg.callback_url(id),
            "https://sign.example.test/signatures/0123456789abcdef0123456789abcdef/callback"
        );
    }

    #[test]
    fn rejects_non_http_base_url_and_zero_durations() {
        assert!(SigningConfig::with_defaults("ftp://x", None).is_err());
        assert!(SigningConfig::new(
            "http://x",
            None,
            Duration::ZERO,
            Duration::from_secs(1)
        )
        .is_err());
    }

    #[test]
    fn webhook_secret_debug_is_redacted() {
        let secret = WebhookSecret::new("super-secret").unwrap();
        assert!(!format!("{secret:?}").contains("super-secret"));
        assert!(WebhookSecret::new("   ").is_err());
        assert!(webhook_secret_from_env_value(Some(String::new())).is_none());
        assert!(webhook_secret_from_env_value(None).is_none());
    }

    #[test]
    fn positive_env_values() {
        assert_eq!(positive_u64_from_env_value("N", None, 50).unwrap(), 50);
        assert_eq!(
            positive_u64_from_env_value("N", Some(" ".into()), 50).unwrap(),
            50
        );
        assert_eq!(
            positive_u64_from_env_value("N", Some("12".into()), 50).unwrap(),
            12
        );
        assert!(positive_u64_from_env_value("N", Some("0".into()), 50).is_err());
        assert!(positive_u64_from_env_value("N", Some("-3".into()), 50).is_err());
        assert!(positive_u64_from_env_value("N", Some("ten".into()), 50).is_err());
    }

    #[test]
    fn default_policy_matches_documented_values() {
        let policy = RevalidationPolicy::default();
        assert_eq!(policy.interval(), Duration::from_secs(43_200));
        assert_eq!(policy.batch_size(), 50);
        assert_eq!(policy.staleness(), chrono::Duration::days(7));
        assert!(RevalidationPolicy::new(Duration::from_secs(1), 0, 7).is_err());
    }
}
