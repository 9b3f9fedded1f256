//! Webhook authentication.
//!
//! Signers send `X-Signature: <hex>` (optionally prefixed with `sha256=`) holding
//! HMAC-SHA256 of the untouched request body under the shared secret. Verification runs on
//! the raw bytes before the body is parsed.

use crate::config::WebhookSecret;
use crate::constants::WEBHOOK_SIGNATURE_PREFIX;
use crate::{SigningError, SigningResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &[u8]) -> SigningResult<HmacSha256> {
    HmacSha256::new_from_slice(secret)
        .map_err(|_| SigningError::InvalidConfig("webhook secret rejected by HMAC".into()))
}

/// Hex HMAC-SHA256 of `body` under `secret`, the value a signer puts in `X-Signature`.
///
/// # Errors
///
/// Returns `SigningError::InvalidConfig` if the secret cannot key the MAC.
pub fn compute_signature(secret: &WebhookSecret, body: &[u8]) -> SigningResult<String> {
    let mut mac = keyed(secret.as_bytes())?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies webhook signatures against the configured secret.
#[derive(Debug, Clone)]
pub struct WebhookAuthenticator {
    secret: Option<WebhookSecret>,
}

impl WebhookAuthenticator {
    pub fn new(secret: Option<WebhookSecret>) -> Self {
        Self { secret }
    }

    /// Checks `signature_header` against the HMAC of `raw_body`.
    ///
    /// # Errors
    ///
    /// - `SigningError::MissingWebhookSecret` when no secret is configured
    /// - `SigningError::Unauthorized` when the header is absent, not hex, or does not match
    pub fn verify(&self, raw_body: &[u8], signature_header: Option<&str>) -> SigningResult<()> {
        let secret = self
            .secret
            .as_ref()
            .ok_or(SigningError::MissingWebhookSecret)?;

        let header = signature_header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(SigningError::Unauthorized)?;
        let hex_part = header
            .strip_prefix(WEBHOOK_SIGNATURE_PREFIX)
            .unwrap_or(header);
        let provided = hex::decode(hex_part).map_err(|_| SigningError::Unauthorized)?;

        let mut mac = keyed(secret.as_bytes())?;
        mac.update(raw_body);
        // Constant-time comparison.
        mac.verify_slice(&provided)
            .map_err(|_| SigningError::Unauthorized)
    }
}
