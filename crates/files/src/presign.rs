//! HMAC-signed, expiring read links.

use crate::{FilesError, ObjectKey};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// A time-limited read link for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: i64,
}

pub(crate) fn keyed(signing_key: &[u8]) -> Result<HmacSha256, FilesError> {
    HmacSha256::new_from_slice(signing_key).map_err(|_| FilesError::InvalidSigningKey)
}

fn mac(keyed: &HmacSha256, key: &ObjectKey, expires: i64) -> HmacSha256 {
    let mut mac = keyed.clone();
    mac.update(key.as_str().as_bytes());
    mac.update(b"\n");
    mac.update(expires.to_string().as_bytes());
    mac
}

pub(crate) fn sign(signing_key: &HmacSha256, key: &ObjectKey, expires: i64) -> String {
    hex::encode(mac(signing_key, key, expires).finalize().into_bytes())
}

pub(crate) fn verify(
    signing_key: &HmacSha256,
    key: &ObjectKey,
    expires: i64,
    signature_hex: &str,
    now: DateTime<Utc>,
) -> Result<(), FilesError> {
    let provided = hex::decode(signature_hex).map_err(|_| FilesError::LinkSignatureInvalid)?;
    mac(signing_key, key, expires)
        .verify_slice(&provided)
        .map_err(|_| FilesError::LinkSignatureInvalid)?;
    if now.timestamp() > expires {
        return Err(FilesError::LinkExpired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(bytes: &[u8]) -> HmacSha256 {
        keyed(bytes).unwrap()
    }

    #[test]
    fn test_sign_is_deterministic_and_key_bound() {
        let key = ObjectKey::parse("a/b.pdf").unwrap();
        let other = ObjectKey::parse("a/c.pdf").unwrap();
        assert_eq!(sign(&k(b"k"), &key, 100), sign(&k(b"k"), &key, 100));
        assert_ne!(sign(&k(b"k"), &key, 100), sign(&k(b"k"), &other, 100));
        assert_ne!(sign(&k(b"k"), &key, 100), sign(&k(b"k"), &key, 101));
        assert_ne!(sign(&k(b"k"), &key, 100), sign(&k(b"j"), &key, 100));
    }

    #[test]
    fn test_verify_checks_signature_before_expiry() {
        let key = ObjectKey::parse("a/b.pdf").unwrap();
        let now = DateTime::from_timestamp(1_000, 0).unwrap();
        let good = sign(&k(b"k"), &key, 1_100);

        assert!(verify(&k(b"k"), &key, 1_100, &good, now).is_ok());
        assert!(matches!(
            verify(&k(b"k"), &key, 1_100, "zz", now),
            Err(FilesError::LinkSignatureInvalid)
        ));
        assert!(matches!(
            verify(&k(b"k"), &key, 1_200, &good, now),
            Err(FilesError::LinkSignatureInvalid)
        ));

        let stale = sign(&k(b"k"), &key, 900);
        assert!(matches!(
            verify(&k(b"k"), &key, 900, &stale, now),
            Err(FilesError::LinkExpired)
        ));
    }
}
