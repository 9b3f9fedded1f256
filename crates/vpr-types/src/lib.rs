//! Validated value types shared across the VPR signing crates.
//!
//! Every type here is checked once at construction, so code holding one can rely on its
//! invariant without re-validating:
//! - [`DocumentId`]: canonical 32-character lowercase hex UUID, usable for sharded paths.
//! - [`IdempotencyKey`]: caller-supplied callback token, bounded and printable.
//! - [`Sha256Hex`]: lowercase hex SHA-256 digest.

mod document_id;

pub use document_id::DocumentId;

/// Errors raised when an `Idempotency-Key` header value is rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    /// The input text was empty or contained only whitespace
    #[error("key cannot be empty")]
    Empty,
    /// The input exceeded the maximum accepted length
    #[error("key exceeds {max} characters")]
    TooLong { max: usize },
    /// The input contained characters outside the accepted set
    #[error("key contains characters other than visible ASCII")]
    InvalidCharacters,
}

/// Errors raised when an identifier or digest is not in canonical form.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("document id must be 32 lowercase hex characters without hyphens, got: '{0}'")]
    NotCanonical(String),
    #[error("SHA-256 digest must be 64 lowercase hex characters")]
    InvalidDigest,
}

/// Caller-supplied token carried in the `Idempotency-Key` header of a signature callback.
///
/// Only its identity matters: two callbacks with equal keys are the same logical delivery.
/// Keys are limited to 255 visible ASCII characters so they can be logged and hashed safely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Longest key accepted from a caller.
    pub const MAX_LEN: usize = 255;

    /// Validates a raw header value.
    ///
    /// Surrounding whitespace is trimmed; the remainder must be non-empty, at most
    /// [`Self::MAX_LEN`] bytes and consist of visible ASCII.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(KeyError::TooLong { max: Self::MAX_LEN });
        }
        if !trimmed.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(KeyError::InvalidCharacters);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase hexadecimal SHA-256 digest (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Hex(String);

impl Sha256Hex {
    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut out = String::with_capacity(64);
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        Self(out)
    }

    /// Validates an existing hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidDigest`] unless the input is exactly 64 lowercase hex characters.
    pub fn parse(input: &str) -> Result<Self, IdError> {
        if input.len() == 64 && input.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Ok(Self(input.to_owned()))
        } else {
            Err(IdError::InvalidDigest)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sha256Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for Sha256Hex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Sha256Hex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Sha256Hex::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_accepts_typical_tokens() {
        let key = IdempotencyKey::parse(" cb-2024-01-01:abc_123 ").unwrap();
        assert_eq!(key.as_str(), "cb-2024-01-01:abc_123");
    }

    #[test]
    fn idempotency_key_rejects_empty_long_and_control_chars() {
        assert_eq!(IdempotencyKey::parse(""), Err(KeyError::Empty));
        assert_eq!(
            IdempotencyKey::parse(&"a".repeat(256)),
            Err(KeyError::TooLong { max: 255 })
        );
        assert_eq!(
            IdempotencyKey::parse("has space"),
            Err(KeyError::InvalidCharacters)
        );
        assert_eq!(
            IdempotencyKey::parse("tab\tkey"),
            Err(KeyError::InvalidCharacters)
        );
    }

    #[test]
    fn sha256_hex_from_bytes_is_lowercase_64_chars() {
        let hex = Sha256Hex::from_bytes(&[0xAB; 32]);
        assert_eq!(hex.as_str().len(), 64);
        assert!(hex.as_str().starts_with("abab"));
        assert!(Sha256Hex::parse(hex.as_str()).is_ok());
    }

    #[test]
    fn sha256_hex_parse_rejects_uppercase_and_wrong_length() {
        assert_eq!(Sha256Hex::parse(&"A".repeat(64)), Err(IdError::InvalidDigest));
        assert_eq!(Sha256Hex::parse("abc"), Err(IdError::InvalidDigest));
    }
}
