//! Validated object keys.

use crate::constants::MAX_KEY_LEN;
use crate::FilesError;
use std::path::PathBuf;

/// A relative, `/`-separated object key.
///
/// Each segment is non-empty, is not `.` or `..`, and uses only ASCII letters, digits, `.`,
/// `_` and `-`. Keys are therefore safe to join onto a filesystem root and to embed in a URL
/// path without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validates `input` as an object key.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidKey`] describing the first rule the input breaks.
    pub fn parse(input: &str) -> Result<Self, FilesError> {
        if input.is_empty() {
            return Err(FilesError::InvalidKey("key is empty".into()));
        }
        if input.len() > MAX_KEY_LEN {
            return Err(FilesError::InvalidKey(format!(
                "key exceeds {MAX_KEY_LEN} characters"
            )));
        }
        for segment in input.split('/') {
            if segment.is_empty() {
                return Err(FilesError::InvalidKey(format!(
                    "empty path segment in '{input}'"
                )));
            }
            if segment == "." || segment == ".." {
                return Err(FilesError::InvalidKey(format!(
                    "relative path segment in '{input}'"
                )));
            }
            if !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
            {
                return Err(FilesError::InvalidKey(format!(
                    "unsupported character in '{input}'"
                )));
            }
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final segment, e.g. `rx-1.pdf` for `prescriptions/rx-1.pdf`.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns a new key with `suffix` appended to the final segment.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidKey`] if the result is not a valid key.
    pub fn with_suffix(&self, suffix: &str) -> Result<Self, FilesError> {
        Self::parse(&format!("{}{}", self.0, suffix))
    }

    pub(crate) fn relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ObjectKey {
    type Err = FilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ObjectKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ObjectKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_nested_keys() {
        let key = ObjectKey::parse("prescriptions/2024/rx-1.pdf").unwrap();
        assert_eq!(key.as_str(), "prescriptions/2024/rx-1.pdf");
        assert_eq!(key.file_name(), "rx-1.pdf");
        assert_eq!(
            key.relative_path(),
            PathBuf::from("prescriptions").join("2024").join("rx-1.pdf")
        );
    }

    #[test]
    fn test_rejects_traversal_and_absolute_keys() {
        for bad in ["", "/etc/passwd", "a/../b", "./a", "a//b", "a/", "..", "a\\b", "a b"] {
            assert!(
                matches!(ObjectKey::parse(bad), Err(FilesError::InvalidKey(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_overlong_key() {
        let long = "a".repeat(MAX_KEY_LEN + 1);
        assert!(ObjectKey::parse(&long).is_err());
        assert!(ObjectKey::parse(&"a".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn test_with_suffix() {
        let key = ObjectKey::parse("docs/rx.pdf").unwrap();
        assert_eq!(key.with_suffix(".p7s").unwrap().as_str(), "docs/rx.pdf.p7s");
    }

    #[test]
    fn test_serde_validates() {
        let ok: ObjectKey = serde_json::from_str("\"a/b.pdf\"").unwrap();
        assert_eq!(ok.as_str(), "a/b.pdf");
        assert!(serde_json::from_str::<ObjectKey>("\"../b.pdf\"").is_err());
    }
}
