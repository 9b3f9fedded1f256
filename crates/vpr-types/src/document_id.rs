//! Canonical document identifiers.
//!
//! Signable documents are keyed by a UUID in VPR's canonical storage form: 32 lowercase hex
//! characters with no hyphens (`Uuid::simple()`). Externally supplied ids (URL path segments,
//! CLI arguments) must already be canonical; other spellings are rejected rather than
//! normalised so one document can never be addressed by two different strings.
//!
//! Records are stored under a two-level shard derived from the id:
//! `parent/<id[0..2]>/<id[2..4]>/<id>`.

use crate::IdError;
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Identifier of a signable document, always in canonical form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Allocates a fresh random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identifier that must already be canonical.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::NotCanonical`] for hyphenated, uppercase, short, long or non-hex input.
    pub fn parse(input: &str) -> Result<Self, IdError> {
        if !Self::is_canonical(input) {
            return Err(IdError::NotCanonical(input.to_owned()));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|_| IdError::NotCanonical(input.to_owned()))
    }

    /// Purely syntactic check for the canonical form.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns `parent_dir/<s1>/<s2>/<id>`.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.to_string();
        parent_dir
            .join(&canonical[0..2])
            .join(&canonical[2..4])
            .join(&canonical)
    }

    /// Returns `parent_dir/<s1>/<s2>/<id><suffix>`, for single-file records.
    pub fn sharded_file(&self, parent_dir: &Path, suffix: &str) -> PathBuf {
        let canonical = self.to_string();
        parent_dir
            .join(&canonical[0..2])
            .join(&canonical[2..4])
            .join(format!("{canonical}{suffix}"))
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for DocumentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for DocumentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for DocumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DocumentId::parse(&s).map_err(serde::de::Error::custom)
    }
}
