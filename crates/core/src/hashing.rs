//! Digests of stored artifacts.

use crate::store::{ArtifactFetcher, ArtifactStore};
use crate::{SigningError, SigningResult};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use vpr_files::ObjectKey;
use vpr_types::Sha256Hex;

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256(bytes: &[u8]) -> Sha256Hex {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    Sha256Hex::from_bytes(&digest)
}

/// Downloads artifacts through a short-lived read URL and hashes them.
#[derive(Clone)]
pub struct HashService {
    artifacts: Arc<dyn ArtifactStore>,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl HashService {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self { artifacts, fetcher }
    }

    /// Computes the SHA-256 of the object stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::Store` if no read URL can be issued and `SigningError::Download`
    /// if the bytes cannot be fetched.
    pub async fn digest_artifact(&self, key: &ObjectKey) -> SigningResult<Sha256Hex> {
        let read_url = self.artifacts.read_url(key).await?;
        let bytes = self
            .fetcher
            .fetch(&read_url.url)
            .await
            .map_err(|e| SigningError::Download(e.to_string()))?;
        Ok(sha256(&bytes))
    }
}
