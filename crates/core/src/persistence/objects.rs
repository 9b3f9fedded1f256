//! Document store backed by [`vpr_files::ObjectStore`].

use super::blocking;
use crate::fetch::HttpArtifactFetcher;
use crate::store::{ArtifactFetcher, ArtifactStore, FetchError, ReadUrl};
use crate::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use vpr_files::{FilesError, ObjectKey, ObjectStore};

/// Presigns read URLs on the object store and resolves its own links without a network hop.
///
/// URLs not produced by this store are downloaded over HTTP.
#[derive(Debug, Clone)]
pub struct ObjectArtifactStore {
    store: Arc<ObjectStore>,
    ttl: chrono::Duration,
    http: HttpArtifactFetcher,
}

impl ObjectArtifactStore {
    pub fn new(store: Arc<ObjectStore>, ttl: Duration, http: HttpArtifactFetcher) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        Self { store, ttl, http }
    }

    /// The underlying object store, shared with the `/files` read route.
    pub fn object_store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    async fn fetch_local(&self, url: &str, path_and_query: &str) -> Result<Vec<u8>, FetchError> {
        let (raw_key, _) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));
        let key = ObjectKey::parse(raw_key)
            .map_err(|e| FetchError::Rejected(format!("invalid object key: {e}")))?;

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| FetchError::Rejected(format!("invalid read URL: {e}")))?;
        let mut expires = None;
        let mut signature = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "expires" => expires = value.parse::<i64>().ok(),
                "signature" => signature = Some(value.into_owned()),
                _ => {}
            }
        }
        let (Some(expires), Some(signature)) = (expires, signature) else {
            return Err(FetchError::Rejected("read URL is not signed".into()));
        };

        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || {
            store.verify_presigned(&key, expires, &signature, Utc::now())?;
            store.get(&key)
        })
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

        match result {
            Ok(bytes) => Ok(bytes),
            Err(FilesError::NotFound(_)) => Err(FetchError::Status(404)),
            Err(e @ (FilesError::LinkExpired | FilesError::LinkSignatureInvalid)) => {
                Err(FetchError::Rejected(e.to_string()))
            }
            Err(e) => Err(FetchError::Transport(e.to_string())),
        }
    }
}

#[async_trait]
impl ArtifactStore for ObjectArtifactStore {
    async fn read_url(&self, key: &ObjectKey) -> Result<ReadUrl, StoreError> {
        let link = self.store.presign(key, self.ttl, Utc::now());
        Ok(ReadUrl {
            url: link.url,
            expires_in_seconds: link.expires_in_seconds,
        })
    }

    async fn put_object(
        &self,
        key: &ObjectKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        let content_type = content_type.to_owned();
        blocking(move || {
            store.put(&key, &bytes, &content_type)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ArtifactFetcher for ObjectArtifactStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let prefix = self.store.link_prefix();
        match url.strip_prefix(prefix.as_str()) {
            Some(rest) => self.fetch_local(url, rest).await,
            None => self.http.fetch(url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifacts(temp: &TempDir, ttl: Duration) -> ObjectArtifactStore {
        let store =
            ObjectStore::new(temp.path(), "http://127.0.0.1:1", b"link-key".to_vec()).unwrap();
        let http = HttpArtifactFetcher::new(Duration::from_secs(1)).unwrap();
        ObjectArtifactStore::new(Arc::new(store), ttl, http)
    }

    #[tokio::test]
    async fn presigned_url_resolves_locally() {
        let temp = TempDir::new().unwrap();
        let artifacts = artifacts(&temp, Duration::from_secs(300));
        let key = ObjectKey::parse("rx/1.pdf").unwrap();
        artifacts
            .put_object(&key, b"%PDF-1.7".to_vec(), "application/pdf")
            .await
            .unwrap();

        let link = artifacts.read_url(&key).await.unwrap();
        assert_eq!(link.expires_in_seconds, 300);
        assert!(link.url.starts_with("http://127.0.0.1:1/files/rx/1.pdf?"));
        assert_eq!(artifacts.fetch(&link.url).await.unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn tampered_or_missing_links_are_rejected() {
        let temp = TempDir::new().unwrap();
        let artifacts = artifacts(&temp, Duration::from_secs(300));
        let key = ObjectKey::parse("rx/1.pdf").unwrap();

        let link = artifacts.read_url(&key).await.unwrap();
        assert!(matches!(
            artifacts.fetch(&link.url).await,
            Err(FetchError::Status(404))
        ));

        let tampered = link.url.replace("rx/1.pdf", "rx/2.pdf");
        assert!(matches!(
            artifacts.fetch(&tampered).await,
            Err(FetchError::Rejected(_))
        ));

        assert!(matches!(
            artifacts.fetch("http://127.0.0.1:1/files/rx/1.pdf").await,
            Err(FetchError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn foreign_urls_go_over_http() {
        let temp = TempDir::new().unwrap();
        let artifacts = artifacts(&temp, Duration::from_secs(300));
        assert!(matches!(
            artifacts.fetch("http://127.0.0.1:1/elsewhere.pdf").await,
            Err(FetchError::Transport(_))
        ));
    }
}
