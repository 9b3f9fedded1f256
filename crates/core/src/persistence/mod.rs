//! Storage collaborator implementations.
//!
//! - [`memory`]: process-local maps, for tests and embedding.
//! - [`filesystem`]: JSON records under the data directory, used by the binaries.
//! - [`objects`]: the document store over [`vpr_files::ObjectStore`].

pub mod filesystem;
pub mod memory;
pub mod objects;

use crate::StoreError;

/// Runs blocking filesystem work off the async executor.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Backend(format!("blocking storage task failed: {e}")))?
}
