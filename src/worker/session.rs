//! Upload session shared by every worker of a pipeline run.
//!
//! The session lives behind an async mutex. The first worker that needs
//! it fetches it while the others wait on the lock, so the store sees one
//! `get_upload_url` call per refresh instead of one per worker.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::store::{ObjectStore, UploadSession};

/// Lazily fetched upload session for one bucket.
pub struct SessionCache {
    /// Store that hands out sessions.
    store: Arc<dyn ObjectStore>,
    /// Bucket the sessions upload into.
    bucket_id: String,
    /// Session in use, or `None` until the next fetch.
    current: Mutex<Option<UploadSession>>,
}

impl SessionCache {
    /// Creates an empty cache; the first [`SessionCache::get`] fetches.
    pub fn new(store: Arc<dyn ObjectStore>, bucket_id: impl Into<String>) -> Self {
        Self { store, bucket_id: bucket_id.into(), current: Mutex::new(None) }
    }

    /// Returns the cached session, fetching one first if there is none.
    pub async fn get(&self) -> Result<UploadSession> {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref() {
            return Ok(session.clone());
        }

        debug!(bucket_id = %self.bucket_id, "fetching upload session");
        let session = self.store.get_upload_url(&self.bucket_id).await?;
        *current = Some(session.clone());

        Ok(session)
    }

    /// Drops `used` from the cache unless another worker already replaced it.
    pub async fn invalidate(&self, used: &UploadSession) {
        let mut current = self.current.lock().await;
        if current.as_ref() == Some(used) {
            debug!(bucket_id = %self.bucket_id, "invalidating upload session");
            *current = None;
        }
    }
}
