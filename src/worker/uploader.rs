//! Uploads of a single file, with retries.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::prehash::PreparedUpload;
use crate::store::{FileInfo, ObjectStore, UploadRequest, remote_file_name};
use crate::types::{FileTask, TaskResult, UploadMode};
use crate::worker::retry::RetryPolicy;
use crate::worker::session::SessionCache;

/// Uploads one file at a time on behalf of a worker.
///
/// Every worker of a pipeline run shares one `Uploader`, and with it one
/// [`SessionCache`].
pub struct Uploader {
    /// Destination of every request.
    store: Arc<dyn ObjectStore>,
    /// Upload session shared across workers.
    sessions: SessionCache,
    /// Plain or encrypted bodies.
    mode: UploadMode,
    /// Attempt budget and backoff between attempts.
    retry: RetryPolicy,
    /// Plaintext bytes per pulled chunk.
    chunk_size: usize,
}

impl Uploader {
    /// Creates an uploader for the bucket `bucket_id`.
    ///
    /// # Arguments
    /// * `store` - The store that receives the files.
    /// * `bucket_id` - Bucket the upload session is requested for.
    /// * `mode` - Whether bodies are encrypted.
    /// * `retry` - Retry policy for transient failures.
    /// * `chunk_size` - Plaintext bytes per pulled chunk.
    pub fn new(store: Arc<dyn ObjectStore>, bucket_id: &str, mode: UploadMode, retry: RetryPolicy, chunk_size: usize) -> Self {
        let sessions = SessionCache::new(store.clone(), bucket_id);
        Self { store, sessions, mode, retry, chunk_size }
    }

    /// Runs `task` until it succeeds, fails permanently, or runs out of attempts.
    ///
    /// Attempts are strictly sequential. A failed task carries an
    /// [`Error::PermanentUploadFailure`] wrapping the last error.
    pub async fn upload(&self, mut task: FileTask) -> TaskResult {
        loop {
            let attempt = task.begin_attempt();

            let error = match self.attempt(&task.path).await {
                Ok(info) => {
                    task.complete();
                    info!(path = %task.path.display(), file_id = %info.file_id, bytes = info.content_length, attempt, "uploaded");
                    return TaskResult::ok(task, info);
                }
                Err(error) => error,
            };

            if !self.retry.should_retry(attempt, &error) {
                task.fail();
                warn!(path = %task.path.display(), attempts = attempt, %error, "upload failed permanently");
                let error = Error::PermanentUploadFailure { path: task.path.clone(), attempts: attempt, source: Box::new(error) };
                return TaskResult::err(task, error);
            }

            let delay = self.retry.delay(attempt);
            warn!(path = %task.path.display(), attempt, %error, ?delay, "upload attempt failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt: both passes, one request.
    async fn attempt(&self, path: &Path) -> Result<FileInfo> {
        let prepared = match &self.mode {
            UploadMode::Plain => PreparedUpload::plain(path, self.chunk_size).await?,
            UploadMode::Encrypted(password) => PreparedUpload::encrypted(path, password, self.chunk_size).await?,
        };

        let session = self.sessions.get().await?;
        let request = UploadRequest { file_name: remote_file_name(path), content_type: self.mode.content_type(path), digest: prepared.digest };

        let upload = self.store.upload_file(&session, request, prepared.body).await;
        let result = prepared.pump.finish(upload).await;

        if result.as_ref().is_err_and(Error::is_retryable) {
            self.sessions.invalidate(&session).await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::tempdir;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::store::{Bucket, BucketRef, UploadBody, UploadSession};

    /// Rewrites `path` the first time a session is requested, which falls
    /// between the dry pass and the streamed body.
    struct RewritingStore {
        path: PathBuf,
        sessions: AtomicUsize,
        uploads: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for RewritingStore {
        async fn resolve_bucket(&self, _bucket: &BucketRef) -> Result<Bucket> {
            Err(Error::config("unused"))
        }

        async fn get_upload_url(&self, bucket_id: &str) -> Result<UploadSession> {
            let n = self.sessions.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                std::fs::write(&self.path, vec![b'z'; 8192])?;
            }
            Ok(UploadSession { upload_url: format!("https://pod/{bucket_id}"), authorization_token: format!("token-{n}") })
        }

        async fn upload_file(&self, _session: &UploadSession, _request: UploadRequest, mut body: UploadBody) -> Result<FileInfo> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            while let Some(chunk) = body.next().await {
                chunk.map_err(|e| Error::Transient(e.to_string()))?;
            }
            Ok(FileInfo::default())
        }
    }

    #[tokio::test]
    async fn test_changed_body_fails_without_retry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("growing.log");
        std::fs::write(&path, vec![b'a'; 4096]).unwrap();

        let store = Arc::new(RewritingStore { path: path.clone(), sessions: AtomicUsize::new(0), uploads: AtomicUsize::new(0) });
        let uploader = Uploader::new(store.clone(), "b1", UploadMode::Plain, RetryPolicy::immediate(4), 32);

        let result = uploader.upload(FileTask::new(path)).await;

        let Err(Error::PermanentUploadFailure { attempts, source, .. }) = result.outcome else { panic!("expected a permanent failure") };
        assert_eq!(attempts, 1);
        assert!(matches!(*source, Error::PrehashMismatch { .. }));
        assert_eq!(store.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(store.sessions.load(Ordering::SeqCst), 1);
    }
}
