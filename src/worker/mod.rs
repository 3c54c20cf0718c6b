//! Bounded-concurrency upload pipeline.
//!
//! ```text
//! PathSelector ──(blocking thread)──▶ bounded queue ──▶ N workers ──▶ results ──▶ UploadReport
//!                                                          │
//!                                                   SessionCache (shared)
//! ```
//!
//! The producer blocks while the queue is full. Workers poll the queue
//! without blocking and idle briefly when it is empty; they exit once the
//! producer is done and the queue is drained. One file's failure never
//! stops its siblings.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use flume::{Receiver, Sender};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cipher::validate_chunk_size;
use crate::config::{CHUNK_SIZE, QUEUE_CAPACITY, WORKER_COUNT};
use crate::error::{Error, Result};
use crate::file::PathSelector;
use crate::store::{BucketRef, ObjectStore};
use crate::types::{FileTask, TaskResult, UploadMode, UploadReport};
use crate::ui::progress::Bar;
use crate::worker::queue::{Dequeue, IdleBackoff, poll};
use crate::worker::uploader::Uploader;

pub mod queue;
pub mod retry;
pub mod session;
pub mod uploader;

pub use retry::RetryPolicy;

/// Runtime knobs of a pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Number of concurrent upload workers.
    pub workers: usize,
    /// Paths that may wait in the queue before discovery blocks.
    pub queue_capacity: usize,
    /// Attempt budget and backoff for each file.
    pub retry: RetryPolicy,
    /// Plaintext bytes per pull; a non-zero multiple of the AES block size.
    pub chunk_size: usize,
    /// Plain or encrypted uploads.
    pub mode: UploadMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: WORKER_COUNT, queue_capacity: QUEUE_CAPACITY, retry: RetryPolicy::default(), chunk_size: CHUNK_SIZE, mode: UploadMode::Plain }
    }
}

impl PipelineConfig {
    /// Rejects settings the pipeline cannot run with.
    ///
    /// # Returns
    /// Ok(()) when the config is usable, or [`Error::Configuration`].
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::config("at least one worker is required"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config("queue capacity must be at least 1"));
        }
        if let UploadMode::Encrypted(password) = &self.mode
            && password.expose_secret().is_empty()
        {
            return Err(Error::config("encryption password must not be empty"));
        }

        self.retry.validate()?;
        validate_chunk_size(self.chunk_size)
    }
}

/// Concurrent upload of a selected tree.
///
/// Runs with:
/// - A blocking producer thread that walks the tree into a bounded queue
/// - `workers` tokio tasks that take paths off the queue and upload them
/// - A collector that folds per-file results into an [`UploadReport`]
pub struct Pipeline {
    /// Destination store.
    store: Arc<dyn ObjectStore>,
    /// Bucket every file goes to, resolved when the run starts.
    bucket: BucketRef,
    /// Concurrency, retry and encryption settings.
    config: PipelineConfig,
    /// Optional file counter.
    progress: Option<Arc<Bar>>,
}

impl Pipeline {
    /// Creates a pipeline without progress output.
    ///
    /// # Arguments
    /// * `store` - The store that receives the files.
    /// * `bucket` - Bucket id or name to upload into.
    /// * `config` - Runtime settings, validated by [`Pipeline::run`].
    pub fn new(store: Arc<dyn ObjectStore>, bucket: BucketRef, config: PipelineConfig) -> Self {
        Self { store, bucket, config, progress: None }
    }

    /// Reports queued and finished files on `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<Bar>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Uploads every path `selector` yields and waits for all workers.
    ///
    /// # Errors
    ///
    /// Configuration problems (including an unknown bucket) are returned
    /// before any worker starts. Per-file failures are not errors; they are
    /// listed in [`UploadReport::failed`].
    pub async fn run(&self, selector: PathSelector) -> Result<UploadReport> {
        self.config.validate()?;
        let bucket = self.store.resolve_bucket(&self.bucket).await?;

        info!(bucket = %bucket.bucket_name, workers = self.config.workers, mode = %self.config.mode, "starting upload pipeline");

        let uploader = Arc::new(Uploader::new(
            self.store.clone(),
            &bucket.bucket_id,
            self.config.mode.clone(),
            self.config.retry,
            self.config.chunk_size,
        ));

        let (queue_sender, queue_receiver) = flume::bounded(self.config.queue_capacity);
        let (result_sender, result_receiver) = flume::unbounded();

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            workers.spawn(work(id, queue_receiver.clone(), uploader.clone(), result_sender.clone()));
        }
        drop(queue_receiver);
        drop(result_sender);

        let progress = self.progress.clone();
        let producer = tokio::task::spawn_blocking(move || produce(&selector, &queue_sender, progress.as_deref()));

        let mut report = UploadReport::default();
        while let Ok(result) = result_receiver.recv_async().await {
            if let Some(bar) = &self.progress {
                bar.add(1);
            }
            report.record(result);
        }

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| Error::Io(io::Error::other(e)))?;
        }
        report.submitted = producer.await.map_err(|e| Error::Io(io::Error::other(e)))?;

        if let Some(bar) = &self.progress {
            bar.finish();
        }
        info!(submitted = report.submitted, uploaded = report.uploaded.len(), failed = report.failed.len(), "upload pipeline finished");

        Ok(report)
    }
}

/// Feeds the queue; returns how many paths were enqueued. Dropping the
/// sender on return tells the workers no more work is coming.
fn produce(selector: &PathSelector, queue: &Sender<PathBuf>, progress: Option<&Bar>) -> usize {
    let mut submitted = 0;

    for path in selector.paths() {
        debug!(path = %path.display(), "queueing");
        if queue.send(path).is_err() {
            warn!("no workers left, stopping discovery");
            break;
        }

        submitted += 1;
        if let Some(bar) = progress {
            bar.add_total(1);
        }
    }

    submitted
}

async fn work(id: usize, queue: Receiver<PathBuf>, uploader: Arc<Uploader>, results: Sender<TaskResult>) {
    let mut idle = IdleBackoff::default();

    loop {
        match poll(&queue) {
            Dequeue::Task(path) => {
                idle.reset();
                let result = uploader.upload(FileTask::new(path)).await;
                if results.send(result).is_err() {
                    break;
                }
            }
            Dequeue::Empty => idle.wait().await,
            Dequeue::Closed => break,
        }
    }

    debug!(worker = id, "worker finished");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use aes::Aes256;
    use async_trait::async_trait;
    use block_padding::{Pkcs7, RawPadding};
    use cbc::cipher::generic_array::GenericArray;
    use cbc::cipher::{BlockDecryptMut, KeyIvInit};
    use tempfile::{TempDir, tempdir};
    use tokio::sync::{Notify, Semaphore};
    use tokio_stream::StreamExt;

    use super::*;
    use crate::cipher::{Credentials, DigestAccumulator, encrypted_len};
    use crate::config::{BLOCK_SIZE, HEADER_LEN, SALT_LEN};
    use crate::file::PathFilter;
    use crate::secret::Password;
    use crate::store::{Bucket, FileInfo, UploadBody, UploadRequest, UploadSession, remote_file_name};

    /// Behaves like B2: verifies length and SHA-1 before storing anything.
    struct MemoryStore {
        transient_failures: AtomicUsize,
        reject: bool,
        resolves: AtomicUsize,
        sessions: AtomicUsize,
        attempts: AtomicUsize,
        tokens: Mutex<Vec<String>>,
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                transient_failures: AtomicUsize::new(0),
                reject: false,
                resolves: AtomicUsize::new(0),
                sessions: AtomicUsize::new(0),
                attempts: AtomicUsize::new(0),
                tokens: Mutex::new(Vec::new()),
                objects: Mutex::new(HashMap::new()),
            }
        }

        fn failing(failures: usize) -> Self {
            Self { transient_failures: AtomicUsize::new(failures), ..Self::new() }
        }

        fn object(&self, name: &str) -> Vec<u8> {
            self.objects.lock().unwrap().get(name).cloned().unwrap()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn resolve_bucket(&self, bucket: &BucketRef) -> Result<Bucket> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            let known = Bucket { bucket_id: "b1".into(), bucket_name: "photos".into(), bucket_type: "allPrivate".into(), account_id: "acct".into() };

            if bucket.matches(&known) { Ok(known) } else { Err(Error::config(format!("{bucket} does not exist"))) }
        }

        async fn get_upload_url(&self, bucket_id: &str) -> Result<UploadSession> {
            let n = self.sessions.fetch_add(1, Ordering::SeqCst);
            Ok(UploadSession { upload_url: format!("https://pod/{bucket_id}"), authorization_token: format!("token-{n}") })
        }

        async fn upload_file(&self, session: &UploadSession, request: UploadRequest, mut body: UploadBody) -> Result<FileInfo> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.tokens.lock().unwrap().push(session.authorization_token.clone());

            if self.reject {
                return Err(Error::Rejected { status: 400, code: "bad_request".into(), message: "no".into() });
            }
            if self.transient_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(Error::Transient("503 service_unavailable".into()));
            }

            let mut bytes = Vec::new();
            while let Some(chunk) = body.next().await {
                bytes.extend_from_slice(&chunk.map_err(|e| Error::Transient(e.to_string()))?);
            }

            let mut digest = DigestAccumulator::new();
            digest.update(&bytes);
            let digest = digest.finalize();
            if !digest.matches(&request.digest) {
                return Err(Error::Rejected { status: 400, code: "bad_request".into(), message: "sha1 mismatch".into() });
            }

            let info = FileInfo {
                file_id: format!("id-{}", request.file_name),
                file_name: request.file_name.clone(),
                content_length: digest.length(),
                content_sha1: digest.sha1_hex(),
                content_type: request.content_type,
                ..FileInfo::default()
            };
            self.objects.lock().unwrap().insert(request.file_name, bytes);

            Ok(info)
        }
    }

    /// Holds every upload until the gate opens.
    struct GatedStore {
        entered: Notify,
        gate: Semaphore,
        uploads: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for GatedStore {
        async fn resolve_bucket(&self, _bucket: &BucketRef) -> Result<Bucket> {
            Ok(Bucket { bucket_id: "b1".into(), bucket_name: "photos".into(), bucket_type: "allPrivate".into(), account_id: "acct".into() })
        }

        async fn get_upload_url(&self, bucket_id: &str) -> Result<UploadSession> {
            Ok(UploadSession { upload_url: format!("https://pod/{bucket_id}"), authorization_token: "token".into() })
        }

        async fn upload_file(&self, _session: &UploadSession, request: UploadRequest, mut body: UploadBody) -> Result<FileInfo> {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await.map_err(|e| Error::Transient(e.to_string()))?;

            while let Some(chunk) = body.next().await {
                chunk?;
            }
            self.uploads.fetch_add(1, Ordering::SeqCst);

            Ok(FileInfo { file_name: request.file_name, content_length: request.digest.length(), ..FileInfo::default() })
        }
    }

    fn fixture(count: usize) -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        for i in 0..count {
            let name = if i % 2 == 0 { format!("file-{i}.txt") } else { format!("nested/file-{i}.bin") };
            fs::write(dir.path().join(name), vec![i as u8; 100 * i + 7]).unwrap();
        }
        dir
    }

    fn selector(dir: &TempDir) -> PathSelector {
        PathSelector::new(dir.path(), PathFilter::default()).unwrap()
    }

    fn config(mode: UploadMode, attempts: u32) -> PipelineConfig {
        PipelineConfig { workers: 3, queue_capacity: 2, retry: RetryPolicy::immediate(attempts), chunk_size: 32, mode }
    }

    fn photos() -> BucketRef {
        BucketRef::Name("photos".into())
    }

    #[tokio::test]
    async fn test_uploads_every_selected_file() {
        let dir = fixture(5);
        let store = Arc::new(MemoryStore::new());
        let progress = Arc::new(Bar::hidden());

        let pipeline = Pipeline::new(store.clone(), photos(), config(UploadMode::Plain, 4)).with_progress(progress.clone());
        let report = pipeline.run(selector(&dir)).await.unwrap();

        assert_eq!(report.submitted, 5);
        assert_eq!(report.uploaded.len(), 5);
        assert!(report.is_success());
        assert_eq!(progress.total(), 5);
        assert_eq!(progress.position(), 5);
        assert_eq!(store.sessions.load(Ordering::SeqCst), 1);

        for file in &report.uploaded {
            assert_eq!(store.object(&remote_file_name(&file.path)), fs::read(&file.path).unwrap());
            assert_eq!(file.attempts, 1);
        }
    }

    #[tokio::test]
    async fn test_encrypted_upload_decrypts_to_original() {
        let dir = fixture(2);
        let store = Arc::new(MemoryStore::new());
        let mode = UploadMode::Encrypted(Arc::new(Password::new("correct horse")));

        let report = Pipeline::new(store.clone(), photos(), config(mode, 4)).run(selector(&dir)).await.unwrap();
        assert_eq!(report.uploaded.len(), 2);

        for file in &report.uploaded {
            let plaintext = fs::read(&file.path).unwrap();
            let container = store.object(&remote_file_name(&file.path));
            assert_eq!(container.len() as u64, encrypted_len(plaintext.len() as u64));
            assert_eq!(&container[..8], b"Salted__");

            let salt: [u8; SALT_LEN] = container[8..HEADER_LEN].try_into().unwrap();
            let creds = Credentials::derive(b"correct horse", salt).unwrap();
            let mut decryptor = cbc::Decryptor::<Aes256>::new_from_slices(creds.key(), creds.iv()).unwrap();
            let mut body = container[HEADER_LEN..].to_vec();
            for block in body.chunks_exact_mut(BLOCK_SIZE) {
                decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            let kept = Pkcs7::raw_unpad(&body[body.len() - BLOCK_SIZE..]).unwrap().len();
            body.truncate(body.len() - BLOCK_SIZE + kept);

            assert_eq!(body, plaintext);
        }
    }

    #[tokio::test]
    async fn test_total_failure_still_terminates() {
        let dir = fixture(6);
        let store = Arc::new(MemoryStore::failing(usize::MAX));

        let report = Pipeline::new(store.clone(), photos(), config(UploadMode::Plain, 3)).run(selector(&dir)).await.unwrap();

        assert_eq!(report.submitted, 6);
        assert!(report.uploaded.is_empty());
        assert_eq!(report.failed.len(), 6);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 18);
        for failed in &report.failed {
            assert!(matches!(&failed.error, Error::PermanentUploadFailure { attempts: 3, source, .. } if source.is_retryable()));
        }
    }

    #[tokio::test]
    async fn test_transient_failure_refreshes_session() {
        let dir = fixture(1);
        let store = Arc::new(MemoryStore::failing(1));

        let report = Pipeline::new(store.clone(), photos(), config(UploadMode::Plain, 4)).run(selector(&dir)).await.unwrap();

        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.uploaded[0].attempts, 2);
        assert_eq!(store.sessions.load(Ordering::SeqCst), 2);
        assert_eq!(*store.tokens.lock().unwrap(), vec!["token-0".to_owned(), "token-1".to_owned()]);
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let dir = fixture(2);
        let store = Arc::new(MemoryStore { reject: true, ..MemoryStore::new() });

        let report = Pipeline::new(store.clone(), photos(), config(UploadMode::Plain, 4)).run(selector(&dir)).await.unwrap();

        assert_eq!(report.failed.len(), 2);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.sessions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_configuration_errors_before_start() {
        let dir = fixture(2);
        let store = Arc::new(MemoryStore::new());

        let no_workers = PipelineConfig { workers: 0, ..config(UploadMode::Plain, 4) };
        let result = Pipeline::new(store.clone(), photos(), no_workers).run(selector(&dir)).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(store.resolves.load(Ordering::SeqCst), 0);

        let odd_chunks = PipelineConfig { chunk_size: 10, ..config(UploadMode::Plain, 4) };
        assert!(matches!(Pipeline::new(store.clone(), photos(), odd_chunks).run(selector(&dir)).await, Err(Error::Configuration(_))));

        let empty_password = config(UploadMode::Encrypted(Arc::new(Password::new(""))), 4);
        assert!(matches!(Pipeline::new(store.clone(), photos(), empty_password).run(selector(&dir)).await, Err(Error::Configuration(_))));

        let missing = BucketRef::Name("missing".into());
        let result = Pipeline::new(store.clone(), missing, config(UploadMode::Plain, 4)).run(selector(&dir)).await;
        assert!(matches!(result, Err(Error::Configuration(_))));

        assert_eq!(store.sessions.load(Ordering::SeqCst), 0);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_producer_waits_for_a_full_queue() {
        let dir = fixture(10);
        let store = Arc::new(GatedStore { entered: Notify::new(), gate: Semaphore::new(0), uploads: AtomicUsize::new(0) });
        let progress = Arc::new(Bar::hidden());
        let settings = PipelineConfig { workers: 1, queue_capacity: 2, ..config(UploadMode::Plain, 1) };

        let pipeline = Pipeline::new(store.clone(), photos(), settings).with_progress(progress.clone());
        let paths = selector(&dir);
        let run = tokio::spawn(async move { pipeline.run(paths).await });

        store.entered.notified().await;

        // The worker holds one file and the queue holds two more.
        let limit = 1 + 2;
        for _ in 0..200 {
            if progress.total() >= limit {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(progress.total(), limit);
        assert_eq!(store.uploads.load(Ordering::SeqCst), 0);

        store.gate.add_permits(1);
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.submitted, 10);
        assert_eq!(report.uploaded.len(), 10);
        assert_eq!(store.uploads.load(Ordering::SeqCst), 10);
        assert_eq!(progress.total(), 10);
        assert_eq!(progress.position(), 10);
    }

    #[tokio::test]
    async fn test_empty_tree_reports_nothing() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());

        let report = Pipeline::new(store.clone(), photos(), config(UploadMode::Plain, 4)).run(selector(&dir)).await.unwrap();

        assert_eq!(report.submitted, 0);
        assert!(report.uploaded.is_empty() && report.failed.is_empty());
    }
}
