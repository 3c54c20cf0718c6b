//! Common type definitions for the upload pipeline.
//!
//! - [`UploadMode`]: plain or password-encrypted uploads
//! - [`FileTask`]: one file moving through the worker pool
//! - [`TaskResult`]: outcome of a task, sent back to the pipeline
//! - [`UploadReport`]: what a pipeline run hands back to its caller

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ENCRYPTED_CONTENT_TYPE;
use crate::error::Error;
use crate::file::guess_content_type;
use crate::secret::Password;
use crate::store::FileInfo;

/// How file contents are transmitted.
#[derive(Clone, Debug, Default)]
pub enum UploadMode {
    /// Bytes are sent as they are on disk.
    #[default]
    Plain,

    /// Each file is wrapped in an AES-256-CBC `Salted__` container.
    Encrypted(Arc<Password>),
}

impl UploadMode {
    #[inline]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Plain => "Uploading",
            Self::Encrypted(_) => "Encrypting and uploading",
        }
    }

    /// Content type declared for `path`.
    pub fn content_type(&self, path: &Path) -> String {
        match self {
            Self::Plain => guess_content_type(path),
            Self::Encrypted(_) => ENCRYPTED_CONTENT_TYPE.to_owned(),
        }
    }
}

impl Display for UploadMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of a [`FileTask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InProgress,
    Done,
    Failed,
}

/// A file taken off the queue by a worker.
#[derive(Debug)]
pub struct FileTask {
    pub path: PathBuf,

    /// Attempts started so far.
    pub attempts: u32,

    pub state: TaskState,
}

impl FileTask {
    #[inline]
    pub fn new(path: PathBuf) -> Self {
        Self { path, attempts: 0, state: TaskState::Pending }
    }

    /// Marks the task in progress and returns the number of the new attempt.
    #[inline]
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.state = TaskState::InProgress;
        self.attempts
    }

    #[inline]
    pub fn complete(&mut self) {
        self.state = TaskState::Done;
    }

    #[inline]
    pub fn fail(&mut self) {
        self.state = TaskState::Failed;
    }
}

/// Outcome of one [`FileTask`].
#[derive(Debug)]
pub struct TaskResult {
    pub task: FileTask,
    pub outcome: Result<FileInfo, Error>,
}

impl TaskResult {
    #[inline]
    pub fn ok(task: FileTask, info: FileInfo) -> Self {
        Self { task, outcome: Ok(info) }
    }

    #[inline]
    pub fn err(task: FileTask, error: Error) -> Self {
        Self { task, outcome: Err(error) }
    }
}

#[derive(Debug)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub info: FileInfo,
    pub attempts: u32,
}

#[derive(Debug)]
pub struct FailedUpload {
    pub path: PathBuf,
    pub error: Error,
}

/// Summary of a pipeline run. Completion order is not preserved.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Paths handed to the queue.
    pub submitted: usize,
    pub uploaded: Vec<UploadedFile>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    pub(crate) fn record(&mut self, result: TaskResult) {
        let TaskResult { task, outcome } = result;
        match outcome {
            Ok(info) => self.uploaded.push(UploadedFile { path: task.path, info, attempts: task.attempts }),
            Err(error) => self.failed.push(FailedUpload { path: task.path, error }),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Bytes stored remotely, as reported by the store.
    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded.iter().map(|file| file.info.content_length).sum()
    }
}
