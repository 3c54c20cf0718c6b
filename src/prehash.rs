//! Two-pass uploads.
//!
//! B2 wants the exact length and SHA-1 of the body in the request headers,
//! before the body starts streaming. Buffering an encrypted file to learn
//! them would cost its full size in memory, so the file is read twice:
//!
//! 1. A dry pass drives a stream to the end and keeps only its digest.
//! 2. A fresh stream with the same credentials and chunk size is pumped
//!    into the request body.
//!
//! The pump re-hashes pass two as it goes and holds back the final chunk
//! until the digest is confirmed, so a body that diverges from the
//! declared digest never completes. The request is aborted instead and the
//! file fails with [`Error::PrehashMismatch`].

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::cipher::{ChunkStream, ContentDigest, Credentials, DigestAccumulator, PlainStream, StreamCipher};
use crate::config::BODY_CHANNEL_DEPTH;
use crate::error::{Error, Result};
use crate::file::{FileStamp, open_file};
use crate::secret::Password;
use crate::store::UploadBody;

/// Drains `stream` and returns the length and SHA-1 of everything it produced.
pub async fn measure<S: ChunkStream>(mut stream: S) -> Result<ContentDigest> {
    let mut digest = DigestAccumulator::new();
    while let Some(chunk) = stream.next_chunk().await? {
        digest.update(&chunk);
    }

    Ok(digest.finalize())
}

/// Declared digest plus the body that will be verified against it.
pub struct PreparedUpload {
    pub digest: ContentDigest,
    pub body: UploadBody,
    pub pump: BodyPump,
}

impl PreparedUpload {
    /// Prepares an encrypted upload of `path` under a fresh salt.
    pub async fn encrypted(path: &Path, password: &Password, chunk_size: usize) -> Result<Self> {
        let credentials = Credentials::generate(password.expose_secret().as_bytes())?;
        Self::prepare(path, |source| StreamCipher::new(source, &credentials, chunk_size)).await
    }

    /// Prepares a plain upload of `path`.
    pub async fn plain(path: &Path, chunk_size: usize) -> Result<Self> {
        Self::prepare(path, |source| PlainStream::new(source, chunk_size)).await
    }

    async fn prepare<S, F>(path: &Path, open: F) -> Result<Self>
    where
        S: ChunkStream + 'static,
        F: Fn(BufReader<File>) -> Result<S>,
    {
        let stamp = FileStamp::capture(path).await?;
        let digest = measure(open(open_file(path).await?)?).await?;

        // Any write during the dry pass voids the digest, even one that
        // leaves the bytes as they were. The file is measured once more
        // only to report what it holds now.
        if FileStamp::capture(path).await? != stamp {
            let actual = measure(open(open_file(path).await?)?).await?;
            warn!(path = %path.display(), expected = %digest, %actual, "file changed while it was measured");
            return Err(Error::PrehashMismatch { path: path.to_path_buf(), expected: digest, actual });
        }

        debug!(path = %path.display(), %digest, "measured upload body");
        Ok(Self::spawn(path.to_path_buf(), digest, open(open_file(path).await?)?))
    }

    /// Starts pumping `stream` into a new body, verified against `expected`.
    pub(crate) fn spawn<S: ChunkStream + 'static>(path: PathBuf, expected: ContentDigest, stream: S) -> Self {
        let (sender, receiver) = mpsc::channel(BODY_CHANNEL_DEPTH);
        let handle = tokio::spawn(pump(path, expected, stream, sender));

        Self { digest: expected, body: ReceiverStream::new(receiver), pump: BodyPump { handle } }
    }
}

type BodySender = mpsc::Sender<io::Result<Vec<u8>>>;

async fn pump<S: ChunkStream>(path: PathBuf, expected: ContentDigest, mut stream: S, sender: BodySender) -> Result<()> {
    let mut digest = DigestAccumulator::new();
    let mut held: Option<Vec<u8>> = None;

    loop {
        let chunk = match stream.next_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let _ = sender.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                return Err(e.into());
            }
        };

        digest.update(&chunk);
        if digest.length() > expected.length() {
            return abort(&sender, path, expected, digest.finalize()).await;
        }

        if let Some(previous) = held.replace(chunk)
            && sender.send(Ok(previous)).await.is_err()
        {
            // The transport dropped the body; it reports its own error.
            return Ok(());
        }
    }

    let actual = digest.finalize();
    if !actual.matches(&expected) {
        return abort(&sender, path, expected, actual).await;
    }

    if let Some(last) = held {
        let _ = sender.send(Ok(last)).await;
    }

    Ok(())
}

async fn abort(sender: &BodySender, path: PathBuf, expected: ContentDigest, actual: ContentDigest) -> Result<()> {
    warn!(path = %path.display(), %expected, %actual, "upload body diverged from its measured digest");
    let _ = sender.send(Err(io::Error::other("upload body diverged from its measured digest"))).await;

    Err(Error::PrehashMismatch { path, expected, actual })
}

/// Handle on the task feeding an [`UploadBody`].
pub struct BodyPump {
    handle: JoinHandle<Result<()>>,
}

impl BodyPump {
    /// Combines the pump outcome with the upload result. A digest mismatch
    /// takes precedence over whatever the store reported.
    pub async fn finish<T>(self, upload: Result<T>) -> Result<T> {
        let pumped = self.handle.await.map_err(|e| Error::Io(io::Error::other(e)))?;

        match (pumped, upload) {
            (Err(mismatch @ Error::PrehashMismatch { .. }), _) => Err(mismatch),
            (_, Err(e)) | (Err(e), Ok(_)) => Err(e),
            (Ok(()), Ok(value)) => Ok(value),
        }
    }
}
