use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use tokio::fs::File;
use tokio::io::BufReader;

use crate::config::{AUTO_CONTENT_TYPE, CHUNK_SIZE};
use crate::error::{Error, Result};

/// Opens `path` for a streaming pass.
pub async fn open_file(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).await?;
    Ok(BufReader::with_capacity(CHUNK_SIZE, file))
}

/// Refuses to write to an existing path unless `force` is set.
///
/// Dangling symlinks count as existing.
pub fn ensure_destination(path: &Path, force: bool) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(_) if force => Ok(()),
        Ok(_) => Err(Error::DestinationExists(path.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Size and modification time of a file, taken between the two passes of
/// an upload to spot writers racing the uploader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    pub async fn capture(path: &Path) -> Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(Self { len: meta.len(), modified: meta.modified().ok() })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Content type for a plain upload, `b2/x-auto` when the extension is unknown.
#[must_use]
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path).first_raw().unwrap_or(AUTO_CONTENT_TYPE).to_owned()
}
