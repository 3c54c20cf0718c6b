//! Object store seam.
//!
//! The upload pipeline only talks to [`ObjectStore`]. [`B2Client`] is the
//! production implementation; tests drive the pipeline with in-memory
//! stores.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio_stream::wrappers::ReceiverStream;

use crate::cipher::ContentDigest;
use crate::error::{Error, Result};

pub mod b2;
pub mod types;

pub use b2::B2Client;
pub use types::{Authorization, Bucket, BucketType, FileInfo, UploadSession};

/// Request body pulled lazily by the transport.
pub type UploadBody = ReceiverStream<io::Result<Vec<u8>>>;

/// Identifies a bucket by exactly one of its id or name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BucketRef {
    Id(String),
    Name(String),
}

impl BucketRef {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when neither or both are supplied.
    pub fn new(id: Option<String>, name: Option<String>) -> Result<Self> {
        match (id, name) {
            (Some(id), None) => Ok(Self::Id(id)),
            (None, Some(name)) => Ok(Self::Name(name)),
            (None, None) => Err(Error::config("a bucket id or a bucket name is required")),
            (Some(_), Some(_)) => Err(Error::config("supply only one of bucket id and bucket name, not both")),
        }
    }

    pub fn matches(&self, bucket: &Bucket) -> bool {
        match self {
            Self::Id(id) => bucket.bucket_id == *id,
            Self::Name(name) => bucket.bucket_name == *name,
        }
    }
}

impl std::fmt::Display for BucketRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "bucket id {id}"),
            Self::Name(name) => write!(f, "bucket {name}"),
        }
    }
}

/// Headers of a single upload.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub digest: ContentDigest,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Looks up a bucket. A missing bucket is a configuration error.
    async fn resolve_bucket(&self, bucket: &BucketRef) -> Result<Bucket>;

    /// Fetches an upload URL and token for `bucket_id`.
    async fn get_upload_url(&self, bucket_id: &str) -> Result<UploadSession>;

    /// Uploads one object. The store must not keep a partial object when
    /// the body fails or does not match `request.digest`.
    async fn upload_file(&self, session: &UploadSession, request: UploadRequest, body: UploadBody) -> Result<FileInfo>;
}

/// Remote name for a local path: leading `/` and `./` removed, `//` collapsed.
pub fn remote_file_name(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");

    let mut name = String::with_capacity(raw.len());
    for part in raw.split('/').filter(|part| !part.is_empty() && *part != ".") {
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(part);
    }

    name
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_bucket_ref_requires_exactly_one() {
        assert_eq!(BucketRef::new(Some("id".into()), None).unwrap(), BucketRef::Id("id".into()));
        assert_eq!(BucketRef::new(None, Some("photos".into())).unwrap(), BucketRef::Name("photos".into()));
        assert!(matches!(BucketRef::new(None, None), Err(Error::Configuration(_))));
        assert!(matches!(BucketRef::new(Some("id".into()), Some("photos".into())), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_bucket_ref_matches() {
        let bucket = Bucket { bucket_id: "b1".into(), bucket_name: "photos".into(), bucket_type: "allPrivate".into(), account_id: String::new() };
        assert!(BucketRef::Id("b1".into()).matches(&bucket));
        assert!(BucketRef::Name("photos".into()).matches(&bucket));
        assert!(!BucketRef::Name("b1".into()).matches(&bucket));
    }

    #[test]
    fn test_remote_file_name() {
        assert_eq!(remote_file_name(&PathBuf::from("/home/user/a.txt")), "home/user/a.txt");
        assert_eq!(remote_file_name(&PathBuf::from("dir//sub/b.txt")), "dir/sub/b.txt");
        assert_eq!(remote_file_name(&PathBuf::from("plain.txt")), "plain.txt");
        assert_eq!(remote_file_name(&PathBuf::from("./docs/./c.txt")), "docs/c.txt");
    }
}
