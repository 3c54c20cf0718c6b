//! Wire types of the B2 v1 JSON API.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Error, Result};

/// Response of `b2_authorize_account`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub account_id: String,
    pub authorization_token: String,
    pub api_url: String,
    pub download_url: String,
}

/// Access level of a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize)]
pub enum BucketType {
    #[strum(serialize = "allPublic")]
    #[serde(rename = "allPublic")]
    AllPublic,

    #[strum(serialize = "allPrivate")]
    #[serde(rename = "allPrivate")]
    AllPrivate,
}

impl BucketType {
    /// Parses the API spelling, rejecting anything else as a configuration error.
    pub fn parse(value: &str) -> Result<Self> {
        Self::from_str(value).map_err(|_| Error::config(format!("invalid bucket type {value:?}: must be allPublic or allPrivate")))
    }
}

impl Default for BucketType {
    fn default() -> Self {
        Self::AllPrivate
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub bucket_id: String,
    pub bucket_name: String,
    #[serde(default)]
    pub bucket_type: String,
    #[serde(default)]
    pub account_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BucketList {
    pub buckets: Vec<Bucket>,
}

/// Bucket-scoped upload endpoint and its short-lived token.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_url: String,
    pub authorization_token: String,
}

/// Metadata of a stored file version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub content_length: u64,
    #[serde(default)]
    pub content_sha1: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub upload_timestamp: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    pub files: Vec<FileInfo>,
    #[serde(default)]
    pub next_file_name: Option<String>,
    #[serde(default)]
    pub next_file_id: Option<String>,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}
