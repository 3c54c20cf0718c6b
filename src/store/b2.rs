//! Backblaze B2 v1 API client.
//!
//! Account authorization is fetched lazily and cached for the lifetime of
//! the client. A `401` from any call clears the cache so the next call
//! re-authorizes.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{B2_API_PREFIX, B2_AUTHORIZE_URL, CONNECT_TIMEOUT};
use crate::error::{Error, Result};
use crate::file::ensure_destination;
use crate::secret::Password;
use crate::store::types::{ApiError, Authorization, Bucket, BucketList, BucketType, FileInfo, FileList, UploadSession};
use crate::store::{BucketRef, ObjectStore, UploadBody, UploadRequest};

const FILE_NAME_HEADER: &str = "X-Bz-File-Name";
const CONTENT_SHA1_HEADER: &str = "X-Bz-Content-Sha1";

/// Client for the B2 v1 native API.
///
/// Account authorization is requested lazily and cached until a call
/// comes back with `401`.
pub struct B2Client {
    /// Shared connection pool.
    http: Client,
    /// Account id or application key id.
    account_id: String,
    /// Secret half of the credentials.
    application_key: Password,
    /// Current account authorization, if any.
    authorization: Mutex<Option<Authorization>>,
}

impl B2Client {
    /// Creates a client. Nothing is sent until the first call.
    ///
    /// # Arguments
    /// * `account_id` - Account id or application key id.
    /// * `application_key` - The matching application key.
    pub fn new(account_id: impl Into<String>, application_key: Password) -> Result<Self> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self { http, account_id: account_id.into(), application_key, authorization: Mutex::new(None) })
    }

    /// Authorizes the account and replaces any cached authorization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when the credentials are refused.
    pub async fn authorize_account(&self) -> Result<Authorization> {
        let mut cached = self.authorization.lock().await;
        let authorization = self.request_authorization().await?;
        *cached = Some(authorization.clone());

        Ok(authorization)
    }

    /// Returns the cached authorization, authorizing first if there is none.
    ///
    /// The check and the request happen under one lock, so workers that
    /// all find the cache empty after a `401` wait for a single request.
    async fn authorization(&self) -> Result<Authorization> {
        get_or_fetch(&self.authorization, || self.request_authorization()).await
    }

    async fn request_authorization(&self) -> Result<Authorization> {
        let response = self
            .http
            .get(B2_AUTHORIZE_URL)
            .basic_auth(&self.account_id, Some(self.application_key.expose_secret()))
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(api_error(status, &body).1));
        }

        let authorization: Authorization = parse_response(response).await?;
        info!(account = %authorization.account_id, api_url = %authorization.api_url, "authorized account");

        Ok(authorization)
    }

    async fn forget_authorization(&self) {
        debug!("clearing cached account authorization");
        *self.authorization.lock().await = None;
    }

    /// Sends a request, clearing the cached authorization on `401`.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.forget_authorization().await;
        }

        parse_response(response).await
    }

    async fn call<T: DeserializeOwned>(&self, operation: &str, body: Value) -> Result<T> {
        let authorization = self.authorization().await?;
        let url = format!("{}{B2_API_PREFIX}/{operation}", authorization.api_url);

        let request = self.http.post(url).header(AUTHORIZATION, &authorization.authorization_token).json(&body);
        self.send(request).await
    }

    /// Lists every bucket of the account.
    pub async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let authorization = self.authorization().await?;
        let list: BucketList = self.call("b2_list_buckets", json!({ "accountId": authorization.account_id })).await?;

        Ok(list.buckets)
    }

    /// Finds a bucket by id or name; `None` when no bucket matches.
    pub async fn get_bucket_info(&self, bucket: &BucketRef) -> Result<Option<Bucket>> {
        Ok(self.list_buckets().await?.into_iter().find(|candidate| bucket.matches(candidate)))
    }

    /// Creates a bucket.
    ///
    /// # Arguments
    /// * `name` - Globally unique bucket name.
    /// * `bucket_type` - `allPublic` or `allPrivate`.
    ///
    /// # Returns
    /// The bucket as B2 created it.
    pub async fn create_bucket(&self, name: &str, bucket_type: BucketType) -> Result<Bucket> {
        let authorization = self.authorization().await?;
        let body = json!({ "accountId": authorization.account_id, "bucketName": name, "bucketType": bucket_type });

        self.call("b2_create_bucket", body).await
    }

    /// Deletes a bucket; B2 refuses buckets that still hold files.
    pub async fn delete_bucket(&self, bucket: &BucketRef) -> Result<Bucket> {
        let bucket = self.resolve_bucket(bucket).await?;
        let body = json!({ "accountId": bucket.account_id, "bucketId": bucket.bucket_id });

        self.call("b2_delete_bucket", body).await
    }

    /// Changes the bucket type.
    pub async fn update_bucket(&self, bucket: &BucketRef, bucket_type: BucketType) -> Result<Bucket> {
        let bucket = self.resolve_bucket(bucket).await?;
        let body = json!({ "accountId": bucket.account_id, "bucketId": bucket.bucket_id, "bucketType": bucket_type });

        self.call("b2_update_bucket", body).await
    }

    /// One page of file names, starting at `start_file_name` when given.
    pub async fn list_file_names(&self, bucket: &BucketRef, start_file_name: Option<&str>) -> Result<FileList> {
        let bucket = self.resolve_bucket(bucket).await?;

        let mut body = json!({ "bucketId": bucket.bucket_id });
        if let Some(start) = start_file_name {
            body["startFileName"] = json!(start);
        }

        self.call("b2_list_file_names", body).await
    }

    /// One page of file versions, including hidden ones.
    pub async fn list_file_versions(&self, bucket: &BucketRef) -> Result<FileList> {
        let bucket = self.resolve_bucket(bucket).await?;
        self.call("b2_list_file_versions", json!({ "bucketId": bucket.bucket_id })).await
    }

    /// Hides `file_name` so it no longer shows up in name listings.
    pub async fn hide_file(&self, bucket: &BucketRef, file_name: &str) -> Result<FileInfo> {
        let bucket = self.resolve_bucket(bucket).await?;
        self.call("b2_hide_file", json!({ "bucketId": bucket.bucket_id, "fileName": file_name })).await
    }

    /// Deletes one version of a file.
    pub async fn delete_file_version(&self, file_name: &str, file_id: &str) -> Result<FileInfo> {
        self.call("b2_delete_file_version", json!({ "fileName": file_name, "fileId": file_id })).await
    }

    pub async fn get_file_info(&self, file_id: &str) -> Result<FileInfo> {
        self.call("b2_get_file_info", json!({ "fileId": file_id })).await
    }

    /// Looks `file_name` up in the first page of names and fetches its info.
    pub async fn get_file_info_by_name(&self, bucket: &BucketRef, file_name: &str) -> Result<Option<FileInfo>> {
        let list = self.list_file_names(bucket, Some(file_name)).await?;

        match list.files.into_iter().find(|file| file.file_name == file_name) {
            Some(file) => Ok(Some(self.get_file_info(&file.file_id).await?)),
            None => Ok(None),
        }
    }

    /// Downloads `file_name` from `bucket` into `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestinationExists`] when `destination` exists and
    /// `force` is not set. Nothing is requested in that case.
    pub async fn download_file_by_name(&self, bucket: &BucketRef, file_name: &str, destination: &Path, force: bool) -> Result<u64> {
        ensure_destination(destination, force)?;

        let bucket = self.resolve_bucket(bucket).await?;
        let authorization = self.authorization().await?;
        let url = format!("{}/file/{}/{}", authorization.download_url, bucket.bucket_name, urlencoding::encode(file_name));

        self.download(url, &authorization, destination).await
    }

    /// Downloads a file version by id into `destination`.
    ///
    /// # Errors
    ///
    /// Same guard as [`Self::download_file_by_name`].
    pub async fn download_file_by_id(&self, file_id: &str, destination: &Path, force: bool) -> Result<u64> {
        ensure_destination(destination, force)?;

        let authorization = self.authorization().await?;
        let url = format!("{}{B2_API_PREFIX}/b2_download_file_by_id?fileId={}", authorization.download_url, urlencoding::encode(file_id));

        self.download(url, &authorization, destination).await
    }

    async fn download(&self, url: String, authorization: &Authorization, destination: &Path) -> Result<u64> {
        let mut response = self.http.get(url).header(AUTHORIZATION, &authorization.authorization_token).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.forget_authorization().await;
            }
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0u64;

        let copied: Result<()> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(error) = copied {
            drop(file);
            let _ = tokio::fs::remove_file(destination).await;
            return Err(error);
        }

        info!(path = %destination.display(), bytes = written, "downloaded file");
        Ok(written)
    }
}

#[async_trait]
impl ObjectStore for B2Client {
    async fn resolve_bucket(&self, bucket: &BucketRef) -> Result<Bucket> {
        self.get_bucket_info(bucket).await?.ok_or_else(|| Error::config(format!("{bucket} does not exist")))
    }

    async fn get_upload_url(&self, bucket_id: &str) -> Result<UploadSession> {
        debug!(bucket_id, "requesting upload url");
        self.call("b2_get_upload_url", json!({ "bucketId": bucket_id })).await
    }

    async fn upload_file(&self, session: &UploadSession, request: UploadRequest, body: UploadBody) -> Result<FileInfo> {
        let builder = self
            .http
            .post(&session.upload_url)
            .header(AUTHORIZATION, &session.authorization_token)
            .header(FILE_NAME_HEADER, urlencoding::encode(&request.file_name).into_owned())
            .header(CONTENT_TYPE, &request.content_type)
            .header(CONTENT_LENGTH, request.digest.length())
            .header(CONTENT_SHA1_HEADER, request.digest.sha1_hex())
            .body(Body::wrap_stream(body));

        // Upload tokens are not account tokens; a 401 here only invalidates
        // the session, which the caller owns.
        let response = builder.send().await?;
        parse_response(response).await
    }
}

/// Returns the value in `slot`, or fetches and stores one without
/// releasing the lock in between. Failed fetches leave the slot empty.
async fn get_or_fetch<T, F, Fut>(slot: &Mutex<Option<T>>, fetch: F) -> Result<T>
where
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut cached = slot.lock().await;
    if let Some(value) = cached.as_ref() {
        return Ok(value.clone());
    }

    let value = fetch().await?;
    *cached = Some(value.clone());

    Ok(value)
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        return Err(classify_status(status, &String::from_utf8_lossy(&body)));
    }

    Ok(serde_json::from_slice(&body)?)
}

/// Maps a non-success status onto the error taxonomy.
///
/// `401` (expired token), `408`, `429` and every `5xx` are retryable.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> Error {
    let (code, message) = api_error(status, body);

    match status.as_u16() {
        401 | 408 | 429 | 500..=599 => Error::Transient(format!("{status} {code}: {message}")),
        other => Error::Rejected { status: other, code, message },
    }
}

fn api_error(status: StatusCode, body: &str) -> (String, String) {
    match serde_json::from_str::<ApiError>(body) {
        Ok(error) => (error.code, error.message),
        Err(_) => (status.canonical_reason().unwrap_or("unknown").to_owned(), body.trim().to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::tempdir;
    use tokio::task::JoinSet;

    use super::*;

    #[tokio::test]
    async fn test_concurrent_callers_fetch_once() {
        let slot = Arc::new(Mutex::new(None));
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut callers = JoinSet::new();
        for _ in 0..8 {
            let slot = slot.clone();
            let fetches = fetches.clone();
            callers.spawn(async move {
                get_or_fetch(&slot, || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok("token-0".to_owned())
                })
                .await
            });
        }

        while let Some(joined) = callers.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), "token-0");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let slot: Mutex<Option<String>> = Mutex::new(None);

        let failed = get_or_fetch(&slot, || async { Err(Error::Transient("reset".into())) }).await;
        assert!(failed.is_err());
        assert!(slot.lock().await.is_none());

        let token = get_or_fetch(&slot, || async { Ok("token-1".to_owned()) }).await.unwrap();
        assert_eq!(token, "token-1");
        assert_eq!(get_or_fetch(&slot, || async { Ok("token-2".to_owned()) }).await.unwrap(), "token-1");
    }

    #[test]
    fn test_retryable_statuses_are_transient() {
        for status in [401, 408, 429, 500, 503] {
            let status = StatusCode::from_u16(status).unwrap();
            assert!(classify_status(status, "").is_retryable(), "{status}");
        }
    }

    #[test]
    fn test_client_errors_are_rejected() {
        let body = r#"{"status":400,"code":"bad_request","message":"Checksum did not match data received"}"#;

        match classify_status(StatusCode::BAD_REQUEST, body) {
            Error::Rejected { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "bad_request");
                assert!(message.contains("Checksum"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_error_body_keeps_text() {
        match classify_status(StatusCode::NOT_FOUND, "no such thing\n") {
            Error::Rejected { code, message, .. } => {
                assert_eq!(code, "Not Found");
                assert_eq!(message, "no such thing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_download_refuses_existing_destination() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("existing.bin");
        std::fs::write(&destination, b"keep me").unwrap();

        let client = B2Client::new("account", Password::new("key")).unwrap();
        let result = client.download_file_by_id("file-id", &destination, false).await;

        assert!(matches!(result, Err(Error::DestinationExists(path)) if path == destination));
        assert_eq!(std::fs::read(&destination).unwrap(), b"keep me");
    }
}
