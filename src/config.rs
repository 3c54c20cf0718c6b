//! Global Configuration Constants
//!
//! Cryptographic parameters of the container format, pipeline defaults and
//! B2 API endpoints. Runtime overrides live in
//! [`PipelineConfig`](crate::worker::PipelineConfig).
//!
//! ## Compatibility
//!
//! The container constants reproduce `openssl enc -aes-256-cbc -md md5`
//! output bit-for-bit. Changing any of them breaks interoperability with
//! objects already in the bucket.

use std::time::Duration;

/// Application name used in user interfaces.
pub const APP_NAME: &str = "b2crypt";

// === Container Format ===

/// Marker written at offset 0 of every encrypted object.
pub const SALT_MAGIC: &[u8; 8] = b"Salted__";

/// Length of the random salt following the marker.
pub const SALT_LEN: usize = 8;

/// Length of the fixed container header (marker plus salt).
pub const HEADER_LEN: usize = SALT_MAGIC.len() + SALT_LEN;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES block size, also the CBC IV length.
pub const BLOCK_SIZE: usize = 16;

/// CBC initialization vector length.
pub const IV_LEN: usize = BLOCK_SIZE;

/// Plaintext bytes requested per pull.
///
/// Both passes of an upload must use the same value, otherwise the emitted
/// chunk boundaries (and therefore the pass-two verification) diverge.
pub const CHUNK_SIZE: usize = 1024 * BLOCK_SIZE;

/// Minimum password length accepted by the interactive prompt.
pub const PASSWORD_MIN_LENGTH: usize = 8;

// === Upload Pipeline ===

/// Capacity of the bounded upload queue.
pub const QUEUE_CAPACITY: usize = 48;

/// Number of upload workers started per pipeline run.
pub const WORKER_COUNT: usize = QUEUE_CAPACITY;

/// Attempts per file before it is marked permanently failed.
pub const MAX_ATTEMPTS: u32 = 4;

/// First retry delay; doubled on every further failure.
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the retry delay before jitter.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(16);

/// First idle wait when a worker finds the queue empty.
pub const IDLE_MIN: Duration = Duration::from_millis(10);

/// Upper bound for the idle wait.
pub const IDLE_MAX: Duration = Duration::from_millis(250);

/// Chunks buffered between the body pump and the HTTP transport.
pub const BODY_CHANNEL_DEPTH: usize = 4;

// === B2 API ===

/// Account authorization endpoint.
pub const B2_AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v1/b2_authorize_account";

/// Prefix of every versioned API call.
pub const B2_API_PREFIX: &str = "/b2api/v1";

/// Content type for encrypted containers.
pub const ENCRYPTED_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type that asks B2 to detect the type from the file name.
pub const AUTO_CONTENT_TYPE: &str = "b2/x-auto";

/// Connect timeout for the HTTP client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

