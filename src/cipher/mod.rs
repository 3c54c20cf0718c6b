//! # Client-Side Encryption
//!
//! Everything needed to turn a plaintext file into the byte stream that is
//! actually uploaded:
//!
//! - [`derive`]: legacy MD5 key/IV derivation (`EVP_BytesToKey`)
//! - [`stream`]: pull-based AES-256-CBC container stream and its plain
//!   counterpart
//! - [`hash`]: length and SHA-1 accumulation for the upload headers
//!
//! ## Container Layout
//!
//! ```text
//! offset 0..8   "Salted__"
//! offset 8..16  salt
//! offset 16..   AES-256-CBC(plaintext || PKCS#7 padding)
//! ```
//!
//! The layout is what `openssl enc -aes-256-cbc -md md5` reads and writes.

mod derive;
mod hash;
mod stream;

pub use derive::{Credentials, derive_key_and_iv, generate_salt};
pub use hash::{ContentDigest, DigestAccumulator, SHA1_LEN};
pub use stream::{ByteSource, ChunkStream, CipherState, PlainStream, StreamCipher, collect, encrypted_len, validate_chunk_size};
