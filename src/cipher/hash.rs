//! Content digests for the `X-Bz-Content-Sha1` header.
//!
//! B2 validates every upload against a SHA-1 of the exact bytes sent, so the
//! digest here is always taken over the transmitted stream (container header
//! and ciphertext for encrypted uploads), never over the plaintext.

use std::fmt;

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// Size of a SHA-1 digest in bytes.
pub const SHA1_LEN: usize = 20;

/// Length and SHA-1 of a byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentDigest {
    length: u64,
    sha1: [u8; SHA1_LEN],
}

impl ContentDigest {
    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Lowercase hex form expected by the B2 upload header.
    pub fn sha1_hex(&self) -> String {
        hex::encode(self.sha1)
    }

    /// Compares length and digest; the digest comparison is constant-time.
    pub fn matches(&self, other: &Self) -> bool {
        self.length == other.length && bool::from(self.sha1.ct_eq(&other.sha1))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes, sha1 {}", self.length, self.sha1_hex())
    }
}

/// Running length counter and SHA-1 accumulator.
#[derive(Clone, Default)]
pub struct DigestAccumulator {
    hasher: Sha1,
    length: u64,
}

impl DigestAccumulator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.length += chunk.len() as u64;
    }

    /// Bytes seen so far.
    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn finalize(self) -> ContentDigest {
        let mut sha1 = [0u8; SHA1_LEN];
        sha1.copy_from_slice(&self.hasher.finalize());

        ContentDigest { length: self.length, sha1 }
    }
}
