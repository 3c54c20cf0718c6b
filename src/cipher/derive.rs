//! # Legacy Password-Based Key Derivation
//!
//! Implements OpenSSL's `EVP_BytesToKey` with MD5 and a single iteration,
//! the scheme `openssl enc -md md5` uses to turn a password and an 8-byte
//! salt into an AES key and IV:
//!
//! ```text
//! d0 = MD5(password || salt)
//! di = MD5(d(i-1) || password || salt)
//! key || iv = prefix of d0 || d1 || ...
//! ```
//!
//! The scheme is weak by modern standards. It is kept because containers
//! must stay decryptable with stock `openssl enc`.

use md5::{Digest, Md5};
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::config::{IV_LEN, KEY_LEN, SALT_LEN};
use crate::error::{Error, Result};
use crate::secret::KeyMaterial;

/// Derives `key_len` key bytes followed by `iv_len` IV bytes.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when either length is zero.
pub fn derive_key_and_iv(password: &[u8], salt: &[u8], key_len: usize, iv_len: usize) -> Result<(Vec<u8>, Vec<u8>)> {
    if key_len == 0 || iv_len == 0 {
        return Err(Error::config(format!("key and iv lengths must be non-zero, got {key_len} and {iv_len}")));
    }

    let total = key_len + iv_len;
    let mut derived = Vec::with_capacity(total + Md5::output_size());
    let mut previous: Vec<u8> = Vec::new();

    while derived.len() < total {
        let mut hasher = Md5::new();
        hasher.update(&previous);
        hasher.update(password);
        hasher.update(salt);
        previous = hasher.finalize().to_vec();
        derived.extend_from_slice(&previous);
    }

    let iv = derived[key_len..total].to_vec();
    derived.truncate(key_len);

    Ok((derived, iv))
}

/// Salt and key material of one encryption session.
///
/// Both passes of an encrypted upload are built from the same `Credentials`
/// so that they produce identical ciphertext.
#[derive(Debug)]
pub struct Credentials {
    salt: [u8; SALT_LEN],
    material: KeyMaterial,
}

impl Credentials {
    /// Derives credentials for a fresh random salt.
    pub fn generate(password: &[u8]) -> Result<Self> {
        Self::derive(password, generate_salt()?)
    }

    /// Derives credentials for a known salt. Deterministic.
    pub fn derive(password: &[u8], salt: [u8; SALT_LEN]) -> Result<Self> {
        let (key, iv) = derive_key_and_iv(password, &salt, KEY_LEN, IV_LEN)?;

        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| Error::config("derived key has the wrong length"))?;
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| Error::config("derived iv has the wrong length"))?;

        Ok(Self { salt, material: KeyMaterial::new(key, iv) })
    }

    #[inline]
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    #[inline]
    pub fn key(&self) -> &[u8; KEY_LEN] {
        self.material.key()
    }

    #[inline]
    pub fn iv(&self) -> &[u8; IV_LEN] {
        self.material.iv()
    }
}

/// Draws a salt from the operating system CSPRNG.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt).map_err(|e| Error::Io(std::io::Error::other(format!("rng failed: {e}"))))?;

    Ok(salt)
}
