use std::fmt;

use secrecy::{ExposeSecret, SecretBox, SecretString};

use crate::config::{IV_LEN, KEY_LEN};

/// Password or application key. Only exposed at the point of use.
pub struct Password {
    inner: SecretString,
}

impl Password {
    pub fn new(password: &str) -> Self {
        Self { inner: SecretString::from(password.to_owned()) }
    }

    pub fn from_string(password: String) -> Self {
        Self { inner: SecretString::from(password) }
    }

    pub fn expose_secret(&self) -> &str {
        self.inner.expose_secret()
    }
}

impl From<SecretString> for Password {
    fn from(secret: SecretString) -> Self {
        Self { inner: secret }
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// AES key and CBC IV, zeroized on drop.
pub struct KeyMaterial {
    key: SecretBox<[u8; KEY_LEN]>,
    iv: SecretBox<[u8; IV_LEN]>,
}

impl KeyMaterial {
    pub fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key: SecretBox::new(Box::new(key)), iv: SecretBox::new(Box::new(iv)) }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        self.key.expose_secret()
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        self.iv.expose_secret()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial([... {KEY_LEN} + {IV_LEN} bytes ...])")
    }
}
