//! b2crypt - concurrent, optionally encrypted uploads to Backblaze B2.
//!
//! - AES-256-CBC containers readable by `openssl enc -d -aes-256-cbc -md md5`
//! - Two-pass streaming so the body digest is known before the upload starts
//! - Bounded worker pool with retries and a shared upload session

pub mod app;
pub mod cipher;
pub mod config;
pub mod error;
pub mod file;
pub mod padding;
pub mod prehash;
pub mod secret;
pub mod store;
pub mod types;
pub mod ui;
pub mod worker;

pub use error::{Error, Result};
