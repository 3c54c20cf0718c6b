//! User interface components for terminal interaction.
//!
//! - [`display`]: upload reports and bucket/file listings
//! - [`progress`]: file counter for pipeline runs
//! - [`prompt`]: password prompt with confirmation

pub mod display;
pub mod progress;
pub mod prompt;

pub use display::{show_buckets, show_files, show_report, show_success};
