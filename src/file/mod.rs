//! Local file selection and access.

pub mod discovery;
pub mod filter;
pub mod operations;

pub use discovery::PathSelector;
pub use filter::{FilterRules, PathFilter};
pub use operations::{FileStamp, ensure_destination, guess_content_type, open_file};
