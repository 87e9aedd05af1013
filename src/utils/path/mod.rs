//! Path utilities.
//!
//! Pure functions for path manipulation. No side effects.
//!
//! - [`fs`]: Filesystem path normalization (`normalize_path`, `to_slash`, `relative_within`)

pub mod fs;

pub use fs::{normalize_path, relative_within, to_slash};
