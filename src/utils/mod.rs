//! Cross-platform utilities and helpers
//!
//! - [`fs`] - Atomic write-then-rename file operations
//! - [`progress`] - Download progress bar honouring `--no-progress`

pub mod fs;
pub mod progress;

pub use fs::atomic_write;
pub use progress::DownloadProgress;
