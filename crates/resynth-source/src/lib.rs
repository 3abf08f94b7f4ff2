//! Recovering function text from source files.
//!
//! # Modules
//!
//! - [`analyze`] -- Indentation-based definition range detection
//! - [`cache`] -- Shared, compute-once per-file analysis cache
//! - [`extract`] -- Signature and body extraction for a compiled routine

pub mod analyze;
pub mod cache;
pub mod extract;

pub use analyze::FileAnalysis;
pub use cache::SourceCache;
pub use extract::{extract, split_core, DefaultRenderer, ExtractedFunction};
