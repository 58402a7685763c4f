//! snappychain - retrieval and component caching for LLM pipelines
//!
//! Provides a BM25 retriever tuned for Japanese and mixed-script text
//! (character n-grams over CJK runs), snapshot persistence for it, a keyed
//! component registry with idle-time expiry, and a small pipeline builder
//! that threads a JSON session through ordered or parallel steps.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod retrieval;

pub use error::{Result, SnappyError};
