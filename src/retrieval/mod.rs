//! Sparse retrieval: BM25 over Japanese and mixed-language text
//!
//! Architecture:
//! - Tokenizer: UAX#29 words for Latin text, character bigrams for CJK runs
//! - InvertedIndex: term postings and document length table
//! - Bm25Retriever: thread-safe engine with incremental ingest and batch queries
//! - Snapshots: zstd + MessagePack persistence with BLAKE3 integrity check

mod bm25;
mod document;
mod index;
mod retriever;
mod snapshot;
mod tokenizer;

pub use bm25::{idf, term_score, Bm25Params};
pub use document::{Document, ScoredDocument, SCORE_KEY};
pub use index::{InvertedIndex, Posting};
pub use retriever::{Bm25Retriever, IngestReport, DEFAULT_K};
pub use tokenizer::{Tokenizer, TokenizerConfig};
