//! BM25SJ: BM25 retriever over a mutable, Japanese-aware corpus
//!
//! Writers (`add_documents`, `remove_documents`) are serialized by a writer
//! mutex and tokenize outside the corpus lock; the corpus write lock is only
//! held while postings are appended and the average length is recomputed.
//! Queries share the read lock, so they always see a whole index.

use crate::config::RetrieverConfig;
use crate::error::{Result, SnappyError};
use crate::retrieval::bm25::{idf, term_score, Bm25Params};
use crate::retrieval::document::{Document, ScoredDocument};
use crate::retrieval::index::InvertedIndex;
use crate::retrieval::tokenizer::{Tokenizer, TokenizerConfig};
use ahash::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

/// Default number of results per query
pub const DEFAULT_K: usize = 4;

/// Outcome of an ingest batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    pub skipped: usize,
}

/// Documents plus the index built over them
#[derive(Debug, Clone, Default)]
pub(crate) struct Corpus {
    pub(crate) documents: Vec<Document>,
    pub(crate) index: InvertedIndex,
    ids: HashMap<String, u32>,
}

impl Corpus {
    /// Rebuild the id lookup; fails on duplicate ids
    pub(crate) fn from_parts(documents: Vec<Document>, index: InvertedIndex) -> Result<Self> {
        let mut ids = HashMap::default();
        for (ordinal, doc) in documents.iter().enumerate() {
            if ids.insert(doc.id.clone(), ordinal as u32).is_some() {
                return Err(SnappyError::Config(format!(
                    "duplicate document id '{}'",
                    doc.id
                )));
            }
        }
        Ok(Self {
            documents,
            index,
            ids,
        })
    }

    fn push(&mut self, document: Document, tokens: &[String]) {
        let ordinal = self.index.insert(tokens);
        self.ids.insert(document.id.clone(), ordinal);
        self.documents.push(document);
    }

    fn search(&self, terms: &[String], limit: usize, params: &Bm25Params) -> Vec<ScoredDocument> {
        let total_docs = self.index.doc_count();
        if total_docs == 0 || terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let avgdl = self.index.avg_doc_length();
        let mut scores: HashMap<u32, f64> = HashMap::default();

        // Terms are visited in query order so per-document sums are reproducible
        for term in terms {
            let postings = self.index.postings(term);
            if postings.is_empty() {
                continue;
            }
            let term_idf = idf(total_docs, postings.len());
            for posting in postings {
                let contribution = term_score(
                    term_idf,
                    posting.term_freq,
                    self.index.doc_length(posting.ordinal),
                    avgdl,
                    params,
                );
                *scores.entry(posting.ordinal).or_insert(0.0) += contribution;
            }
        }

        let mut ranked: Vec<(u32, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(limit);

        ranked
            .into_iter()
            .map(|(ordinal, score)| ScoredDocument::new(&self.documents[ordinal as usize], score))
            .collect()
    }
}

/// Thread-safe BM25 retriever
pub struct Bm25Retriever {
    params: Bm25Params,
    tokenizer: Tokenizer,
    k: AtomicUsize,
    corpus: RwLock<Corpus>,
    writer: Mutex<()>,
}

impl Bm25Retriever {
    /// Build a retriever over `documents`
    ///
    /// Fails if `k1 <= 0`, `b` is outside `[0, 1]` or `k == 0`.
    pub fn new(documents: Vec<Document>, k1: f64, b: f64, k: usize) -> Result<Self> {
        Self::with_tokenizer(
            documents,
            Bm25Params::new(k1, b)?,
            k,
            Tokenizer::default(),
        )
    }

    /// Build with default parameters (k1 = 1.2, b = 0.75, k = 4)
    pub fn from_documents(documents: Vec<Document>) -> Result<Self> {
        Self::with_tokenizer(
            documents,
            Bm25Params::default(),
            DEFAULT_K,
            Tokenizer::default(),
        )
    }

    /// Build from the `[retriever]` configuration section
    pub fn from_config(config: &RetrieverConfig, documents: Vec<Document>) -> Result<Self> {
        Self::with_tokenizer(
            documents,
            Bm25Params::new(config.k1, config.b)?,
            config.k,
            Tokenizer::new(config.tokenizer.clone()),
        )
    }

    pub fn with_tokenizer(
        documents: Vec<Document>,
        params: Bm25Params,
        k: usize,
        tokenizer: Tokenizer,
    ) -> Result<Self> {
        let retriever = Self::empty(params, k, tokenizer)?;
        let report = retriever.add_documents(documents);
        tracing::info!(
            "BM25 retriever built: {} documents indexed, {} skipped",
            report.added,
            report.skipped
        );
        Ok(retriever)
    }

    fn empty(params: Bm25Params, k: usize, tokenizer: Tokenizer) -> Result<Self> {
        params.validate()?;
        validate_k(k)?;
        Ok(Self {
            params,
            tokenizer,
            k: AtomicUsize::new(k),
            corpus: RwLock::new(Corpus::default()),
            writer: Mutex::new(()),
        })
    }

    pub(crate) fn from_corpus(
        params: Bm25Params,
        k: usize,
        tokenizer: TokenizerConfig,
        corpus: Corpus,
    ) -> Result<Self> {
        let retriever = Self::empty(params, k, Tokenizer::new(tokenizer))?;
        *retriever.corpus.write() = corpus;
        Ok(retriever)
    }

    /// Index additional documents
    ///
    /// Documents whose id is already present, or whose text cannot be
    /// tokenized, are skipped with a warning; the rest of the batch is kept.
    pub fn add_documents(&self, documents: Vec<Document>) -> IngestReport {
        let _writer = self.writer.lock();
        let mut report = IngestReport::default();

        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            match self.tokenizer.tokenize(&document.text) {
                Ok(tokens) => prepared.push((document, tokens)),
                Err(e) => {
                    tracing::warn!("Skipping document {}: {}", document.id, e);
                    report.skipped += 1;
                }
            }
        }
        if prepared.is_empty() {
            return report;
        }

        let mut corpus = self.corpus.write();
        let mut batch_ids: HashSet<String> = HashSet::default();
        for (document, tokens) in prepared {
            if corpus.ids.contains_key(&document.id) || !batch_ids.insert(document.id.clone()) {
                tracing::warn!("Skipping document {}: id already indexed", document.id);
                report.skipped += 1;
                continue;
            }
            corpus.push(document, &tokens);
            report.added += 1;
        }
        corpus.index.recompute_average();

        tracing::debug!(
            "Indexed {} documents ({} skipped), corpus size {}",
            report.added,
            report.skipped,
            corpus.documents.len()
        );
        report
    }

    /// Remove documents by id and rebuild the index over what remains
    ///
    /// Returns the number of documents removed. Replacing a document means
    /// removing it and adding the new version.
    pub fn remove_documents(&self, ids: &[&str]) -> Result<usize> {
        let _writer = self.writer.lock();

        let remaining: Vec<Document> = {
            let corpus = self.corpus.read();
            corpus
                .documents
                .iter()
                .filter(|d| !ids.contains(&d.id.as_str()))
                .cloned()
                .collect()
        };
        let removed = self.len() - remaining.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut rebuilt = Corpus::default();
        for document in remaining {
            let tokens = self.tokenizer.tokenize(&document.text)?;
            rebuilt.push(document, &tokens);
        }
        rebuilt.index.recompute_average();

        *self.corpus.write() = rebuilt;
        tracing::debug!("Removed {} documents and rebuilt index", removed);
        Ok(removed)
    }

    /// Top documents for `text`, best first
    ///
    /// `k` overrides the instance default for this call only. Ties keep
    /// insertion order. An empty corpus or no matching term yields an empty
    /// list.
    pub fn query(&self, text: &str, k: Option<usize>) -> Result<Vec<ScoredDocument>> {
        let limit = k.unwrap_or_else(|| self.k());
        if limit == 0 {
            return Ok(Vec::new());
        }
        let terms = self.tokenizer.tokenize(text)?;
        let corpus = self.corpus.read();
        Ok(corpus.search(&terms, limit, &self.params))
    }

    /// Run several queries on the rayon pool; results keep the input order
    pub fn query_batch<S>(&self, queries: &[S], k: Option<usize>) -> Result<Vec<Vec<ScoredDocument>>>
    where
        S: AsRef<str> + Sync,
    {
        queries
            .par_iter()
            .map(|q| self.query(q.as_ref(), k))
            .collect()
    }

    /// Default result count
    pub fn k(&self) -> usize {
        self.k.load(AtomicOrdering::Relaxed)
    }

    /// Change the default result count for future queries
    pub fn set_k(&self, k: usize) -> Result<()> {
        validate_k(k)?;
        self.k.store(k, AtomicOrdering::Relaxed);
        Ok(())
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn len(&self) -> usize {
        self.corpus.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        let corpus = self.corpus.read();
        corpus
            .ids
            .get(id)
            .map(|&ordinal| corpus.documents[ordinal as usize].clone())
    }

    /// All documents in insertion order
    pub fn documents(&self) -> Vec<Document> {
        self.corpus.read().documents.clone()
    }

    pub fn avg_doc_length(&self) -> f64 {
        self.corpus.read().index.avg_doc_length()
    }

    /// Number of documents containing an already-normalized term
    pub fn doc_freq(&self, term: &str) -> usize {
        self.corpus.read().index.doc_freq(term)
    }

    pub(crate) fn with_corpus<R>(&self, f: impl FnOnce(&Corpus) -> R) -> R {
        f(&self.corpus.read())
    }
}

impl fmt::Debug for Bm25Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bm25Retriever")
            .field("params", &self.params)
            .field("k", &self.k())
            .field("documents", &self.len())
            .finish()
    }
}

fn validate_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(SnappyError::invalid_parameter("k", "must be greater than 0"));
    }
    Ok(())
}
