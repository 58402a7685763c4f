//! Inverted index: term → postings, plus document length bookkeeping
//!
//! Documents are addressed by ordinal (their insertion position), which is
//! also the tie-break order for equal scores.

use ahash::HashMap;
use serde::{Deserialize, Serialize};

/// One (document, term frequency) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub ordinal: u32,
    pub term_freq: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    /// Postings per term, sorted by ordinal
    postings: HashMap<String, Vec<Posting>>,
    /// Token count per document, indexed by ordinal
    doc_lengths: Vec<u32>,
    total_length: u64,
    avg_doc_length: f64,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tokenized document and return its ordinal.
    ///
    /// The average length is not touched; call [`recompute_average`] once the
    /// batch is in.
    ///
    /// [`recompute_average`]: InvertedIndex::recompute_average
    pub fn insert(&mut self, tokens: &[String]) -> u32 {
        let ordinal = self.doc_lengths.len() as u32;

        let mut freqs: HashMap<&str, u32> = HashMap::default();
        for token in tokens {
            *freqs.entry(token.as_str()).or_insert(0) += 1;
        }
        for (term, term_freq) in freqs {
            self.postings
                .entry(term.to_string())
                .or_default()
                .push(Posting { ordinal, term_freq });
        }

        self.doc_lengths
            .push(u32::try_from(tokens.len()).unwrap_or(u32::MAX));
        ordinal
    }

    /// Recompute the average document length from the full length table
    pub fn recompute_average(&mut self) {
        self.total_length = self.doc_lengths.iter().map(|&l| u64::from(l)).sum();
        self.avg_doc_length = if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.doc_lengths.len() as f64
        };
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of documents containing `term`
    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings(term).len()
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn doc_length(&self, ordinal: u32) -> u32 {
        self.doc_lengths.get(ordinal as usize).copied().unwrap_or(0)
    }

    pub fn avg_doc_length(&self) -> f64 {
        self.avg_doc_length
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Structural checks for an index decoded from disk
    pub fn validate(&self, doc_count: usize) -> Result<(), String> {
        if self.doc_lengths.len() != doc_count {
            return Err(format!(
                "index covers {} documents, store holds {}",
                self.doc_lengths.len(),
                doc_count
            ));
        }

        for (term, postings) in &self.postings {
            let mut previous: Option<u32> = None;
            for posting in postings {
                if posting.ordinal as usize >= doc_count || posting.term_freq == 0 {
                    return Err(format!("invalid posting for term '{}'", term));
                }
                if previous.is_some_and(|p| p >= posting.ordinal) {
                    return Err(format!("postings for term '{}' are not sorted", term));
                }
                previous = Some(posting.ordinal);
            }
        }

        let total: u64 = self.doc_lengths.iter().map(|&l| u64::from(l)).sum();
        if total != self.total_length {
            return Err("total document length does not match length table".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_insert_counts_term_frequency() {
        let mut index = InvertedIndex::new();
        let ordinal = index.insert(&tokens(&["fox", "fox", "dog"]));
        index.recompute_average();

        assert_eq!(ordinal, 0);
        assert_eq!(
            index.postings("fox"),
            &[Posting {
                ordinal: 0,
                term_freq: 2
            }]
        );
        assert_eq!(index.doc_freq("dog"), 1);
        assert_eq!(index.doc_freq("cat"), 0);
        assert_eq!(index.doc_length(0), 3);
    }

    #[test]
    fn test_average_recomputed_over_full_corpus() {
        let mut index = InvertedIndex::new();
        index.insert(&tokens(&["a", "b"]));
        index.recompute_average();
        assert_eq!(index.avg_doc_length(), 2.0);

        index.insert(&tokens(&["a", "b", "c", "d"]));
        index.recompute_average();
        assert_eq!(index.avg_doc_length(), 3.0);
    }

    #[test]
    fn test_empty_index() {
        let mut index = InvertedIndex::new();
        index.recompute_average();
        assert_eq!(index.doc_count(), 0);
        assert_eq!(index.avg_doc_length(), 0.0);
        assert!(index.postings("anything").is_empty());
    }

    #[test]
    fn test_validate() {
        let mut index = InvertedIndex::new();
        index.insert(&tokens(&["a"]));
        index.insert(&tokens(&["a", "b"]));
        index.recompute_average();

        assert!(index.validate(2).is_ok());
        assert!(index.validate(3).is_err());
    }
}
