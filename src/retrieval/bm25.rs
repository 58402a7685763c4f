//! BM25 scoring functions.
//!
//! Scores are **higher is better**. All arithmetic is `f64` so that a
//! reloaded snapshot reproduces scores bit for bit.

use crate::error::{Result, SnappyError};
use serde::{Deserialize, Serialize};

/// BM25 parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation. Default 1.2.
    pub k1: f64,
    /// Document-length normalization. Default 0.75.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Params {
    /// Validated constructor: `k1 > 0`, `0 <= b <= 1`
    pub fn new(k1: f64, b: f64) -> Result<Self> {
        let params = Self { k1, b };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 <= 0.0 {
            return Err(SnappyError::invalid_parameter(
                "k1",
                format!("must be a positive number, got {}", self.k1),
            ));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(SnappyError::invalid_parameter(
                "b",
                format!("must be within [0, 1], got {}", self.b),
            ));
        }
        Ok(())
    }
}

/// Inverse document frequency
///
///   IDF(t) = ln((N - n(t) + 0.5) / (n(t) + 0.5) + 1)
///
/// Always positive, even for a term present in every document.
#[must_use]
pub fn idf(total_docs: usize, doc_freq: usize) -> f64 {
    let n = total_docs as f64;
    let df = doc_freq as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Contribution of one query term to one document's score
///
///   IDF(t) * (f * (k1 + 1)) / (f + k1 * (1 - b + b * |D| / avgdl))
#[must_use]
pub fn term_score(
    term_idf: f64,
    term_freq: u32,
    doc_length: u32,
    avg_doc_length: f64,
    params: &Bm25Params,
) -> f64 {
    let tf = f64::from(term_freq);
    let dl = f64::from(doc_length);
    let avgdl = if avg_doc_length > 0.0 {
        avg_doc_length
    } else {
        1.0
    };

    let numerator = tf * (params.k1 + 1.0);
    let denominator = tf + params.k1 * (1.0 - params.b + params.b * dl / avgdl);
    if denominator <= 0.0 {
        return 0.0;
    }

    term_idf * numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_rare_term_higher() {
        assert!(idf(1000, 1) > idf(1000, 100));
        assert!(idf(1000, 100) > idf(1000, 500));
    }

    #[test]
    fn test_idf_all_docs_positive() {
        assert!(idf(10, 10) > 0.0);
    }

    #[test]
    fn test_idf_known_value() {
        // N = 3, n = 1: ln(2.5 / 1.5 + 1)
        let expected = (2.5f64 / 1.5 + 1.0).ln();
        assert!((idf(3, 1) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_term_score_saturates() {
        let params = Bm25Params::default();
        let one = term_score(1.0, 1, 10, 10.0, &params);
        let ten = term_score(1.0, 10, 10, 10.0, &params);
        let hundred = term_score(1.0, 100, 10, 10.0, &params);
        assert!(ten > one);
        assert!(hundred - ten < ten - one);
        assert!(hundred < params.k1 + 1.0);
    }

    #[test]
    fn test_longer_documents_score_lower() {
        let params = Bm25Params::default();
        let short = term_score(1.0, 1, 5, 10.0, &params);
        let long = term_score(1.0, 1, 20, 10.0, &params);
        assert!(short > long);
    }

    #[test]
    fn test_b_zero_ignores_length() {
        let params = Bm25Params::new(1.2, 0.0).unwrap();
        let short = term_score(1.0, 1, 5, 10.0, &params);
        let long = term_score(1.0, 1, 50, 10.0, &params);
        assert!((short - long).abs() < 1e-12);
    }

    #[test]
    fn test_param_validation() {
        assert!(Bm25Params::new(1.2, 0.75).is_ok());
        assert!(Bm25Params::new(0.0, 0.75).is_err());
        assert!(Bm25Params::new(-1.0, 0.75).is_err());
        assert!(Bm25Params::new(f64::NAN, 0.75).is_err());
        assert!(Bm25Params::new(1.2, -0.1).is_err());
        assert!(Bm25Params::new(1.2, 1.1).is_err());
        assert!(Bm25Params::new(1.2, 1.0).is_ok());
    }
}
