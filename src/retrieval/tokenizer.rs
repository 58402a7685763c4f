//! Mixed Japanese / Latin tokenizer
//!
//! Pipeline:
//! 1. Reject texts larger than `max_text_bytes`
//! 2. Fold full-width ASCII and the ideographic space to their narrow forms
//! 3. Lowercase (optional)
//! 4. Split into CJK runs and non-CJK runs
//! 5. Non-CJK runs: UAX#29 word boundaries
//! 6. CJK runs: overlapping character n-grams (bigrams by default), then
//!    every Han character on its own
//!
//! Japanese has no word delimiters, so n-grams stand in for a morphological
//! analyzer. Kanji unigrams keep one-character words such as 山 or 鹿
//! searchable inside longer runs. Token order and duplicates are preserved so callers can count
//! term frequencies.

use crate::error::{Result, SnappyError};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Tokenizer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Lowercase tokens before indexing
    pub lowercase: bool,
    /// Character n-gram size for CJK runs
    pub cjk_ngram: usize,
    /// Also emit each Han character of a CJK run as its own token
    pub cjk_unigrams: bool,
    /// Texts larger than this are refused
    pub max_text_bytes: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            cjk_ngram: 2,
            cjk_unigrams: true,
            max_text_bytes: 1024 * 1024,
        }
    }
}

/// Stateless tokenizer shared by indexing and querying
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Split text into normalized terms
    pub fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        if text.len() > self.config.max_text_bytes {
            return Err(SnappyError::Tokenize(format!(
                "text is {} bytes, limit is {}",
                text.len(),
                self.config.max_text_bytes
            )));
        }

        let mut normalized: String = text.chars().map(fold_width).collect();
        if self.config.lowercase {
            normalized = normalized.to_lowercase();
        }

        let mut tokens = Vec::new();
        let mut run = String::new();
        let mut run_is_cjk = false;

        for c in normalized.chars() {
            let cjk = is_cjk(c);
            if cjk != run_is_cjk && !run.is_empty() {
                self.flush_run(&run, run_is_cjk, &mut tokens);
                run.clear();
            }
            run_is_cjk = cjk;
            run.push(c);
        }
        if !run.is_empty() {
            self.flush_run(&run, run_is_cjk, &mut tokens);
        }

        Ok(tokens)
    }

    fn flush_run(&self, run: &str, cjk: bool, tokens: &mut Vec<String>) {
        if !cjk {
            tokens.extend(run.unicode_words().map(str::to_string));
            return;
        }

        let n = self.config.cjk_ngram.max(1);
        let chars: Vec<char> = run.chars().collect();
        if chars.len() <= n {
            tokens.push(run.to_string());
        } else {
            tokens.extend(chars.windows(n).map(|w| w.iter().collect::<String>()));
        }

        if self.config.cjk_unigrams && n > 1 && chars.len() > 1 {
            tokens.extend(chars.iter().filter(|&&c| is_han(c)).map(char::to_string));
        }
    }
}

/// Map full-width ASCII variants (U+FF01..U+FF5E) and U+3000 to ASCII
fn fold_width(c: char) -> char {
    match c {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        _ => c,
    }
}

/// Han ideographs, kana and the marks that glue them into words
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3005}' | '\u{3006}'           // 々 〆
        | '\u{3040}'..='\u{309F}'         // Hiragana
        | '\u{30A0}'..='\u{30FF}'         // Katakana, including ー
        | '\u{31F0}'..='\u{31FF}'         // Katakana phonetic extensions
        | '\u{3400}'..='\u{4DBF}'         // CJK extension A
        | '\u{4E00}'..='\u{9FFF}'         // CJK unified ideographs
        | '\u{F900}'..='\u{FAFF}'         // CJK compatibility ideographs
        | '\u{FF66}'..='\u{FF9F}'         // Half-width katakana
        | '\u{20000}'..='\u{2FA1F}'       // Supplementary ideographs
    )
}

/// Ideographs only; kana are too frequent to be useful alone
fn is_han(c: char) -> bool {
    matches!(c,
        '\u{3005}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2FA1F}'
    )
}
