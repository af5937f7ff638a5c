// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory Okapi BM25 scorer.
//!
//! The index is a derived cache over the memory table: it can be dropped and
//! rebuilt from the store at any time. IDF uses the `ln(... + 1)` smoothing
//! variant, so it is never negative.

use std::collections::HashMap;

/// Words dropped by [`tokenize`] on both the document and query side.
const STOPWORDS: &[&str] = &[
    "a", "about", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be", "been",
    "being", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "he", "her", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just",
    "me", "my", "no", "not", "of", "on", "or", "our", "over", "she", "so", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "to", "up", "us", "was",
    "we", "were", "what", "when", "where", "which", "who", "whom", "why", "will", "with",
    "would", "you", "your",
];

/// Okapi BM25 constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Document-length normalization.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Split text into index terms.
///
/// Lowercases, turns every non-word character into whitespace, splits,
/// drops stopwords and folds a trailing plural `s` (`cats` -> `cat`) on
/// terms longer than three characters that do not end in `ss`.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| !is_stopword(token))
        .map(fold_plural)
        .collect()
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

fn fold_plural(token: &str) -> String {
    if token.chars().count() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

/// A scored document, identified by its position in the indexed slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Hit {
    pub doc: usize,
    pub score: f64,
}

/// BM25 statistics over a fixed document collection.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    params: Bm25Params,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    idf: HashMap<String, f64>,
    avgdl: f64,
}

impl Bm25Index {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Build an index over `documents` in one go.
    pub fn build<S: AsRef<str>>(params: Bm25Params, documents: &[S]) -> Self {
        let mut index = Self::new(params);
        index.index(documents);
        index
    }

    /// Replace all state with statistics over `documents`.
    pub fn index<S: AsRef<str>>(&mut self, documents: &[S]) {
        self.term_freqs.clear();
        self.doc_lens.clear();
        self.doc_freq.clear();
        self.idf.clear();

        let mut total_len = 0usize;
        for document in documents {
            let terms = tokenize(document.as_ref());
            total_len += terms.len();
            self.doc_lens.push(terms.len());

            let mut tf: HashMap<String, usize> = HashMap::new();
            for term in terms {
                *tf.entry(term).or_insert(0) += 1;
            }
            // Document frequency counts documents, not occurrences.
            for term in tf.keys() {
                *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            self.term_freqs.push(tf);
        }

        let n = self.doc_lens.len() as f64;
        self.avgdl = if self.doc_lens.is_empty() {
            0.0
        } else {
            total_len as f64 / n
        };
        for (term, &df) in &self.doc_freq {
            let df = df as f64;
            self.idf
                .insert(term.clone(), ((n - df + 0.5) / (df + 0.5) + 1.0).ln());
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// IDF of an already-tokenized term, `None` if no document contains it.
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    /// Rank documents against `query`, best first, at most `limit` hits.
    ///
    /// Documents sharing no term with the query are never returned. Equal
    /// scores keep index order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Bm25Hit> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let Bm25Params { k1, b } = self.params;
        let mut hits: Vec<Bm25Hit> = self
            .term_freqs
            .iter()
            .zip(&self.doc_lens)
            .enumerate()
            .filter(|(_, (_, len))| **len > 0)
            .filter_map(|(doc, (tf, &len))| {
                let norm = 1.0 - b + b * (len as f64 / self.avgdl);
                let score: f64 = query_terms
                    .iter()
                    .filter_map(|term| {
                        let tf = *tf.get(term)? as f64;
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        Some(idf * (tf * (k1 + 1.0)) / (tf + k1 * norm))
                    })
                    .sum();
                (score > 0.0).then_some(Bm25Hit { doc, score })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        hits
    }
}
