//! Okapi BM25 lexical index.
//!
//! An immutable, in-memory inverted index over [`LexicalDocument`]s. Built
//! once per corpus (see [`crate::cache`]) and queried many times.
//!
//! # Scoring
//!
//! ```text
//! score(D, Q) = Σ_{t ∈ Q} IDF(t) · f(t,D)·(k1 + 1) / (f(t,D) + k1·(1 − b + b·|D|/avgdl))
//! IDF(t)      = ln(1 + (N − df(t) + 0.5) / (df(t) + 0.5))
//! ```
//!
//! This IDF variant is never negative, so adding occurrences of a query term
//! to a document never lowers that document's score.
//!
//! # Tokenization
//!
//! Text is lowercased. ASCII alphanumeric runs become word tokens. Runs of
//! Japanese script (hiragana, katakana, CJK ideographs) are split into the
//! growing prefixes of the run plus each character after the second, so a
//! compound like `トヨタ自動車` is findable by `トヨタ` without a dictionary.
//! Everything else separates tokens. One-character ASCII tokens are dropped.
//!
//! [`LexicalDocument`]: crate::text::LexicalDocument

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::RecordType;
use crate::text::LexicalDocument;

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength in `[0, 1]`.
    pub b: f64,
}

impl Bm25Params {
    pub const DEFAULT: Bm25Params = Bm25Params { k1: 1.5, b: 0.75 };
    pub const SHORT_TEXT: Bm25Params = Bm25Params { k1: 1.2, b: 0.5 };
    pub const LONG_TEXT: Bm25Params = Bm25Params { k1: 2.0, b: 1.0 };
    pub const TOPIC: Bm25Params = Bm25Params { k1: 2.0, b: 0.75 };

    /// Parameters used for a record type's index.
    pub fn for_record_type(record_type: RecordType) -> Self {
        match record_type {
            RecordType::Topic => Self::TOPIC,
            _ => Self::DEFAULT,
        }
    }
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A scored document returned by [`Bm25Index::search`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bm25Hit {
    pub id: String,
    pub score: f64,
    /// Query terms present in the document, in query order.
    pub matched_terms: Vec<String>,
}

/// Corpus statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub term_count: usize,
    pub avg_doc_length: f64,
}

#[derive(Debug)]
struct IndexedDoc {
    id: String,
    term_freq: HashMap<String, u32>,
    len: usize,
}

/// Immutable-after-build BM25 index.
#[derive(Debug)]
pub struct Bm25Index {
    params: Bm25Params,
    docs: Vec<IndexedDoc>,
    doc_freq: HashMap<String, u32>,
    total_len: usize,
}

impl Bm25Index {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            docs: Vec::new(),
            doc_freq: HashMap::new(),
            total_len: 0,
        }
    }

    /// Builds an index from documents in order.
    pub fn build<I>(params: Bm25Params, docs: I) -> Self
    where
        I: IntoIterator<Item = LexicalDocument>,
    {
        let mut index = Self::new(params);
        index.add_documents(docs);
        index
    }

    /// Adds one document. Documents whose text is blank or yields no tokens
    /// are ignored.
    pub fn add_document(&mut self, id: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return;
        }

        let mut term_freq: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.clone()).or_insert(0) += 1;
        }
        for term in term_freq.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }

        self.total_len += tokens.len();
        self.docs.push(IndexedDoc {
            id: id.to_string(),
            term_freq,
            len: tokens.len(),
        });
    }

    pub fn add_documents<I>(&mut self, docs: I)
    where
        I: IntoIterator<Item = LexicalDocument>,
    {
        for doc in docs {
            self.add_document(&doc.id, &doc.text);
        }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            document_count: self.docs.len(),
            term_count: self.doc_freq.len(),
            avg_doc_length: self.avg_doc_length(),
        }
    }

    fn avg_doc_length(&self) -> f64 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_len as f64 / self.docs.len() as f64
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Returns up to `top_n` documents containing at least one query term,
    /// by descending score. Equal scores keep insertion order.
    pub fn search(&self, query: &str, top_n: usize) -> Vec<Bm25Hit> {
        if self.docs.is_empty() || top_n == 0 {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let idfs: Vec<f64> = terms.iter().map(|t| self.idf(t)).collect();
        let avgdl = self.avg_doc_length();
        let Bm25Params { k1, b } = self.params;

        let mut hits: Vec<Bm25Hit> = Vec::new();
        for doc in &self.docs {
            let mut score = 0.0;
            let mut matched = Vec::new();
            for (term, idf) in terms.iter().zip(&idfs) {
                let Some(&tf) = doc.term_freq.get(term) else {
                    continue;
                };
                let tf = tf as f64;
                let norm = 1.0 - b + b * doc.len as f64 / avgdl;
                score += idf * (tf * (k1 + 1.0)) / (tf + k1 * norm);
                matched.push(term.clone());
            }
            if !matched.is_empty() {
                hits.push(Bm25Hit {
                    id: doc.id.clone(),
                    score,
                    matched_terms: matched,
                });
            }
        }

        // sort_by is stable: ties stay in insertion order.
        hits.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_n);
        hits
    }
}

fn is_japanese(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{309F}' // hiragana
        | '\u{30A0}'..='\u{30FF}' // katakana
        | '\u{4E00}'..='\u{9FAF}') // CJK unified ideographs
}

/// Splits text into index terms. See the module docs for the rules.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.trim().to_lowercase();
    let mut tokens: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut run = String::new();
    let mut run_len = 0usize;

    for c in lowered.chars() {
        if is_japanese(c) {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            run.push(c);
            run_len += 1;
            if run_len == 1 {
                tokens.push(c.to_string());
            } else {
                tokens.push(run.clone());
                if run_len > 2 {
                    tokens.push(c.to_string());
                }
            }
        } else if c.is_ascii_alphanumeric() {
            run.clear();
            run_len = 0;
            word.push(c);
        } else {
            run.clear();
            run_len = 0;
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }

    tokens.retain(|t| {
        let mut chars = t.chars();
        match (chars.next(), chars.next()) {
            (None, _) => false,
            (Some(c), None) => !c.is_ascii_alphanumeric(),
            _ => true,
        }
    });
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(docs: &[(&str, &str)]) -> Bm25Index {
        let mut index = Bm25Index::new(Bm25Params::DEFAULT);
        for (id, text) in docs {
            index.add_document(id, text);
        }
        index
    }

    #[test]
    fn test_tokenize_ascii_words() {
        assert_eq!(
            tokenize("  Hybrid SEARCH, with BM25 & a vector!  "),
            vec!["hybrid", "search", "with", "bm25", "vector"]
        );
    }

    #[test]
    fn test_tokenize_japanese_run_prefixes() {
        assert_eq!(tokenize("トヨタ"), vec!["ト", "トヨ", "トヨタ", "タ"]);
        assert_eq!(
            tokenize("AI戦略"),
            vec!["ai", "戦", "戦略"],
            "ascii word ends before the run"
        );
    }

    #[test]
    fn test_tokenize_separators_reset_runs() {
        assert_eq!(tokenize("日本 車"), vec!["日", "日本", "車"]);
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("a b c").is_empty());
    }

    #[test]
    fn test_idf_is_non_negative() {
        let index = index_of(&[("1", "alpha beta"), ("2", "alpha gamma"), ("3", "alpha")]);
        assert!(index.idf("alpha") > 0.0);
        assert!(index.idf("missing") > 0.0);
    }

    #[test]
    fn test_search_ranks_by_score_and_reports_terms() {
        let index = index_of(&[
            ("1", "rust async runtime"),
            ("2", "rust rust rust ownership"),
            ("3", "python notebook"),
        ]);
        let hits = index.search("rust ownership", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "2");
        assert_eq!(hits[0].matched_terms, vec!["rust", "ownership"]);
        assert_eq!(hits[1].matched_terms, vec!["rust"]);
    }

    #[test]
    fn test_search_monotonic_in_term_frequency() {
        let base = "graph database storage engine";
        let boosted = "graph graph database storage engine";
        let index = index_of(&[("a", base), ("b", boosted), ("c", "unrelated words here")]);
        let hits = index.search("graph", 10);
        let score = |id: &str| hits.iter().find(|h| h.id == id).unwrap().score;
        assert!(score("b") >= score("a"));
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let index = index_of(&[("x", "same words"), ("y", "same words"), ("z", "same words")]);
        let ids: Vec<_> = index.search("same", 10).into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_search_respects_top_n_and_misses() {
        let index = index_of(&[("1", "alpha"), ("2", "alpha"), ("3", "alpha")]);
        assert_eq!(index.search("alpha", 2).len(), 2);
        assert!(index.search("omega", 10).is_empty());
        assert!(index.search("", 10).is_empty());
        assert!(Bm25Index::new(Bm25Params::DEFAULT).search("alpha", 10).is_empty());
    }

    #[test]
    fn test_blank_documents_are_skipped() {
        let index = index_of(&[("1", "   "), ("2", "real text")]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_japanese_company_query() {
        let index = index_of(&[
            ("1", "トヨタ自動車は日本の自動車メーカーです"),
            ("2", "トヨタは世界最大の自動車メーカーの一つです"),
            ("3", "ホンダも日本の自動車メーカーです"),
            ("4", "日産自動車はトヨタと競合しています"),
            ("5", "自動車産業は日本の主要産業です"),
        ]);
        let hits = index.search("トヨタ", 5);
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids[..2].contains(&"1") && ids[..2].contains(&"2"));
        assert_eq!(ids[2], "4");
        assert!(!ids.contains(&"3") && !ids.contains(&"5"));
    }

    #[test]
    fn test_stats() {
        let index = index_of(&[("1", "alpha beta"), ("2", "beta gamma delta epsilon")]);
        let stats = index.stats();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.term_count, 5);
        assert!((stats.avg_doc_length - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_params_per_record_type() {
        assert_eq!(Bm25Params::for_record_type(RecordType::Topic), Bm25Params::TOPIC);
        assert_eq!(
            Bm25Params::for_record_type(RecordType::Entity),
            Bm25Params::DEFAULT
        );
    }
}
