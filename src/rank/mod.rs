//! Result ranking for hybrid retrieval
//!
//! This module handles:
//! - Reciprocal rank fusion of several ranked candidate lists
//! - Simplified BM25 keyword scoring with a boost for code-like tokens
//! - Numeric column ordering (see [`numeric`])

pub mod numeric;

use regex::Regex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::OnceLock;

/// Extra lexical score for a row containing any code-like query token
pub const CODE_TOKEN_BOOST: f32 = 0.7;

/// Maximum number of code-like tokens taken from a query
const MAX_CODE_TOKENS: usize = 5;

/// Fuse ranked lists (best first) into `id -> score`.
///
/// Each list contributes `1 / (k + rank)` per id, with 1-based ranks; an id
/// absent from a list gets nothing from it.
pub fn rrf_fuse<T>(lists: &[Vec<T>], k: u32) -> HashMap<T, f64>
where
    T: Eq + Hash + Clone,
{
    let mut scores: HashMap<T, f64> = HashMap::new();
    for list in lists {
        for (position, id) in list.iter().enumerate() {
            let rank = (position + 1) as f64;
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (k as f64 + rank);
        }
    }
    scores
}

/// Fused ids sorted by score, highest first, truncated to `limit`.
///
/// Equal scores are ordered by the id's ordering so the result does not
/// depend on the order of `lists`.
pub fn rrf_ranked<T>(lists: &[Vec<T>], k: u32, limit: usize) -> Vec<(T, f64)>
where
    T: Eq + Hash + Clone + Ord,
{
    let mut ranked: Vec<(T, f64)> = rrf_fuse(lists, k).into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Tokens that look like identifiers or codes: runs of at least four
/// `[A-Za-z0-9#_-]` characters containing a letter plus a digit, `#`, `_` or `-`
pub fn code_tokens(query: &str) -> Vec<String> {
    static CODE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = CODE_RE
        .get_or_init(|| Regex::new(r"[A-Za-z0-9#_-]{4,}").ok())
        .as_ref()
    else {
        return Vec::new();
    };

    re.find_iter(query)
        .map(|m| m.as_str())
        .filter(|t| {
            let has_alpha = t.chars().any(|c| c.is_ascii_alphabetic());
            let has_marker = t
                .chars()
                .any(|c| c.is_ascii_digit() || matches!(c, '#' | '_' | '-'));
            has_alpha && has_marker
        })
        .take(MAX_CODE_TOKENS)
        .map(str::to_string)
        .collect()
}

/// Simple BM25 scorer
pub struct Bm25Scorer {
    k1: f32,
    b: f32,
}

impl Bm25Scorer {
    pub fn new() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }

    /// Score a single row text against query terms
    pub fn score(&self, query_terms: &[String], doc_text: &str, avg_doc_len: f32) -> f32 {
        let doc_lower = doc_text.to_lowercase();
        let doc_len = doc_text.chars().count() as f32;
        let avg_doc_len = if avg_doc_len > 0.0 { avg_doc_len } else { 1.0 };
        let mut total_score = 0.0;

        for term in query_terms {
            let term_lower = term.to_lowercase();
            let tf = doc_lower.matches(&term_lower).count() as f32;

            if tf > 0.0 {
                // No corpus statistics: every term weighs the same
                let idf = 1.0;
                let numerator = tf * (self.k1 + 1.0);
                let denominator = tf + self.k1 * (1.0 - self.b + self.b * (doc_len / avg_doc_len));
                total_score += idf * (numerator / denominator);
            }
        }

        total_score
    }

    /// [`Bm25Scorer::score`] plus [`CODE_TOKEN_BOOST`] when any of the
    /// lowercased `codes` appears in the text
    pub fn score_with_codes(
        &self,
        query_terms: &[String],
        codes: &[String],
        doc_text: &str,
        avg_doc_len: f32,
    ) -> f32 {
        let mut score = self.score(query_terms, doc_text, avg_doc_len);
        if !codes.is_empty() {
            let lower = doc_text.to_lowercase();
            if codes.iter().any(|c| lower.contains(c.as_str())) {
                score += CODE_TOKEN_BOOST;
            }
        }
        score
    }
}

/// The `limit` best positive scores seen so far, in bounded memory.
/// Equal scores keep the order they were pushed in.
pub struct TopScores<T> {
    limit: usize,
    pushed: usize,
    entries: Vec<(T, f32, usize)>,
}

impl<T> TopScores<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            pushed: 0,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, id: T, score: f32) {
        if score <= 0.0 || self.limit == 0 {
            return;
        }
        self.entries.push((id, score, self.pushed));
        self.pushed += 1;
        if self.entries.len() >= self.limit * 2 + 64 {
            self.compact();
        }
    }

    fn compact(&mut self) {
        self.entries
            .sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
        self.entries.truncate(self.limit);
    }

    /// Best first
    pub fn into_sorted(mut self) -> Vec<(T, f32)> {
        self.compact();
        self.entries.into_iter().map(|(id, score, _)| (id, score)).collect()
    }
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Self::new()
    }
}
