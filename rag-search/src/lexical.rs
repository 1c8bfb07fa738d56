//! BM25-style lexical scoring over span text and identifiers.

use std::collections::{HashMap, HashSet};

use span_store::SpanRecord;

const K1: f64 = 1.2;
const B: f64 = 0.75;
/// Identifier matches count extra: symbol names are the strongest signal
/// a coding agent gives us.
const IDENTIFIER_BOOST: f64 = 2.0;

/// Splits text into lowercase alphanumeric tokens, breaking camelCase and
/// snake_case into their parts (plus the raw word itself).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if raw.is_empty() {
            continue;
        }
        out.push(raw.to_lowercase());
        for part in split_ident(raw) {
            if part.len() > 1 && !out.contains(&part) {
                out.push(part);
            }
        }
    }
    out
}

fn split_ident(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = word.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && i > 0 && chars[i - 1].is_lowercase() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Per-query lexical index built over the candidate span pool.
pub struct LexicalIndex {
    /// term → number of docs containing it.
    doc_freq: HashMap<String, usize>,
    /// Per-doc token counts and lengths, aligned with the span pool.
    docs: Vec<DocStats>,
    avg_len: f64,
    total_docs: usize,
}

struct DocStats {
    term_freq: HashMap<String, usize>,
    identifiers: HashSet<String>,
    len: usize,
}

impl LexicalIndex {
    pub fn build(spans: &[SpanRecord]) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut docs = Vec::with_capacity(spans.len());
        let mut total_len = 0usize;

        for span in spans {
            let tokens = tokenize(&span.text);
            let mut term_freq: HashMap<String, usize> = HashMap::new();
            for t in &tokens {
                *term_freq.entry(t.clone()).or_default() += 1;
            }
            for term in term_freq.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
            let identifiers: HashSet<String> = span
                .identifiers
                .iter()
                .flat_map(|i| tokenize(i))
                .collect();
            total_len += tokens.len();
            docs.push(DocStats {
                term_freq,
                identifiers,
                len: tokens.len(),
            });
        }

        let total_docs = docs.len().max(1);
        Self {
            doc_freq,
            avg_len: total_len as f64 / total_docs as f64,
            docs,
            total_docs,
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        let n = self.total_docs as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of doc `idx` for the query tokens, with an identifier
    /// boost for exact symbol matches.
    pub fn score(&self, idx: usize, query_tokens: &[String]) -> f64 {
        let doc = &self.docs[idx];
        let mut score = 0.0;
        for term in query_tokens {
            let tf = doc.term_freq.get(term).copied().unwrap_or(0) as f64;
            if tf > 0.0 {
                let idf = self.idf(term);
                let denom = tf + K1 * (1.0 - B + B * doc.len as f64 / self.avg_len.max(1.0));
                score += idf * (tf * (K1 + 1.0)) / denom;
            }
            if doc.identifiers.contains(term) {
                score += IDENTIFIER_BOOST * self.idf(term);
            }
        }
        score
    }

    /// Indices of the top `k` docs by score, descending; zero-score docs
    /// are excluded.
    pub fn top_k(&self, query_tokens: &[String], k: usize) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> = (0..self.docs.len())
            .map(|i| (i, self.score(i, query_tokens)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}
