//! Reciprocal Rank Fusion of the lexical and vector candidate lists.

use std::collections::HashMap;

/// Standard RRF dampening constant.
const RRF_K: f64 = 60.0;
/// Tie-break nudge for spans whose file path literally contains a query
/// token.
const PATH_MATCH_NUDGE: f64 = 1e-4;

/// Fused candidate with its per-channel provenance.
#[derive(Debug, Clone)]
pub struct Fused {
    pub span_hash: String,
    pub fused: f64,
    pub lexical_score: f64,
    pub vector_score: f64,
}

/// Combines two ranked lists `(span_hash, raw_score)`, each already
/// sorted descending, into one fused ranking.
pub fn reciprocal_rank_fusion(
    lexical: &[(String, f64)],
    vector: &[(String, f64)],
    query_tokens: &[String],
    path_of: impl Fn(&str) -> Option<String>,
) -> Vec<Fused> {
    let mut merged: HashMap<String, Fused> = HashMap::new();

    for (rank, (hash, score)) in lexical.iter().enumerate() {
        let e = merged.entry(hash.clone()).or_insert_with(|| Fused {
            span_hash: hash.clone(),
            fused: 0.0,
            lexical_score: 0.0,
            vector_score: 0.0,
        });
        e.fused += 1.0 / (RRF_K + rank as f64 + 1.0);
        e.lexical_score = *score;
    }
    for (rank, (hash, score)) in vector.iter().enumerate() {
        let e = merged.entry(hash.clone()).or_insert_with(|| Fused {
            span_hash: hash.clone(),
            fused: 0.0,
            lexical_score: 0.0,
            vector_score: 0.0,
        });
        e.fused += 1.0 / (RRF_K + rank as f64 + 1.0);
        e.vector_score = *score;
    }

    // Literal path matches win ties.
    for f in merged.values_mut() {
        if let Some(path) = path_of(&f.span_hash) {
            let lower = path.to_lowercase();
            if query_tokens.iter().any(|t| lower.contains(t.as_str())) {
                f.fused += PATH_MATCH_NUDGE;
            }
        }
    }

    let mut out: Vec<Fused> = merged.into_values().collect();
    out.sort_by(|a, b| b.fused.total_cmp(&a.fused).then(a.span_hash.cmp(&b.span_hash)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_in_both_lists_outranks_single_channel() {
        let lexical = vec![
            (String::from("both"), 5.0),
            (String::from("lex-only"), 4.0),
        ];
        let vector = vec![
            (String::from("vec-only"), 0.9),
            (String::from("both"), 0.8),
        ];
        let fused = reciprocal_rank_fusion(&lexical, &vector, &[], |_| None);
        assert_eq!(fused[0].span_hash, "both");
        assert!(fused[0].lexical_score > 0.0 && fused[0].vector_score > 0.0);
    }

    #[test]
    fn path_token_match_breaks_ties() {
        let lexical = vec![(String::from("a"), 1.0)];
        let vector = vec![(String::from("b"), 1.0)];
        let q = vec![String::from("ranker")];
        let fused = reciprocal_rank_fusion(&lexical, &vector, &q, |hash| {
            Some(if hash == "b" {
                String::from("src/ranker.rs")
            } else {
                String::from("src/other.rs")
            })
        });
        assert_eq!(fused[0].span_hash, "b");
    }
}
