//! Budgeted, diversity-aware selection (MMR).
//!
//! Greedy selection weighted by score and diversity keeps the context
//! budget from being spent on near-duplicate spans. Diversity is Jaccard
//! similarity over identifier sets: cheap, and exactly the signal that
//! makes two code spans interchangeable for an agent.

use std::collections::HashSet;

/// Relevance/diversity balance; closer to 1.0 prefers relevance.
const LAMBDA: f64 = 0.7;

/// One selectable candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub span_hash: String,
    pub score: f64,
    /// Character cost of including this span.
    pub cost: usize,
    pub identifiers: HashSet<String>,
}

/// Greedy MMR under a character budget. Returns selected span hashes in
/// selection order. A zero budget means unlimited.
pub fn select_under_budget(mut candidates: Vec<Candidate>, budget_chars: usize) -> Vec<String> {
    let mut selected: Vec<Candidate> = Vec::new();
    let mut spent = 0usize;

    while !candidates.is_empty() {
        let mut best_idx = 0usize;
        let mut best_gain = f64::MIN;
        for (i, c) in candidates.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|s| jaccard(&c.identifiers, &s.identifiers))
                .fold(0.0f64, f64::max);
            let gain = LAMBDA * c.score - (1.0 - LAMBDA) * max_sim;
            if gain > best_gain {
                best_gain = gain;
                best_idx = i;
            }
        }

        let chosen = candidates.swap_remove(best_idx);
        if budget_chars > 0 && spent + chosen.cost > budget_chars {
            // Too big for the remaining budget; smaller spans may still fit.
            continue;
        }
        spent += chosen.cost;
        selected.push(chosen);
    }

    selected.into_iter().map(|c| c.span_hash).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 { 0.0 } else { inter / union }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(hash: &str, score: f64, cost: usize, idents: &[&str]) -> Candidate {
        Candidate {
            span_hash: hash.to_string(),
            score,
            cost,
            identifiers: idents.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn budget_is_respected() {
        let selected = select_under_budget(
            vec![
                cand("a", 1.0, 60, &["alpha"]),
                cand("b", 0.9, 60, &["beta"]),
                cand("c", 0.8, 60, &["gamma"]),
            ],
            130,
        );
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0], "a");
    }

    #[test]
    fn near_duplicates_are_deprioritized() {
        let selected = select_under_budget(
            vec![
                cand("orig", 1.0, 10, &["parse", "span", "hash"]),
                cand("dupe", 0.95, 10, &["parse", "span", "hash"]),
                cand("other", 0.6, 10, &["daemon", "lock"]),
            ],
            1000,
        );
        // The diverse span must be picked before the near-duplicate's
        // position would suggest by raw score alone.
        let pos_other = selected.iter().position(|h| h == "other").unwrap();
        let pos_dupe = selected.iter().position(|h| h == "dupe").unwrap();
        assert!(pos_other < pos_dupe);
    }

    #[test]
    fn zero_budget_means_unlimited() {
        let selected = select_under_budget(
            vec![cand("a", 1.0, 10_000, &[]), cand("b", 0.5, 10_000, &[])],
            0,
        );
        assert_eq!(selected.len(), 2);
    }
}
