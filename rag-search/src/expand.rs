//! Optional 1-hop symbol-graph expansion.
//!
//! The graph sidecar (`rag_graph.json`) maps span hashes to their
//! caller/callee span hashes. When loaded, neighbors of the top hits are
//! pulled in at a discounted score.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::fuse::Fused;

/// Neighbor score attribution relative to the parent hit.
const NEIGHBOR_FACTOR: f64 = 0.6;

/// Adjacency over span hashes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolGraph {
    /// span hash → 1-hop neighbor span hashes (callers and callees).
    #[serde(default)]
    pub edges: HashMap<String, Vec<String>>,
}

impl SymbolGraph {
    /// Loads the sidecar; an absent file yields an empty graph.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Appends 1-hop neighbors of the first `top_r` fused hits, each at
    /// `0.6 ×` its parent's fused score. Existing hits are not duplicated;
    /// returned pairs carry the hop count.
    pub fn expand(&self, fused: &mut Vec<Fused>, hops: &mut HashMap<String, u32>, top_r: usize) {
        if self.is_empty() {
            return;
        }
        let parents: Vec<(String, f64)> = fused
            .iter()
            .take(top_r)
            .map(|f| (f.span_hash.clone(), f.fused))
            .collect();

        for (parent, parent_score) in parents {
            let Some(neighbors) = self.edges.get(&parent) else {
                continue;
            };
            for n in neighbors {
                if fused.iter().any(|f| &f.span_hash == n) {
                    continue;
                }
                fused.push(Fused {
                    span_hash: n.clone(),
                    fused: parent_score * NEIGHBOR_FACTOR,
                    lexical_score: 0.0,
                    vector_score: 0.0,
                });
                hops.insert(n.clone(), 1);
            }
        }
        fused.sort_by(|a, b| b.fused.total_cmp(&a.fused).then(a.span_hash.cmp(&b.span_hash)));
    }
}
