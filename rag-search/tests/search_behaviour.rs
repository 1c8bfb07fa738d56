//! End-to-end ranker behaviour over an in-memory store: hybrid hits,
//! normalization, freshness gate, and empty results.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use code_slicer::{SlicerConfig, slice_file};
use llm_gateway::BackendError;
use rag_search::{
    Embedder, EmbeddingsProvider, ModelId, SearchConfig, SearchError, SearchFilters, Searcher,
};
use span_store::{IndexStatus, SpanStore};

const DIM: usize = 32;

/// Deterministic bag-of-tokens embedding: close texts get close vectors.
struct HashingProvider;

impl EmbeddingsProvider for HashingProvider {
    fn embed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, BackendError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; DIM];
                    for token in t.split(|c: char| !c.is_alphanumeric()) {
                        if token.is_empty() {
                            continue;
                        }
                        let h = blake3::hash(token.to_lowercase().as_bytes());
                        let bucket = h.as_bytes()[0] as usize % DIM;
                        v[bucket] += 1.0;
                    }
                    v
                })
                .collect())
        })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<SpanStore>,
    searcher: Searcher,
    status_path: std::path::PathBuf,
    hashes: HashMap<String, String>,
}

async fn fixture(max_stale_files: u64) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let status_path = dir.path().join("rag_index_status.json");
    let graph_path = dir.path().join("rag_graph.json");

    let store = Arc::new(SpanStore::open_in_memory(3, false).unwrap());

    let py = b"def alpha():\n    return 1\n\n\ndef beta(x):\n    return x + 1\n";
    let md = b"# Demo\n\nA demo repository with alpha and beta helpers.\n";

    let mut hashes = HashMap::new();
    let embedder = Embedder::new(
        Arc::new(HashingProvider),
        ModelId::parse(&format!("test:{DIM}")).unwrap(),
    );

    for (path, bytes, lang) in [
        ("main.py", py.as_slice(), "python"),
        ("README.md", md.as_slice(), "markdown"),
    ] {
        let file = store.upsert_file(path, lang, 100, path, None).unwrap();
        let out = slice_file(path, bytes, &SlicerConfig::default()).unwrap();
        let diff = store.replace_spans(file, &out.slices).unwrap();
        for (slice, hash) in out.slices.iter().zip(diff.added.iter()) {
            let name = slice
                .identifiers
                .first()
                .cloned()
                .unwrap_or_else(|| slice.kind.tag().to_string());
            hashes.insert(name, hash.clone());
            let vecs = embedder.embed(&[slice.text.clone()]).await.unwrap();
            store
                .write_embedding(hash, &format!("test:{DIM}"), &vecs[0])
                .unwrap();
        }
    }

    let searcher = Searcher::new(
        store.clone(),
        Arc::new(Embedder::new(
            Arc::new(HashingProvider),
            ModelId::parse(&format!("test:{DIM}")).unwrap(),
        )),
        status_path.clone(),
        graph_path,
        SearchConfig {
            max_stale_files,
            ..SearchConfig::default()
        },
    );

    Fixture {
        _dir: dir,
        store,
        searcher,
        status_path,
        hashes,
    }
}

#[tokio::test]
async fn beta_query_returns_beta_span_at_score_100() {
    let fx = fixture(25).await;
    let reply = fx
        .searcher
        .search("beta", 0, &SearchFilters::default())
        .await
        .unwrap();

    assert!(!reply.hits.is_empty());
    let top = &reply.hits[0];
    assert_eq!(top.span_hash, fx.hashes["beta"]);
    assert_eq!(top.path, "main.py");
    assert!((top.score - 100.0).abs() < 1e-9, "batch top must be 100");
}

#[tokio::test]
async fn stale_index_is_refused_with_pending_count() {
    let fx = fixture(3).await;
    let mut status = IndexStatus::new("/repo", "test:32");
    status.stale_files = 5;
    status.write(&fx.status_path).unwrap();

    let err = fx
        .searcher
        .search("beta", 0, &SearchFilters::default())
        .await
        .unwrap_err();
    match err {
        SearchError::StaleIndex { pending } => assert_eq!(pending, 5),
        other => panic!("expected StaleIndex, got {other:?}"),
    }
}

#[tokio::test]
async fn unmatched_query_yields_empty_hits_not_error() {
    let fx = fixture(25).await;
    let reply = fx
        .searcher
        .search("zzzznothing", 0, &SearchFilters::default())
        .await
        .unwrap();
    assert!(reply.hits.is_empty());
}

#[tokio::test]
async fn family_filter_excludes_docs() {
    let fx = fixture(25).await;
    let reply = fx
        .searcher
        .search(
            "alpha",
            0,
            &SearchFilters {
                family: Some(String::from("code")),
                ..SearchFilters::default()
            },
        )
        .await
        .unwrap();
    assert!(reply.hits.iter().all(|h| h.path == "main.py"));
}

#[tokio::test]
async fn summary_rides_along_when_enriched() {
    let fx = fixture(25).await;
    let beta = fx.hashes["beta"].clone();
    fx.store
        .write_enrichment(
            &beta,
            &span_store::EnrichmentBody {
                summary: String::from("increments its argument"),
                ..span_store::EnrichmentBody::default()
            },
            "code",
            0,
            "local",
            "qwen3:8b",
            chrono::Utc::now(),
        )
        .unwrap();

    let reply = fx
        .searcher
        .search("beta", 0, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(
        reply.hits[0].summary.as_deref(),
        Some("increments its argument")
    );
}
