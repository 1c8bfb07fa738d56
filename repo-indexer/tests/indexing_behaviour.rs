//! Orchestrator behaviour over a real on-disk repo fixture: full index,
//! incremental sync, embedding and enrichment batches, cancellation.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use enrichment_router::{BackendInvoker, Router};
use llm_gateway::{
    BackendError, EnrichmentFields, EnrichmentRequest, EnrichmentResponse,
};
use llmc_config::{BackendRole, ChainMember, EnrichmentSection};
use rag_search::{Embedder, EmbeddingsProvider, ModelId};
use repo_indexer::{IndexError, IndexerConfig, RepoIndexer};
use services::CancelToken;
use span_store::SpanStore;

const DIM: usize = 16;
const MODEL: &str = "test:16";

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
                    v[t.len() % DIM] = 1.0;
                    v
                })
                .collect())
        })
    }
}

/// Invoker that always succeeds with a canned summary.
struct AlwaysOk;

impl BackendInvoker for AlwaysOk {
    fn invoke<'a>(
        &'a self,
        _member: &'a ChainMember,
        req: &'a EnrichmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EnrichmentResponse, BackendError>> + Send + 'a>> {
        let summary = format!("span in {}", req.path);
        Box::pin(async move {
            Ok(EnrichmentResponse {
                fields: EnrichmentFields {
                    summary,
                    ..EnrichmentFields::default()
                },
                input_tokens: 10,
                output_tokens: 5,
            })
        })
    }
}

fn routed_section() -> EnrichmentSection {
    let mut section = EnrichmentSection::default();
    section.chain.push(ChainMember {
        name: String::from("main"),
        provider: String::from("local"),
        model: String::from("qwen3:8b"),
        url: String::from("http://127.0.0.1:1"),
        tier: 0,
        role: BackendRole::Primary,
        timeout_seconds: 5,
        enabled: true,
    });
    section
        .routing
        .insert(String::from("default"), String::from("main"));
    section
}

struct Fixture {
    dir: tempfile::TempDir,
    store: Arc<SpanStore>,
    indexer: RepoIndexer,
}

impl Fixture {
    fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("main.py"),
        "def alpha():\n    return 1\n\n\ndef beta(x):\n    return x + 1\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("README.md"),
        "# Demo\n\nTwo helpers, alpha and beta.\n",
    )
    .unwrap();

    let store = Arc::new(SpanStore::open_in_memory(3, false).unwrap());
    let embedder = Arc::new(Embedder::new(
        Arc::new(HashingProvider),
        ModelId::parse(MODEL).unwrap(),
    ));
    let router = Arc::new(Router::from_config(&routed_section(), Arc::new(AlwaysOk)));

    let indexer = RepoIndexer::new(
        dir.path().to_path_buf(),
        dir.path().join(".llmc/rag_index_status.json"),
        store.clone(),
        embedder,
        router,
        IndexerConfig {
            model_id: String::from(MODEL),
            cooldown_seconds: 0,
            ..IndexerConfig::default()
        },
    );

    Fixture { dir, store, indexer }
}

#[tokio::test]
async fn full_index_of_demo_repo() {
    let fx = fixture();
    let summary = fx.indexer.full_index(&CancelToken::new()).await.unwrap();

    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.files_indexed, 2);

    let counters = fx.store.counters().unwrap();
    assert_eq!(counters.files_total, 2);

    let spans = fx.store.all_spans().unwrap();
    let functions: Vec<_> = spans
        .iter()
        .filter(|s| s.path == "main.py" && s.kind == "function")
        .collect();
    assert_eq!(functions.len(), 2, "alpha and beta as code spans");
    let sections: Vec<_> = spans
        .iter()
        .filter(|s| s.path == "README.md" && s.kind == "section")
        .collect();
    assert_eq!(sections.len(), 1, "one section span for the readme");
}

#[tokio::test]
async fn unchanged_incremental_sync_writes_nothing() {
    let fx = fixture();
    let cancel = CancelToken::new();
    fx.indexer.full_index(&cancel).await.unwrap();
    let before = fx.store.counters().unwrap();

    let summary = fx.indexer.incremental_sync(&cancel).await.unwrap();
    assert_eq!(summary.spans_added, 0);
    assert_eq!(summary.spans_removed, 0);
    assert_eq!(summary.files_removed, 0);

    let after = fx.store.counters().unwrap();
    assert_eq!(before.spans_total, after.spans_total);
}

#[tokio::test]
async fn appended_function_is_the_only_new_span() {
    let fx = fixture();
    let cancel = CancelToken::new();
    fx.indexer.full_index(&cancel).await.unwrap();

    // Embed everything so "pending embedding" isolates gamma later.
    fx.indexer.embed_batch(100, &cancel).await.unwrap();
    assert!(
        fx.store
            .spans_missing_embedding(MODEL, 100)
            .unwrap()
            .is_empty()
    );

    let alpha_beta: Vec<String> = fx
        .store
        .all_spans()
        .unwrap()
        .iter()
        .filter(|s| s.kind == "function")
        .map(|s| s.span_hash.clone())
        .collect();

    // Append gamma; bump mtime explicitly so the diff can't miss it.
    let main = fx.root().join("main.py");
    let mut body = std::fs::read_to_string(&main).unwrap();
    body.push_str("\n\ndef gamma():\n    return 2\n");
    std::fs::write(&main, body).unwrap();
    let far_future = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    let _ = filetime_set(&main, far_future);

    fx.indexer.incremental_sync(&cancel).await.unwrap();

    let spans = fx.store.all_spans().unwrap();
    let functions: Vec<_> = spans.iter().filter(|s| s.kind == "function").collect();
    assert_eq!(functions.len(), 3);
    for h in &alpha_beta {
        assert!(
            functions.iter().any(|s| &s.span_hash == h),
            "alpha/beta hashes must survive the sync"
        );
    }

    // Exactly the gamma span (and nothing old) waits for embedding.
    let missing = fx.store.spans_missing_embedding(MODEL, 100).unwrap();
    assert!(!missing.is_empty());
    assert!(missing.iter().all(|w| !alpha_beta.contains(&w.span_hash)));
}

#[tokio::test]
async fn enrich_batch_writes_rows_and_decisions() {
    let fx = fixture();
    let cancel = CancelToken::new();
    fx.indexer.full_index(&cancel).await.unwrap();

    let summary = fx.indexer.enrich_batch(100, &cancel).await.unwrap();
    assert!(summary.enriched > 0);
    assert_eq!(summary.failed, 0);
    assert!(!summary.over_budget);

    let spans = fx.store.all_spans().unwrap();
    for s in &spans {
        let enrichment = fx.store.current_enrichment(&s.span_hash).unwrap();
        assert!(enrichment.is_some(), "every span enriched");
        let decisions = fx.store.decisions_for(&s.span_hash).unwrap();
        assert_eq!(decisions.len(), 1, "exactly one decision per span");
        assert_eq!(decisions[0].outcome, "success");
    }

    // A second batch finds nothing pending and writes no new decisions.
    let again = fx.indexer.enrich_batch(100, &cancel).await.unwrap();
    assert_eq!(again.enriched, 0);
}

#[tokio::test]
async fn cancelled_token_aborts_at_safe_point() {
    let fx = fixture();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = fx.indexer.full_index(&cancel).await.unwrap_err();
    assert!(matches!(err, IndexError::Cancelled));
}

#[tokio::test]
async fn empty_repo_indexes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SpanStore::open_in_memory(3, false).unwrap());
    let indexer = RepoIndexer::new(
        dir.path().to_path_buf(),
        dir.path().join(".llmc/rag_index_status.json"),
        store.clone(),
        Arc::new(Embedder::new(
            Arc::new(HashingProvider),
            ModelId::parse(MODEL).unwrap(),
        )),
        Arc::new(Router::from_config(&routed_section(), Arc::new(AlwaysOk))),
        IndexerConfig {
            model_id: String::from(MODEL),
            cooldown_seconds: 0,
            ..IndexerConfig::default()
        },
    );

    let summary = indexer.full_index(&CancelToken::new()).await.unwrap();
    assert_eq!(summary.files_seen, 0);
    assert_eq!(store.counters().unwrap().files_total, 0);
}

#[tokio::test]
async fn staleness_counts_on_disk_changes() {
    let fx = fixture();
    let cancel = CancelToken::new();
    fx.indexer.full_index(&cancel).await.unwrap();
    assert_eq!(fx.indexer.count_stale_files().unwrap(), 0);

    std::fs::write(fx.root().join("new_one.py"), "def d():\n    pass\n").unwrap();
    assert_eq!(fx.indexer.count_stale_files().unwrap(), 1);

    let published = fx.indexer.publish_staleness().unwrap();
    assert_eq!(published, 1);
}

/// Sets a file's mtime, best effort (test helper).
fn filetime_set(path: &std::path::Path, to: std::time::SystemTime) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.set_modified(to)?;
    Ok(())
}
