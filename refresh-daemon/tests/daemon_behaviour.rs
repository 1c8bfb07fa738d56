//! Daemon-level behaviour: registration, pipeline assembly, health
//! aggregation, and write-lock discipline. No network backends are
//! configured, so enrichment work is deferred rather than attempted.

use std::sync::Arc;
use std::time::Duration;

use refresh_daemon::{FailureStore, RefreshDaemon, Registry, RepoDomain};
use services::{CancelToken, RepoLock, paths};

fn config() -> llmc_config::LlmcConfig {
    let cfg = llmc_config::LlmcConfig::default();
    cfg.validate().unwrap();
    cfg
}

fn seeded_repo(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let root = dir.path().join("proj");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(
        root.join("main.py"),
        "def alpha():\n    return 1\n\n\ndef beta(x):\n    return x + 1\n",
    )
    .unwrap();
    std::fs::write(root.join("README.md"), "# Proj\n\nHello.\n").unwrap();
    root
}

#[tokio::test]
async fn full_index_through_daemon_pipeline_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded_repo(&dir);

    let registry = Registry::at(dir.path().join("repos.yml"));
    let entry = registry.register(&root, RepoDomain::Code).unwrap();

    let daemon = Arc::new(RefreshDaemon::new(
        config(),
        registry,
        FailureStore::open_in_memory().unwrap(),
    ));

    let indexer = daemon.build_indexer(&entry).unwrap();
    let summary = indexer.full_index(&CancelToken::new()).await.unwrap();
    assert_eq!(summary.files_seen, 2);

    let health = daemon.health().unwrap();
    assert_eq!(health.repos.len(), 1);
    let repo = &health.repos[0];
    assert!(repo.healthy);
    assert_eq!(repo.id, entry.id);
    let status = repo.status.as_ref().expect("status file written");
    assert_eq!(status.files_total, 2);
    assert!(status.spans_total >= 3);
    assert_eq!(health.files_total, 2);
    assert!(health.pending_total > 0, "nothing enriched yet");
}

#[tokio::test]
async fn medical_domain_repo_routes_prose_to_the_medical_family() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded_repo(&dir);

    let registry = Registry::at(dir.path().join("repos.yml"));
    let entry = registry.register(&root, RepoDomain::Medical).unwrap();
    let daemon = Arc::new(RefreshDaemon::new(
        config(),
        registry,
        FailureStore::open_in_memory().unwrap(),
    ));

    let indexer = daemon.build_indexer(&entry).unwrap();
    indexer.full_index(&CancelToken::new()).await.unwrap();

    // Readers see a consistent snapshot without the write lock.
    let workspace = paths::workspace_dir(&root);
    let store = span_store::SpanStore::open(&span_store::db_path(&workspace), 3, false).unwrap();
    let spans = store.all_spans().unwrap();

    let readme: Vec<_> = spans.iter().filter(|s| s.path == "README.md").collect();
    assert!(!readme.is_empty());
    assert!(
        readme.iter().all(|s| s.family == "medical"),
        "prose in a medical repo must carry the medical routing family"
    );
    assert!(
        spans
            .iter()
            .filter(|s| s.path == "main.py" && s.kind == "function")
            .all(|s| s.family == "code"),
        "code keeps its content-derived family"
    );
}

#[tokio::test]
async fn workspace_layout_lands_under_dot_llmc() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded_repo(&dir);

    let registry = Registry::at(dir.path().join("repos.yml"));
    let entry = registry.register(&root, RepoDomain::Code).unwrap();
    let daemon = Arc::new(RefreshDaemon::new(
        config(),
        registry,
        FailureStore::open_in_memory().unwrap(),
    ));

    let indexer = daemon.build_indexer(&entry).unwrap();
    indexer.full_index(&CancelToken::new()).await.unwrap();

    let workspace = paths::workspace_dir(&root);
    assert!(workspace.join("rag/index_v2.db").exists());
    assert!(workspace.join("rag_index_status.json").exists());
}

#[tokio::test]
async fn contended_lock_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded_repo(&dir);
    let workspace = paths::workspace_dir(&root);
    std::fs::create_dir_all(&workspace).unwrap();

    // Simulate another writer.
    let foreign = RepoLock::for_workspace(&workspace).unwrap();
    let _held = foreign.acquire(Duration::from_secs(1)).await.unwrap();

    let lock = RepoLock::for_workspace(&workspace).unwrap();
    let err = lock.acquire(Duration::from_millis(200)).await.unwrap_err();
    assert!(matches!(err, services::LockError::Timeout { .. }));
}

#[tokio::test]
async fn run_loop_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::at(dir.path().join("repos.yml"));
    let daemon = Arc::new(RefreshDaemon::new(
        config(),
        registry,
        FailureStore::open_in_memory().unwrap(),
    ));

    let cancel = CancelToken::new();
    let handle = tokio::spawn(daemon.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("daemon must stop within the grace period")
        .unwrap();
}
