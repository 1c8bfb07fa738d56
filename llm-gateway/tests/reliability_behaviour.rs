//! Reliability stack against a loopback HTTP stub: retry exhaustion,
//! breaker opening, fail-fast while open, and recovery on success.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use llm_gateway::{
    BackendConfig, CostCaps, EnrichmentRequest, ErrorKind, Gateway, ProviderKind, RetryPolicy,
    TaskKind,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves canned HTTP responses; the first `failures` requests get a 503,
/// the rest a valid Ollama-style generate payload.
async fn spawn_stub(failures: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                // Drain the request head; the stub does not parse it.
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                let body = if n < failures {
                    String::from("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                } else {
                    let json = r#"{"response":"{\"summary\":\"stub summary\",\"tags\":[\"stub\"]}","prompt_eval_count":12,"eval_count":8}"#;
                    format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{json}",
                        json.len()
                    )
                };
                let _ = socket.write_all(body.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), hits)
}

fn backend(url: &str) -> BackendConfig {
    BackendConfig {
        id: String::from("local/stub-7b"),
        kind: ProviderKind::LocalHttp,
        model: String::from("stub-7b"),
        base_url: url.to_string(),
        api_key: None,
        timeout: Duration::from_secs(5),
        rpm_limit: 10_000,
        tpm_limit: 10_000_000,
    }
}

fn request() -> EnrichmentRequest {
    EnrichmentRequest {
        span_text: String::from("def alpha():\n    return 1\n"),
        path: String::from("main.py"),
        slice_type: String::from("function"),
        sub_language: String::from("python"),
        task_kind: TaskKind::Enrich,
    }
}

fn fast_gateway() -> Gateway {
    Gateway::with_retry_policy(
        CostCaps {
            daily_usd: 10.0,
            monthly_usd: 100.0,
        },
        RetryPolicy {
            max_attempts: 2,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
        },
    )
}

#[tokio::test]
async fn success_path_returns_parsed_fields_and_usage() {
    let (url, hits) = spawn_stub(0).await;
    let gateway = fast_gateway();

    let resp = gateway.enrich(&backend(&url), &request()).await.unwrap();
    assert_eq!(resp.fields.summary, "stub summary");
    assert_eq!(resp.fields.tags, vec!["stub"]);
    assert_eq!(resp.input_tokens, 12);
    assert_eq!(resp.output_tokens, 8);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_503_is_retried_then_succeeds() {
    let (url, hits) = spawn_stub(1).await;
    let gateway = fast_gateway();

    let resp = gateway.enrich(&backend(&url), &request()).await.unwrap();
    assert_eq!(resp.fields.summary, "stub summary");
    assert_eq!(hits.load(Ordering::SeqCst), 2, "one retry after the 503");
}

#[tokio::test]
async fn repeated_exhaustion_opens_the_circuit() {
    // Enough failures that every call exhausts its retries.
    let (url, hits) = spawn_stub(usize::MAX).await;
    let gateway = fast_gateway();
    let cfg = backend(&url);

    // Breaker threshold is 3 consecutive failed calls.
    for _ in 0..3 {
        let err = gateway.enrich(&cfg, &request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Http(503));
    }
    let after_failures = hits.load(Ordering::SeqCst);

    // Circuit now open: fail fast, adapter untouched.
    let err = gateway.enrich(&cfg, &request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitOpen);
    assert_eq!(
        hits.load(Ordering::SeqCst),
        after_failures,
        "open circuit must not reach the server"
    );
}

#[tokio::test]
async fn budget_denial_precedes_everything() {
    let (url, hits) = spawn_stub(0).await;
    let gateway = Gateway::new(CostCaps {
        daily_usd: 0.000_000_1,
        monthly_usd: 0.000_000_1,
    });
    // Local models are free, so force a priced provider config at the
    // same URL.
    let mut cfg = backend(&url);
    cfg.kind = ProviderKind::OpenAiCompat;
    cfg.api_key = Some(String::from("test-key"));

    let err = gateway.enrich(&cfg, &request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BudgetExceeded);
    assert_eq!(hits.load(Ordering::SeqCst), 0, "no spend on denial");
}

#[tokio::test]
async fn embeddings_roundtrip_through_local_adapter() {
    // Embedding stub: single fixed vector.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let json = r#"{"embedding":[0.6,0.8]}"#;
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{json}",
                    json.len()
                );
                let _ = socket.write_all(resp.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    let gateway = fast_gateway();
    let cfg = BackendConfig {
        base_url: format!("http://{addr}"),
        ..backend("http://placeholder")
    };
    let vectors = gateway
        .embed(&cfg, &[String::from("hello"), String::from("world")])
        .await
        .unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], vec![0.6, 0.8]);
}
