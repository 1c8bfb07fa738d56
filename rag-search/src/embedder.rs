//! Query/span embedder with an in-process LRU cache.
//!
//! The embedder is oblivious to spans; callers pair vectors back to span
//! hashes themselves. Outputs are L2-normalized so the ranker's cosine is
//! a plain dot product. The cache key is `(model_id, blake3(text))`, so a
//! model change never serves stale vectors.

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::debug;

use llm_gateway::{BackendConfig, BackendError, Gateway};

use crate::errors::{Result, SearchError};

/// Default capacity of the process-wide embedding cache.
const CACHE_CAPACITY: usize = 4096;

/// Embedding model identifier with the dimension riding after the colon,
/// e.g. `nomic-embed-text:768`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId {
    pub name: String,
    pub dim: usize,
}

impl ModelId {
    pub fn parse(raw: &str) -> Result<Self> {
        let (name, dim) = raw
            .rsplit_once(':')
            .ok_or_else(|| SearchError::BadModelId(raw.to_string()))?;
        let dim: usize = dim
            .parse()
            .map_err(|_| SearchError::BadModelId(raw.to_string()))?;
        if name.is_empty() || dim == 0 {
            return Err(SearchError::BadModelId(raw.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            dim,
        })
    }

    /// Full identifier as persisted next to vectors.
    pub fn as_str(&self) -> String {
        format!("{}:{}", self.name, self.dim)
    }
}

/// Provider seam: production wraps the gateway; tests supply a
/// deterministic in-memory implementation.
pub trait EmbeddingsProvider: Send + Sync {
    fn embed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Vec<Vec<f32>>, BackendError>> + Send + 'a>>;
}

/// Gateway-backed provider for one configured embedding backend.
pub struct GatewayEmbeddings {
    gateway: Arc<Gateway>,
    backend: BackendConfig,
}

impl GatewayEmbeddings {
    pub fn new(gateway: Arc<Gateway>, backend: BackendConfig) -> Self {
        Self { gateway, backend }
    }
}

impl EmbeddingsProvider for GatewayEmbeddings {
    fn embed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Vec<Vec<f32>>, BackendError>> + Send + 'a>>
    {
        Box::pin(async move { self.gateway.embed(&self.backend, texts).await })
    }
}

type CacheKey = (String, [u8; 32]);

/// Caching, normalizing embedder.
pub struct Embedder {
    provider: Arc<dyn EmbeddingsProvider>,
    model: ModelId,
    cache: Mutex<LruCache<CacheKey, Vec<f32>>>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingsProvider>, model: ModelId) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            model,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn model(&self) -> &ModelId {
        &self.model
    }

    /// Embeds `texts`, serving repeats from the cache. Every returned
    /// vector is L2-normalized and dimension-checked.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut miss_idx: Vec<usize> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();

        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            for (i, text) in texts.iter().enumerate() {
                let key = (self.model.as_str(), *blake3::hash(text.as_bytes()).as_bytes());
                if let Some(v) = cache.get(&key) {
                    out[i] = Some(v.clone());
                } else {
                    miss_idx.push(i);
                    miss_texts.push(text.clone());
                }
            }
        }

        if !miss_texts.is_empty() {
            debug!(
                misses = miss_texts.len(),
                hits = texts.len() - miss_texts.len(),
                "embedding cache"
            );
            let fresh = self.provider.embed(&miss_texts).await?;
            if fresh.len() != miss_texts.len() {
                return Err(SearchError::VectorSizeMismatch {
                    got: fresh.len(),
                    want: miss_texts.len(),
                });
            }

            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            for (slot, (text, mut vector)) in
                miss_idx.into_iter().zip(miss_texts.into_iter().zip(fresh))
            {
                if vector.len() != self.model.dim {
                    return Err(SearchError::VectorSizeMismatch {
                        got: vector.len(),
                        want: self.model.dim,
                    });
                }
                normalize(&mut vector);
                let key = (self.model.as_str(), *blake3::hash(text.as_bytes()).as_bytes());
                cache.put(key, vector.clone());
                out[slot] = Some(vector);
            }
        }

        Ok(out.into_iter().flatten().collect())
    }
}

/// In-place L2 normalization; zero vectors stay zero.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product; with normalized inputs this IS cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        dim: usize,
    }

    impl EmbeddingsProvider for CountingProvider {
        fn embed<'a>(
            &'a self,
            texts: &'a [String],
        ) -> Pin<
            Box<
                dyn Future<Output = std::result::Result<Vec<Vec<f32>>, BackendError>>
                    + Send
                    + 'a,
            >,
        > {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            let dim = self.dim;
            Box::pin(async move {
                Ok(texts
                    .iter()
                    .map(|t| {
                        let mut v = vec![0.0f32; dim];
                        v[t.len() % dim] = 2.0;
                        v
                    })
                    .collect())
            })
        }
    }

    #[test]
    fn model_id_parses_dimension() {
        let m = ModelId::parse("nomic-embed-text:768").unwrap();
        assert_eq!(m.name, "nomic-embed-text");
        assert_eq!(m.dim, 768);
        assert!(ModelId::parse("no-dim").is_err());
        assert!(ModelId::parse(":8").is_err());
    }

    #[tokio::test]
    async fn cache_hits_skip_the_provider() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            dim: 4,
        });
        let embedder = Embedder::new(provider.clone(), ModelId::parse("m:4").unwrap());

        let texts = vec![String::from("alpha"), String::from("beta")];
        embedder.embed(&texts).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        embedder.embed(&texts).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2, "served from cache");
    }

    #[tokio::test]
    async fn outputs_are_normalized() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            dim: 4,
        });
        let embedder = Embedder::new(provider, ModelId::parse("m:4").unwrap());
        let vs = embedder.embed(&[String::from("x")]).await.unwrap();
        let norm: f32 = vs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
