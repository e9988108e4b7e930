//! Embedding model seam.
//!
//! The retrieval core never touches a model directly; everything goes through
//! [`Embedder`]. Implementations must return fixed-dimension, L2-normalized
//! vectors so that cosine distance behaves.
//!
//! Two implementations ship here: [`HashEmbedder`], a deterministic stand-in
//! for tests and embedded use, and (behind the `local-embeddings` feature)
//! [`LocalEmbedder`], which wraps an ONNX sentence-embedding model.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised while producing embeddings.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding model initialization failed: {0}")]
    Init(String),

    #[error("embedding generation failed: {0}")]
    Encode(String),
}

/// Text-to-vector contract used by the write and read paths.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimensionality of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Encodes one text into a normalized vector.
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Encodes a batch of texts, preserving order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Deterministic embedder derived from a digest of the input text.
///
/// Identical texts map to identical unit vectors, which is what the
/// self-similarity properties of the store rely on in tests. There is no
/// semantic signal here; do not use it for actual retrieval quality.
#[derive(Clone, Debug)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dim);
        let mut counter = 0u32;
        while values.len() < self.dim {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            for byte in hasher.finalize() {
                if values.len() == self.dim {
                    break;
                }
                values.push(f32::from(byte) / 255.0 - 0.5);
            }
            counter += 1;
        }
        normalize(&mut values);
        values
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.vector_for(text))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in values.iter_mut() {
            *v /= norm;
        }
    } else if let Some(first) = values.first_mut() {
        *first = 1.0;
    }
}

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fastembed::{EmbeddingModel as ModelName, InitOptions, TextEmbedding};

    use super::{EmbedError, Embedder};

    /// ONNX sentence-embedding model running in-process.
    ///
    /// The model file is downloaded into `cache_dir` on first use. The inner
    /// session requires `&mut self`, hence the mutex.
    pub struct LocalEmbedder {
        model: Mutex<TextEmbedding>,
        dim: usize,
    }

    impl LocalEmbedder {
        pub fn new(cache_dir: PathBuf) -> Result<Self, EmbedError> {
            std::fs::create_dir_all(&cache_dir)
                .map_err(|err| EmbedError::Init(err.to_string()))?;

            let options = InitOptions::new(ModelName::AllMiniLML6V2)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(true);
            let mut model =
                TextEmbedding::try_new(options).map_err(|err| EmbedError::Init(err.to_string()))?;

            let probe = model
                .embed(vec!["dimension probe"], None)
                .map_err(|err| EmbedError::Init(err.to_string()))?;
            let dim = probe
                .first()
                .map(Vec::len)
                .ok_or_else(|| EmbedError::Init("model returned no probe vector".into()))?;

            Ok(Self {
                model: Mutex::new(model),
                dim,
            })
        }

        fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedError> {
            let mut model = self
                .model
                .lock()
                .map_err(|_| EmbedError::Encode("model lock poisoned".into()))?;
            model
                .embed(texts, None)
                .map_err(|err| EmbedError::Encode(err.to_string()))
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        fn dimension(&self) -> usize {
            self.dim
        }

        async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.embed_all(vec![text.to_string()])?
                .into_iter()
                .next()
                .ok_or_else(|| EmbedError::Encode("no embedding returned".into()))
        }

        async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            self.embed_all(texts.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_texts_share_a_vector() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.encode("rust borrow checker").await.unwrap();
        let b = embedder.encode("rust borrow checker").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let embedder = HashEmbedder::new(48);
        let v = embedder.encode("normalization check").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = HashEmbedder::new(32);
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = embedder.encode_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.encode("one").await.unwrap());
        assert_eq!(batch[1], embedder.encode("two").await.unwrap());
    }
}
