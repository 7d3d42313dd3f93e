//! Proveedores de embeddings.
//!
//! - `RigEmbedder`: embeddings remotos vía Rig (Ollama `all-minilm` u OpenAI).
//! - `HashingEmbedder`: embeddings deterministas locales, útiles sin red y en tests.
//!
//! Ingesta y consulta deben usar el mismo proveedor y la misma dimensión; no
//! hay ningún mecanismo que detecte espacios de embedding mezclados.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::EmbeddingsClient as _;
use rig::embeddings::EmbeddingModel as _;
use rig::providers::{ollama, openai};
use tracing::debug;

use crate::config::{AppConfig, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::Embedding;

/// Capacidad `embed(text) -> vector<f64, D>`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Dimensión declarada de los vectores producidos.
    fn dimensions(&self) -> usize;
}

/// Construye el proveedor de embeddings indicado en la configuración.
pub fn embedder_from_config(cfg: &AppConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match cfg.embedding_provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(cfg.embedding_dimensions)),
        EmbeddingProvider::OpenAI => {
            let key = cfg
                .embedding_api_key
                .as_deref()
                .or(cfg.llm_api_key.as_deref())
                .ok_or_else(|| Error::Config("Falta EMBEDDING_API_KEY".into()))?;
            Arc::new(RigEmbedder {
                backend: RigBackend::OpenAI(openai::Client::new(key)),
                model: cfg.embedding_model.clone(),
                dimensions: cfg.embedding_dimensions,
            })
        }
        EmbeddingProvider::Ollama => {
            // Servidor Ollama local por defecto (http://localhost:11434).
            Arc::new(RigEmbedder {
                backend: RigBackend::Ollama(ollama::Client::new()),
                model: cfg.embedding_model.clone(),
                dimensions: cfg.embedding_dimensions,
            })
        }
    };
    Ok(embedder)
}

#[derive(Clone)]
enum RigBackend {
    OpenAI(openai::Client),
    Ollama(ollama::Client),
}

/// Embeddings remotos a través de los clientes de Rig.
#[derive(Clone)]
pub struct RigEmbedder {
    backend: RigBackend,
    model: String,
    dimensions: usize,
}

#[async_trait]
impl Embedder for RigEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let texts = vec![text.to_string()];
        let embeddings = match &self.backend {
            RigBackend::OpenAI(client) => {
                client
                    .embedding_model_with_ndims(&self.model, self.dimensions)
                    .embed_texts(texts)
                    .await?
            }
            RigBackend::Ollama(client) => {
                client
                    .embedding_model_with_ndims(&self.model, self.dimensions)
                    .embed_texts(texts)
                    .await?
            }
        };

        let vector = embeddings
            .into_iter()
            .next()
            .map(|e| e.vec)
            .ok_or_else(|| Error::provider("El proveedor no devolvió ningún embedding"))?;

        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        debug!("Embedding de {} caracteres calculado ({} dims)", text.len(), vector.len());
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Embedding determinista por "feature hashing" de palabras, normalizado L2.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f64; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let idx = (fnv1a(&token.to_lowercase()) % self.dimensions as u64) as usize;
            vector[idx] += 1.0;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Similitud coseno; 0.0 si alguno de los vectores es nulo o las longitudes difieren.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
