//! Recuperación híbrida: búsqueda vectorial sobre `:Consultation(embedding)`
//! seguida de un salto en el grafo hacia síntomas y enfermedades.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{Error, QueryStage, Result};
use crate::graph_store::GraphStore;
use crate::models::RetrievedConsultation;

pub const DEFAULT_TOP_K: usize = 3;

pub struct HybridRetriever {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    index_name: String,
    top_k: usize,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            index_name: index_name.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Devuelve como mucho `top_k` consultas, en el orden de similitud del
    /// índice. Un índice vacío produce una lista vacía, nunca un error.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedConsultation>> {
        debug!("Consulta → Embedding");
        let embedding = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| e.at_stage(QueryStage::Embedding))?;
        if embedding.len() != self.embedder.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: embedding.len(),
            }
            .at_stage(QueryStage::Embedding));
        }

        debug!("Consulta → Retrieving (top {} en '{}')", self.top_k, self.index_name);
        let hits = self
            .store
            .nearest_consultations(&self.index_name, self.top_k, &embedding)
            .await
            .map_err(|e| e.at_stage(QueryStage::Retrieving))?;

        debug!("Recuperadas {} consultas", hits.len());
        Ok(hits)
    }
}
