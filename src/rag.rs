//! Consulta GraphRAG: recuperación híbrida + síntesis de la respuesta.
//!
//! Flujo por pregunta (sin estado entre preguntas):
//!   Idle → Embedding → Retrieving → (sin resultados ? Fallback : Synthesizing) → Done
//!
//! 1. Se vectoriza la pregunta y se buscan las `k` consultas más cercanas.
//! 2. Cada consulta llega enriquecida con sus síntomas y enfermedades del grafo.
//! 3. Se serializa el contexto en orden de ranking y se pide la respuesta al LLM.
//! 4. Sin contexto no se llama al LLM: se devuelve una respuesta fija.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::corpus::{load_corpus, truncate_chars};
use crate::embedding::{embedder_from_config, Embedder};
use crate::error::{QueryStage, Result};
use crate::extract::{normalize_label, EntityExtractor};
use crate::graph_store::GraphStore;
use crate::ingest::{IndexBuilder, IngestOptions, IngestProgress, IngestionSummary, SkippedDocument};
use crate::llm::{Generator, LlmManager};
use crate::models::{GraphStats, RetrievedConsultation, TermCount};
use crate::neo4j_client::Neo4jStore;
use crate::retrieval::HybridRetriever;

/// Respuesta fija cuando la búsqueda no devuelve ningún documento.
pub const NO_CONTEXT_ANSWER: &str = "I found nothing relevant in the knowledge base.";

/// Límite por defecto de caracteres de cada consulta dentro del prompt.
pub const DEFAULT_CONTEXT_DOCUMENT_CHARS: usize = 5000;

/// Referencia a una consulta usada como contexto.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub filename: String,
    pub score: f64,
    pub symptoms: Vec<String>,
    pub conditions: Vec<String>,
}

impl From<&RetrievedConsultation> for SourceRef {
    fn from(hit: &RetrievedConsultation) -> Self {
        Self {
            filename: hit.filename.clone(),
            score: hit.score,
            symptoms: hit.symptoms.clone(),
            conditions: hit.conditions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    context_document_chars: usize,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            context_document_chars: DEFAULT_CONTEXT_DOCUMENT_CHARS,
        }
    }

    pub fn with_context_document_chars(mut self, chars: usize) -> Self {
        self.context_document_chars = chars.max(1);
        self
    }

    /// Bloque de contexto determinista, en el orden recibido.
    pub fn build_context(&self, hits: &[RetrievedConsultation]) -> String {
        hits.iter()
            .map(|hit| {
                format!(
                    "--- RELEVANT DOCUMENT (Score: {score:.2}) ---\n\
                     Source: {filename}\n\
                     Symptoms (graph): {symptoms}\n\
                     Conditions (graph): {conditions}\n\
                     Consultation content:\n\
                     {content}\n\
                     ----------------------------------------------------\n",
                    score = hit.score,
                    filename = hit.filename,
                    symptoms = hit.symptoms.join(", "),
                    conditions = hit.conditions.join(", "),
                    content = truncate_chars(&hit.content, self.context_document_chars),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn build_prompt(&self, question: &str, context: &str) -> String {
        format!(
            "You are an expert medical assistant.\n\
             Use the contextual information below (retrieved through vector search and graph traversal) to answer the question.\n\
             Answer strictly from this context. If the answer is not in the context, say \"I don't know\".\n\
             \n\
             MEDICAL CONTEXT:\n\
             {context}\n\
             \n\
             USER QUESTION:\n\
             {question}\n\
             \n\
             ANSWER:\n"
        )
    }

    pub async fn synthesize(&self, question: &str, hits: &[RetrievedConsultation]) -> Result<Answer> {
        if hits.is_empty() {
            debug!("Consulta → Fallback (sin contexto)");
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        debug!("Consulta → Synthesizing ({} documentos)", hits.len());
        let prompt = self.build_prompt(question, &self.build_context(hits));
        let text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| e.at_stage(QueryStage::Synthesizing))?;

        Ok(Answer {
            text,
            sources: hits.iter().map(SourceRef::from).collect(),
        })
    }
}

/// Motor completo: ingesta, recuperación híbrida y síntesis.
pub struct GraphRag {
    store: Arc<dyn GraphStore>,
    builder: IndexBuilder,
    retriever: HybridRetriever,
    synthesizer: AnswerSynthesizer,
    max_document_chars: usize,
}

impl GraphRag {
    /// Ensambla el motor a partir de sus colaboradores externos.
    pub fn new(
        cfg: &AppConfig,
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let extractor = EntityExtractor::new(generator.clone(), cfg.normalization_language.clone());
        let builder = IndexBuilder::new(
            store.clone(),
            embedder.clone(),
            extractor,
            cfg.vector_index_name.clone(),
        );
        let retriever = HybridRetriever::new(store.clone(), embedder, cfg.vector_index_name.clone())
            .with_top_k(cfg.top_k);
        let synthesizer =
            AnswerSynthesizer::new(generator).with_context_document_chars(cfg.context_document_chars);

        Self {
            store,
            builder,
            retriever,
            synthesizer,
            max_document_chars: cfg.max_document_chars,
        }
    }

    /// Conecta con Neo4j y los proveedores LLM. Cualquier fallo aquí es fatal.
    pub async fn from_config(cfg: &AppConfig) -> Result<Self> {
        let store: Arc<dyn GraphStore> = Arc::new(Neo4jStore::connect(cfg).await?);
        let embedder = embedder_from_config(cfg)?;
        let generator: Arc<dyn Generator> =
            Arc::new(LlmManager::from_config(cfg)?.with_retries(cfg));
        Ok(Self::new(cfg, store, embedder, generator))
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn builder(&self) -> &IndexBuilder {
        &self.builder
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn synthesizer(&self) -> &AnswerSynthesizer {
        &self.synthesizer
    }

    /// Lee el corpus del directorio y lo ingiere.
    pub async fn ingest_corpus<F>(
        &self,
        dir: &Path,
        options: IngestOptions,
        on_progress: F,
    ) -> Result<IngestionSummary>
    where
        F: Fn(IngestProgress<'_>) + Send + Sync,
    {
        let corpus = load_corpus(dir, self.max_document_chars)?;
        let mut summary = self
            .builder
            .build_with_progress(&corpus.documents, options, on_progress)
            .await?;
        summary.documents_received += corpus.skipped.len();
        summary
            .skipped
            .extend(corpus.skipped.into_iter().map(|s| SkippedDocument {
                filename: s
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| s.path.display().to_string()),
                reason: s.reason,
            }));
        Ok(summary)
    }

    /// Si el grafo ya contiene consultas no hace nada; si está vacío ejecuta
    /// una ingesta completa desde cero. Devuelve `None` cuando se omite.
    pub async fn ensure_indexed(&self, dir: &Path) -> Result<Option<IngestionSummary>> {
        let stats = self.store.stats().await?;
        if stats.consultations > 0 {
            info!(
                "ℹ️ Grafo ya poblado ({} consultas), se pasa directamente al modo consulta.",
                stats.consultations
            );
            return Ok(None);
        }
        let summary = self
            .ingest_corpus(dir, IngestOptions { reset: true }, |_| {})
            .await?;
        Ok(Some(summary))
    }

    /// Pregunta → respuesta con las fuentes usadas.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let hits = self.retriever.retrieve(question).await?;
        let answer = self.synthesizer.synthesize(question, &hits).await?;
        debug!("Consulta → Done");
        Ok(answer)
    }

    /// Punto de entrada síncrono por pregunta: texto en, texto fuera.
    pub async fn answer(&self, question: &str) -> Result<String> {
        Ok(self.ask(question).await?.text)
    }

    pub async fn stats(&self) -> Result<GraphStats> {
        self.store.stats().await
    }

    /// Cuántas consultas mencionan un síntoma o enfermedad que contiene `term`.
    /// El término se normaliza igual que las etiquetas; vacío cuenta 0.
    pub async fn count_mentioning(&self, term: &str) -> Result<TermCount> {
        let Some(term) = normalize_label(term) else {
            return Ok(TermCount {
                term: String::new(),
                consultations: 0,
            });
        };
        let consultations = self.store.count_consultations_mentioning(&term).await?;
        Ok(TermCount { term, consultations })
    }
}
