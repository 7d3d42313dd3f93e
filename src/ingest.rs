//! Ingesta de consultas en el grafo: embedding, nodo `:Consultation`,
//! extracción de entidades y aristas de mención.
//!
//! Cada paso es idempotente (MERGE por clave natural), de modo que dos
//! ejecuciones sobre la misma entrada producen exactamente el mismo grafo.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::extract::EntityExtractor;
use crate::graph_store::GraphStore;
use crate::models::{Consultation, SourceDocument, VectorIndexSpec};

/// Opciones de una ejecución de ingesta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Borra todo el grafo antes de empezar.
    pub reset: bool,
}

/// Avance de la ingesta, notificado antes de procesar cada documento:
/// `index` documentos ya terminados de `total`.
#[derive(Debug, Clone)]
pub struct IngestProgress<'a> {
    pub index: usize,
    pub total: usize,
    pub filename: &'a str,
}

impl IngestProgress<'_> {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.index as f32 / self.total as f32
        }
    }
}

/// Documento omitido y motivo.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub filename: String,
    pub reason: String,
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents_received: usize,
    pub documents_ingested: usize,
    pub documents_without_entities: usize,
    pub symptom_mentions: usize,
    pub condition_mentions: usize,
    pub skipped: Vec<SkippedDocument>,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} documentos recibidos, {} ingeridos ({} sin entidades), {} omitidos. {} menciones de síntoma y {} de enfermedad en {:.1}s.",
            self.documents_received,
            self.documents_ingested,
            self.documents_without_entities,
            self.skipped.len(),
            self.symptom_mentions,
            self.condition_mentions,
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        )
    }
}

/// Pipeline de ingesta.
pub struct IndexBuilder {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    extractor: EntityExtractor,
    index_name: String,
}

impl IndexBuilder {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        extractor: EntityExtractor,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
            index_name: index_name.into(),
        }
    }

    pub fn index_spec(&self) -> VectorIndexSpec {
        VectorIndexSpec {
            name: self.index_name.clone(),
            dimensions: self.embedder.dimensions(),
        }
    }

    pub async fn build(
        &self,
        documents: &[SourceDocument],
        options: IngestOptions,
    ) -> Result<IngestionSummary> {
        self.build_with_progress(documents, options, |_| {}).await
    }

    /// Ejecuta la ingesta completa. Sólo los errores del grafo abortan la
    /// ejecución; los fallos por documento se registran y se omiten.
    pub async fn build_with_progress<F>(
        &self,
        documents: &[SourceDocument],
        options: IngestOptions,
        on_progress: F,
    ) -> Result<IngestionSummary>
    where
        F: Fn(IngestProgress<'_>) + Send + Sync,
    {
        let started_at = Utc::now();
        info!("🚀 Iniciando ingesta GraphRAG de {} documentos...", documents.len());

        // 1) Reset opcional
        if options.reset {
            self.store.delete_all().await?;
        }
        self.store.ensure_constraints().await?;

        // 2) Índice vectorial: siempre se recrea para garantizar dimensión y métrica.
        let spec = self.index_spec();
        if let Err(err) = self.store.recreate_vector_index(&spec).await {
            if matches!(err, Error::Config(_)) {
                return Err(err);
            }
            warn!(
                "No se pudo recrear el índice vectorial '{}': {err}. Se asume ya configurado.",
                spec.name
            );
        }

        // 3) Documentos, estrictamente en secuencia.
        let mut summary = IngestionSummary {
            started_at,
            finished_at: started_at,
            documents_received: documents.len(),
            documents_ingested: 0,
            documents_without_entities: 0,
            symptom_mentions: 0,
            condition_mentions: 0,
            skipped: Vec::new(),
        };

        let total = documents.len();
        for (index, doc) in documents.iter().enumerate() {
            on_progress(IngestProgress {
                index,
                total,
                filename: &doc.filename,
            });
            info!("   📄 [{}/{}] Procesando {}...", index + 1, total, doc.filename);

            match self.ingest_document(doc).await {
                Ok(DocumentOutcome::Ingested {
                    symptoms,
                    conditions,
                }) => {
                    summary.documents_ingested += 1;
                    summary.symptom_mentions += symptoms;
                    summary.condition_mentions += conditions;
                    if symptoms + conditions == 0 {
                        summary.documents_without_entities += 1;
                    }
                }
                Ok(DocumentOutcome::Skipped(reason)) => {
                    error!("Documento {} omitido: {reason}", doc.filename);
                    summary.skipped.push(SkippedDocument {
                        filename: doc.filename.clone(),
                        reason,
                    });
                }
                Err(err) => {
                    error!("Error del grafo ingiriendo {}: {err}", doc.filename);
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.store.await_vector_index(&spec.name).await {
            warn!("El índice vectorial '{}' no confirmó su disponibilidad: {err}", spec.name);
        }

        summary.finished_at = Utc::now();
        info!("✅ Ingesta terminada. {summary}");
        Ok(summary)
    }

    /// Procesa un documento. `Err` sólo para fallos del grafo (fatales);
    /// los fallos de embedding se devuelven como `Skipped`.
    async fn ingest_document(&self, doc: &SourceDocument) -> Result<DocumentOutcome> {
        if doc.content.trim().is_empty() {
            return Ok(DocumentOutcome::Skipped("documento vacío".into()));
        }

        // A. Embedding
        let embedding = match self.embedder.embed(&doc.content).await {
            Ok(embedding) => embedding,
            Err(err) => return Ok(DocumentOutcome::Skipped(format!("embedding fallido: {err}"))),
        };
        if embedding.len() != self.embedder.dimensions() {
            let err = Error::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: embedding.len(),
            };
            return Ok(DocumentOutcome::Skipped(err.to_string()));
        }
        // El índice coseno no indexa vectores de norma cero: el nodo nunca se encontraría.
        if embedding.iter().all(|v| *v == 0.0) {
            return Ok(DocumentOutcome::Skipped(
                "embedding nulo (texto sin contenido indexable)".into(),
            ));
        }

        // B. Nodo :Consultation
        self.store
            .merge_consultation(&Consultation {
                filename: doc.filename.clone(),
                content: doc.content.clone(),
                embedding,
            })
            .await?;

        // C. Entidades y aristas de mención
        let entities = self.extractor.extract(&doc.content).await;
        self.store.merge_mentions(&doc.filename, &entities).await?;

        Ok(DocumentOutcome::Ingested {
            symptoms: entities.symptoms.len(),
            conditions: entities.conditions.len(),
        })
    }
}

enum DocumentOutcome {
    Ingested { symptoms: usize, conditions: usize },
    Skipped(String),
}
