//! Modelos de dominio: documentos de entrada y nodos/relaciones del grafo.
//!
//! Invariantes de unicidad por tipo de nodo:
//!   - `:Consultation`: una por `filename`.
//!   - `:Symptom` / `:Condition`: uno por `name` normalizado.
//!   - `MENTIONS_SYMPTOM` / `MENTIONS_CONDITION`: como mucho una arista por par.

use std::collections::BTreeSet;

use serde::Serialize;

/// Vector denso de dimensión fija.
pub type Embedding = Vec<f64>;

/// Un documento de texto listo para ingerir: (filename, contenido).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub filename: String,
    pub content: String,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Representa un nodo (:Consultation) en Neo4j.
#[derive(Debug, Clone, PartialEq)]
pub struct Consultation {
    pub filename: String,
    pub content: String,
    pub embedding: Embedding,
}

/// Tipo de entidad médica extraída.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKind {
    Symptom,
    Condition,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Symptom, EntityKind::Condition];

    /// Etiqueta del nodo en el grafo.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Symptom => "Symptom",
            EntityKind::Condition => "Condition",
        }
    }

    /// Tipo de la relación Consultation → entidad.
    pub fn relationship(self) -> &'static str {
        match self {
            EntityKind::Symptom => "MENTIONS_SYMPTOM",
            EntityKind::Condition => "MENTIONS_CONDITION",
        }
    }
}

/// Síntomas y enfermedades de un documento, ya normalizados y sin duplicados.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicalEntities {
    pub symptoms: BTreeSet<String>,
    pub conditions: BTreeSet<String>,
}

impl MedicalEntities {
    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty() && self.conditions.is_empty()
    }

    pub fn of_kind(&self, kind: EntityKind) -> &BTreeSet<String> {
        match kind {
            EntityKind::Symptom => &self.symptoms,
            EntityKind::Condition => &self.conditions,
        }
    }
}

/// Configuración del índice vectorial sobre `:Consultation(embedding)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorIndexSpec {
    pub name: String,
    pub dimensions: usize,
}

/// Resultado de la búsqueda híbrida: un vecino más cercano y sus entidades.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedConsultation {
    pub filename: String,
    pub content: String,
    pub score: f64,
    pub symptoms: Vec<String>,
    pub conditions: Vec<String>,
}

/// Consultas que mencionan un término (búsqueda por subcadena en los nombres).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCount {
    pub term: String,
    pub consultations: usize,
}

/// Recuento de nodos y aristas por tipo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub consultations: usize,
    pub symptoms: usize,
    pub conditions: usize,
    pub symptom_mentions: usize,
    pub condition_mentions: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} consultas, {} síntomas, {} enfermedades, {} menciones de síntoma, {} menciones de enfermedad",
            self.consultations,
            self.symptoms,
            self.conditions,
            self.symptom_mentions,
            self.condition_mentions
        )
    }
}
