//! Interfaz de almacenamiento del grafo.
//!
//! Todas las escrituras son "crear o actualizar por clave natural" (MERGE),
//! de modo que repetir una ingesta nunca duplica nodos ni aristas.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Consultation, Embedding, GraphStats, MedicalEntities, RetrievedConsultation, VectorIndexSpec,
};

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Borra todos los nodos y aristas. Los índices se conservan.
    async fn delete_all(&self) -> Result<()>;

    /// Asegura las restricciones de unicidad por clave natural.
    async fn ensure_constraints(&self) -> Result<()>;

    /// Elimina el índice vectorial con ese nombre (si existe) y lo vuelve a crear
    /// sobre `:Consultation(embedding)` con la dimensión indicada y similitud coseno.
    async fn recreate_vector_index(&self, spec: &VectorIndexSpec) -> Result<()>;

    /// Espera a que el índice vectorial esté poblado y disponible.
    async fn await_vector_index(&self, name: &str) -> Result<()>;

    /// MERGE de `:Consultation {filename}`; actualiza `content` y `embedding`.
    async fn merge_consultation(&self, consultation: &Consultation) -> Result<()>;

    /// MERGE de cada entidad por nombre normalizado y de su arista de mención
    /// desde la consulta `filename`, que debe existir.
    async fn merge_mentions(&self, filename: &str, entities: &MedicalEntities) -> Result<()>;

    /// Top-k consultas más similares según el índice vectorial, en orden de
    /// similitud descendente, con los síntomas y enfermedades a un salto.
    async fn nearest_consultations(
        &self,
        index_name: &str,
        k: usize,
        embedding: &Embedding,
    ) -> Result<Vec<RetrievedConsultation>>;

    async fn stats(&self) -> Result<GraphStats>;

    /// Número de consultas distintas que mencionan algún síntoma o enfermedad
    /// cuyo nombre contiene `term` (ya normalizado en minúsculas).
    async fn count_consultations_mentioning(&self, term: &str) -> Result<usize>;
}
