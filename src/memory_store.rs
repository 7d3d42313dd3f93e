//! `GraphStore` en memoria con búsqueda exacta por fuerza bruta.
//!
//! Reproduce la semántica de MERGE y la puntuación coseno normalizada de Neo4j
//! (`(1 + cos) / 2`). Pensado para tests y ejecuciones sin servidor.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::graph_store::GraphStore;
use crate::models::{
    Consultation, Embedding, EntityKind, GraphStats, MedicalEntities, RetrievedConsultation,
    VectorIndexSpec,
};

#[derive(Debug, Default)]
struct MemoryGraph {
    /// Orden de inserción; determina el desempate entre puntuaciones iguales.
    consultations: Vec<Consultation>,
    by_filename: HashMap<String, usize>,
    symptoms: BTreeSet<String>,
    conditions: BTreeSet<String>,
    mentions: HashSet<(String, EntityKind, String)>,
    vector_index: Option<VectorIndexSpec>,
}

impl MemoryGraph {
    fn entities_mut(&mut self, kind: EntityKind) -> &mut BTreeSet<String> {
        match kind {
            EntityKind::Symptom => &mut self.symptoms,
            EntityKind::Condition => &mut self.conditions,
        }
    }

    fn linked(&self, filename: &str, kind: EntityKind) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .mentions
            .iter()
            .filter(|(f, k, _)| f == filename && *k == kind)
            .map(|(_, _, name)| name)
            .collect();
        names.into_iter().cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryGraph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryGraph>> {
        self.inner
            .lock()
            .map_err(|_| Error::Store("El grafo en memoria quedó envenenado".into()))
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn delete_all(&self) -> Result<()> {
        let mut graph = self.lock()?;
        let index = graph.vector_index.take();
        *graph = MemoryGraph {
            vector_index: index,
            ..MemoryGraph::default()
        };
        Ok(())
    }

    async fn ensure_constraints(&self) -> Result<()> {
        Ok(())
    }

    async fn recreate_vector_index(&self, spec: &VectorIndexSpec) -> Result<()> {
        self.lock()?.vector_index = Some(spec.clone());
        Ok(())
    }

    async fn await_vector_index(&self, name: &str) -> Result<()> {
        match &self.lock()?.vector_index {
            Some(spec) if spec.name == name => Ok(()),
            _ => Err(Error::Store(format!("No existe el índice '{name}'"))),
        }
    }

    async fn merge_consultation(&self, consultation: &Consultation) -> Result<()> {
        let mut graph = self.lock()?;
        match graph.by_filename.get(&consultation.filename).copied() {
            Some(idx) => graph.consultations[idx] = consultation.clone(),
            None => {
                let idx = graph.consultations.len();
                graph.consultations.push(consultation.clone());
                graph
                    .by_filename
                    .insert(consultation.filename.clone(), idx);
            }
        }
        Ok(())
    }

    async fn merge_mentions(&self, filename: &str, entities: &MedicalEntities) -> Result<()> {
        let mut graph = self.lock()?;
        // Igual que MATCH en Cypher: sin consulta no se crea nada.
        if !graph.by_filename.contains_key(filename) {
            return Ok(());
        }
        for kind in EntityKind::ALL {
            for name in entities.of_kind(kind) {
                graph.entities_mut(kind).insert(name.clone());
                graph
                    .mentions
                    .insert((filename.to_string(), kind, name.clone()));
            }
        }
        Ok(())
    }

    async fn nearest_consultations(
        &self,
        index_name: &str,
        k: usize,
        embedding: &Embedding,
    ) -> Result<Vec<RetrievedConsultation>> {
        let graph = self.lock()?;
        let spec = graph
            .vector_index
            .as_ref()
            .filter(|spec| spec.name == index_name)
            .ok_or_else(|| Error::Store(format!("No existe el índice '{index_name}'")))?;

        if embedding.len() != spec.dimensions {
            return Err(Error::DimensionMismatch {
                expected: spec.dimensions,
                actual: embedding.len(),
            });
        }

        let mut scored: Vec<(f64, &Consultation)> = graph
            .consultations
            .iter()
            .filter(|c| c.embedding.len() == spec.dimensions)
            .map(|c| ((1.0 + cosine_similarity(&c.embedding, embedding)) / 2.0, c))
            .collect();
        // sort_by es estable: a igual puntuación se conserva el orden de inserción.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, c)| RetrievedConsultation {
                filename: c.filename.clone(),
                content: c.content.clone(),
                score,
                symptoms: graph.linked(&c.filename, EntityKind::Symptom),
                conditions: graph.linked(&c.filename, EntityKind::Condition),
            })
            .collect())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let graph = self.lock()?;
        let mentions_of = |kind: EntityKind| graph.mentions.iter().filter(|m| m.1 == kind).count();
        Ok(GraphStats {
            consultations: graph.consultations.len(),
            symptoms: graph.symptoms.len(),
            conditions: graph.conditions.len(),
            symptom_mentions: mentions_of(EntityKind::Symptom),
            condition_mentions: mentions_of(EntityKind::Condition),
        })
    }

    async fn count_consultations_mentioning(&self, term: &str) -> Result<usize> {
        let graph = self.lock()?;
        let consultations: HashSet<&String> = graph
            .mentions
            .iter()
            .filter(|(_, _, name)| name.to_lowercase().contains(term))
            .map(|(filename, _, _)| filename)
            .collect();
        Ok(consultations.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consultation(filename: &str, embedding: Vec<f64>) -> Consultation {
        Consultation {
            filename: filename.to_string(),
            content: format!("contenido de {filename}"),
            embedding,
        }
    }

    fn spec() -> VectorIndexSpec {
        VectorIndexSpec {
            name: "consultation_vector".into(),
            dimensions: 2,
        }
    }

    #[tokio::test]
    async fn merging_the_same_filename_updates_in_place() {
        let store = MemoryStore::new();
        store.merge_consultation(&consultation("a.txt", vec![1.0, 0.0])).await.unwrap();
        store.merge_consultation(&consultation("a.txt", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(store.stats().await.unwrap().consultations, 1);
    }

    #[tokio::test]
    async fn search_without_index_is_an_error() {
        let store = MemoryStore::new();
        let err = store
            .nearest_consultations("consultation_vector", 3, &vec![1.0, 0.0])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let store = MemoryStore::new();
        store.recreate_vector_index(&spec()).await.unwrap();
        store.merge_consultation(&consultation("b.txt", vec![1.0, 0.0])).await.unwrap();
        store.merge_consultation(&consultation("a.txt", vec![1.0, 0.0])).await.unwrap();
        let hits = store
            .nearest_consultations("consultation_vector", 2, &vec![1.0, 0.0])
            .await
            .unwrap();
        let names: Vec<_> = hits.iter().map(|h| h.filename.as_str()).collect();
        assert_eq!(names, ["b.txt", "a.txt"]);
        assert!((hits[0].score - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn delete_all_keeps_the_index() {
        let store = MemoryStore::new();
        store.recreate_vector_index(&spec()).await.unwrap();
        store.merge_consultation(&consultation("a.txt", vec![1.0, 0.0])).await.unwrap();
        store.delete_all().await.unwrap();
        assert_eq!(store.stats().await.unwrap(), GraphStats::default());
        store.await_vector_index("consultation_vector").await.unwrap();
    }

    #[tokio::test]
    async fn term_counts_are_per_consultation() {
        let store = MemoryStore::new();
        store.merge_consultation(&consultation("a.txt", vec![1.0, 0.0])).await.unwrap();
        store.merge_consultation(&consultation("b.txt", vec![0.0, 1.0])).await.unwrap();
        let heart = MedicalEntities {
            symptoms: ["heart palpitations".to_string()].into_iter().collect(),
            conditions: ["heart failure".to_string()].into_iter().collect(),
        };
        store.merge_mentions("a.txt", &heart).await.unwrap();
        let other = MedicalEntities {
            symptoms: ["cough".to_string()].into_iter().collect(),
            conditions: BTreeSet::new(),
        };
        store.merge_mentions("b.txt", &other).await.unwrap();

        assert_eq!(store.count_consultations_mentioning("heart").await.unwrap(), 1);
        assert_eq!(store.count_consultations_mentioning("failure").await.unwrap(), 1);
        assert_eq!(store.count_consultations_mentioning("u").await.unwrap(), 2);
        assert_eq!(store.count_consultations_mentioning("asthma").await.unwrap(), 0);
    }
}
