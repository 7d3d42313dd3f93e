mod common;

use std::sync::Arc;

use common::*;
use consult_graphrag::embedding::{Embedder, HashingEmbedder};
use consult_graphrag::error::QueryStage;
use consult_graphrag::graph_store::GraphStore;
use consult_graphrag::ingest::IngestOptions;
use consult_graphrag::memory_store::MemoryStore;
use consult_graphrag::models::{Consultation, MedicalEntities, VectorIndexSpec};
use consult_graphrag::retrieval::HybridRetriever;
use consult_graphrag::{Error, NO_CONTEXT_ANSWER};

async fn seeded_store(vectors: &[(&str, Vec<f64>)]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .recreate_vector_index(&VectorIndexSpec {
            name: "consultation_vector".into(),
            dimensions: 3,
        })
        .await
        .unwrap();
    for (filename, embedding) in vectors {
        store
            .merge_consultation(&Consultation {
                filename: filename.to_string(),
                content: format!("content of {filename}"),
                embedding: embedding.clone(),
            })
            .await
            .unwrap();
    }
    store
}

/// Embedder fijo: siempre devuelve el mismo vector de consulta.
struct FixedEmbedder(Vec<f64>);

#[async_trait::async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> consult_graphrag::Result<Vec<f64>> {
        Ok(self.0.clone())
    }

    fn dimensions(&self) -> usize {
        self.0.len()
    }
}

#[tokio::test]
async fn results_are_ordered_by_descending_similarity() {
    let store = seeded_store(&[
        ("far.txt", vec![0.0, 0.0, 1.0]),
        ("close.txt", vec![1.0, 0.1, 0.0]),
        ("middle.txt", vec![1.0, 1.0, 0.0]),
        ("opposite.txt", vec![-1.0, 0.0, 0.0]),
    ])
    .await;
    let retriever = HybridRetriever::new(store, Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])), "consultation_vector")
        .with_top_k(4);

    let hits = retriever.retrieve("anything").await.unwrap();

    let names: Vec<_> = hits.iter().map(|h| h.filename.as_str()).collect();
    assert_eq!(names, ["close.txt", "middle.txt", "far.txt", "opposite.txt"]);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
}

#[tokio::test]
async fn fewer_nodes_than_k_returns_what_exists() {
    let store = seeded_store(&[("only.txt", vec![0.0, 1.0, 0.0])]).await;
    let retriever = HybridRetriever::new(store, Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])), "consultation_vector");
    assert_eq!(retriever.top_k(), 3);

    let hits = retriever.retrieve("anything").await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn empty_index_returns_no_results() {
    let store = seeded_store(&[]).await;
    let retriever = HybridRetriever::new(store, Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])), "consultation_vector");
    assert!(retriever.retrieve("anything").await.unwrap().is_empty());
}

#[tokio::test]
async fn hits_carry_their_one_hop_entities() {
    let store = seeded_store(&[("a.txt", vec![1.0, 0.0, 0.0])]).await;
    let entities = MedicalEntities {
        symptoms: ["fever".to_string(), "chills".to_string()].into_iter().collect(),
        conditions: ["flu".to_string()].into_iter().collect(),
    };
    store.merge_mentions("a.txt", &entities).await.unwrap();
    store.merge_mentions("a.txt", &entities).await.unwrap();
    let retriever = HybridRetriever::new(store, Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])), "consultation_vector");

    let hits = retriever.retrieve("anything").await.unwrap();

    assert_eq!(hits[0].symptoms, ["chills", "fever"]);
    assert_eq!(hits[0].conditions, ["flu"]);
}

#[tokio::test]
async fn mismatched_query_dimension_is_a_retrieval_error() {
    let store = seeded_store(&[("a.txt", vec![1.0, 0.0, 0.0])]).await;
    let retriever = HybridRetriever::new(store, Arc::new(HashingEmbedder::new(16)), "consultation_vector");

    let err = retriever.retrieve("fever").await.unwrap_err();
    assert!(matches!(err, Error::Query { stage: QueryStage::Retrieving, .. }));
}

#[tokio::test]
async fn empty_retrieval_answers_without_calling_the_generator() {
    let generator = keyword_extractor();
    let (rag, _store) = memory_rag(generator.clone());
    rag.builder().build(&[], IngestOptions { reset: true }).await.unwrap();

    let answer = rag.answer("What causes palpitations?").await.unwrap();

    assert_eq!(answer, NO_CONTEXT_ANSWER);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn synthesis_errors_are_reported_per_question() {
    let generator = ScriptedGenerator::new(|prompt| {
        if prompt.contains("USER QUESTION:") {
            Err(consult_graphrag::Error::provider("503 Service Unavailable"))
        } else {
            Ok(r#"{"symptoms": [], "conditions": []}"#.to_string())
        }
    });
    let (rag, _store) = memory_rag(generator);
    rag.builder().build(&[doc_a()], IngestOptions { reset: true }).await.unwrap();

    let err = rag.answer("fever?").await.unwrap_err();
    assert!(matches!(err, Error::Query { stage: QueryStage::Synthesizing, .. }));

    // La sesión sigue utilizable tras el error.
    assert_eq!(rag.stats().await.unwrap().consultations, 1);
}
