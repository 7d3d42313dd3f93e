mod common;

use std::sync::Arc;

use common::*;
use consult_graphrag::graph_store::GraphStore;
use consult_graphrag::ingest::IngestOptions;
use consult_graphrag::models::{GraphStats, SourceDocument};

#[tokio::test]
async fn ingesting_twice_produces_identical_counts() {
    let (rag, store) = memory_rag(keyword_extractor());
    let docs = vec![doc_a(), doc_b()];

    rag.builder().build(&docs, IngestOptions { reset: true }).await.unwrap();
    let first = store.stats().await.unwrap();

    rag.builder().build(&docs, IngestOptions::default()).await.unwrap();
    let second = store.stats().await.unwrap();

    assert_eq!(
        first,
        GraphStats {
            consultations: 2,
            symptoms: 2,
            conditions: 2,
            symptom_mentions: 2,
            condition_mentions: 2,
        }
    );
    assert_eq!(first, second);
}

#[tokio::test]
async fn reingesting_a_filename_updates_the_node_in_place() {
    let (rag, store) = memory_rag(keyword_extractor());

    rag.builder().build(&[doc_a()], IngestOptions { reset: true }).await.unwrap();
    let updated = SourceDocument::new("consultation_a.txt", "Follow-up: fever gone, headache remains.");
    rag.builder().build(&[updated], IngestOptions::default()).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.consultations, 1);

    let hits = rag.retriever().retrieve("headache").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.starts_with("Follow-up"));
    // Las menciones previas se conservan: MERGE no borra aristas.
    assert!(hits[0].symptoms.contains(&"headache".to_string()));
}

#[tokio::test]
async fn entity_names_are_deduplicated_across_documents() {
    let (rag, store) = memory_rag(keyword_extractor());
    let docs = vec![
        SourceDocument::new("one.txt", "Strong FEVER overnight."),
        SourceDocument::new("two.txt", "mild fever in the morning"),
        SourceDocument::new("three.txt", "Fever returned after lunch"),
    ];

    rag.builder().build(&docs, IngestOptions { reset: true }).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.symptoms, 1);
    assert_eq!(stats.symptom_mentions, 3);
    let hits = rag.retriever().retrieve("FEVER").await.unwrap();
    assert!(hits.iter().all(|h| h.symptoms == ["fever"]));
}

#[tokio::test]
async fn unparseable_extraction_still_creates_the_consultation() {
    let generator = ScriptedGenerator::new(|_| Ok("Sorry, I cannot help with that.".to_string()));
    let (rag, store) = memory_rag(generator.clone());

    let summary = rag.builder().build(&[doc_a()], IngestOptions { reset: true }).await.unwrap();

    assert_eq!(summary.documents_ingested, 1);
    assert_eq!(summary.documents_without_entities, 1);
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.consultations, 1);
    assert_eq!(stats.symptom_mentions + stats.condition_mentions, 0);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn provider_failures_during_extraction_do_not_abort_the_batch() {
    let (rag, store) = memory_rag(always_failing("connection reset by peer"));

    let summary = rag
        .builder()
        .build(&[doc_a(), doc_b()], IngestOptions { reset: true })
        .await
        .unwrap();

    assert_eq!(summary.documents_ingested, 2);
    assert!(summary.skipped.is_empty());
    assert_eq!(store.stats().await.unwrap().consultations, 2);
}

#[tokio::test]
async fn empty_documents_are_reported_and_skipped() {
    let (rag, store) = memory_rag(keyword_extractor());
    let docs = vec![SourceDocument::new("blank.txt", "   \n "), doc_b()];

    let summary = rag.builder().build(&docs, IngestOptions { reset: true }).await.unwrap();

    assert_eq!(summary.documents_ingested, 1);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].filename, "blank.txt");
    assert_eq!(store.stats().await.unwrap().consultations, 1);
}

#[tokio::test]
async fn reset_clears_previous_documents() {
    let (rag, store) = memory_rag(keyword_extractor());

    rag.builder().build(&[doc_a()], IngestOptions { reset: true }).await.unwrap();
    rag.builder().build(&[doc_b()], IngestOptions { reset: true }).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.consultations, 1);
    assert_eq!(stats.symptoms, 1);
    let hits = rag.retriever().retrieve("fever flu").await.unwrap();
    assert_eq!(hits[0].filename, "consultation_b.txt");
}

#[tokio::test]
async fn concurrent_ingestion_of_the_same_file_converges() {
    let (rag, store) = memory_rag(keyword_extractor());
    let rag = Arc::new(rag);
    rag.builder().build(&[], IngestOptions { reset: true }).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let rag = rag.clone();
        handles.push(tokio::spawn(async move {
            rag.builder().build(&[doc_a()], IngestOptions::default()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.consultations, 1);
    assert_eq!(stats.symptom_mentions, 1);
    assert_eq!(stats.condition_mentions, 1);
}

#[tokio::test]
async fn progress_is_reported_for_every_document() {
    let (rag, _store) = memory_rag(keyword_extractor());
    let seen = std::sync::Mutex::new(Vec::new());

    rag.builder()
        .build_with_progress(&[doc_a(), doc_b()], IngestOptions { reset: true }, |p| {
            seen.lock().unwrap().push((p.index, p.total, p.filename.to_string(), p.fraction()));
        })
        .await
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].2, "consultation_a.txt");
    assert_eq!(seen[1].1, 2);
    // Progreso = documentos ya terminados: nunca 1.0 mientras el último sigue en curso.
    assert_eq!(seen[0].3, 0.0);
    assert!((seen[1].3 - 0.5).abs() < f32::EPSILON);
}

#[tokio::test]
async fn documents_without_indexable_text_are_skipped() {
    let generator = keyword_extractor();
    let (rag, store) = memory_rag(generator.clone());
    let docs = vec![SourceDocument::new("dashes.txt", "--- !!! ..."), doc_a()];

    let summary = rag.builder().build(&docs, IngestOptions { reset: true }).await.unwrap();

    assert_eq!(summary.documents_ingested, 1);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].filename, "dashes.txt");
    assert_eq!(store.stats().await.unwrap().consultations, 1);
    // Sin nodo no se pide extracción.
    assert_eq!(generator.calls(), 1);
}
