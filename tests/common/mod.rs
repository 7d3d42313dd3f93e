#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use consult_graphrag::config::AppConfig;
use consult_graphrag::embedding::HashingEmbedder;
use consult_graphrag::llm::Generator;
use consult_graphrag::memory_store::MemoryStore;
use consult_graphrag::models::SourceDocument;
use consult_graphrag::{Error, GraphRag, Result};

pub const DIMS: usize = 384;

pub fn test_config(extra: &[(&str, &str)]) -> AppConfig {
    let mut pairs: Vec<(String, String)> = vec![
        ("NEO4J_URI".into(), "bolt://localhost:7687".into()),
        ("NEO4J_USER".into(), "neo4j".into()),
        ("NEO4J_PASSWORD".into(), "test".into()),
        ("LLM_PROVIDER".into(), "ollama".into()),
        ("EMBEDDING_PROVIDER".into(), "hashing".into()),
    ];
    pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    AppConfig::from_lookup(|key| {
        pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .expect("configuración de test válida")
}

/// Generador guionizado: responde con una función del prompt y cuenta las llamadas.
pub struct ScriptedGenerator {
    respond: Box<dyn Fn(&str) -> Result<String> + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(prompt)
    }
}

/// Extracción de entidades según palabras clave presentes en el texto del prompt.
/// Cada etiqueta conserva la grafía del documento ("FEVER", "Fever", ...).
/// Las respuestas a prompts de síntesis devuelven un texto fijo.
pub fn keyword_extractor() -> Arc<ScriptedGenerator> {
    ScriptedGenerator::new(|prompt| {
        if prompt.contains("USER QUESTION:") {
            return Ok("Based on the context, the patient most likely has the flu.".into());
        }
        let text = prompt.rsplit("Text:").next().unwrap_or("");
        let lowered = text.to_ascii_lowercase();
        let pick = |needles: &[&str]| -> Vec<String> {
            needles
                .iter()
                .filter_map(|needle| {
                    let at = lowered.find(needle)?;
                    Some(format!("\"{}\"", &text[at..at + needle.len()]))
                })
                .collect()
        };
        let symptoms = pick(&["fever", "cough", "headache"]);
        let conditions = pick(&["flu", "bronchitis", "migraine"]);
        Ok(format!(
            "```json\n{{\"symptoms\": [{}], \"conditions\": [{}]}}\n```",
            symptoms.join(", "),
            conditions.join(", ")
        ))
    })
}

pub fn always_failing(message: &'static str) -> Arc<ScriptedGenerator> {
    ScriptedGenerator::new(move |_| Err(Error::provider(message)))
}

pub fn memory_rag(generator: Arc<ScriptedGenerator>) -> (GraphRag, Arc<MemoryStore>) {
    memory_rag_with(&test_config(&[]), generator)
}

pub fn memory_rag_with(cfg: &AppConfig, generator: Arc<ScriptedGenerator>) -> (GraphRag, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let rag = GraphRag::new(
        cfg,
        store.clone(),
        Arc::new(HashingEmbedder::new(DIMS)),
        generator,
    );
    (rag, store)
}

pub fn doc_a() -> SourceDocument {
    SourceDocument::new(
        "consultation_a.txt",
        "Patient reports fever since Monday. Doctor suspects flu.",
    )
}

pub fn doc_b() -> SourceDocument {
    SourceDocument::new(
        "consultation_b.txt",
        "Persistent cough for three weeks. Diagnosis: acute bronchitis.",
    )
}
