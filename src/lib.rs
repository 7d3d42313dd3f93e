//! GraphRAG híbrido sobre transcripciones de consultas médicas.
//!
//! Ingesta de documentos en Neo4j (consultas, síntomas, enfermedades y un
//! índice vectorial nativo) y respuesta a preguntas combinando búsqueda por
//! similitud, recorrido del grafo y síntesis con un LLM.

pub mod api;
pub mod app_state;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod graph_store;
pub mod ingest;
pub mod llm;
pub mod memory_store;
pub mod models;
pub mod neo4j_client;
pub mod rag;
pub mod retrieval;
pub mod retry;

pub use error::{Error, Result};
pub use rag::{Answer, GraphRag, NO_CONTEXT_ANSWER};
