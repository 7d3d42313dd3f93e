//! Tipos de error del motor GraphRAG.
//!
//! La taxonomía distingue entre fallos locales a un elemento (recuperables:
//! un fichero, una extracción, una pregunta) y fallos de la infraestructura
//! compartida (fatales: Neo4j, configuración).

use std::path::PathBuf;

use thiserror::Error;

/// Etapa de una consulta en la que se produjo un fallo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Embedding,
    Retrieving,
    Synthesizing,
}

impl std::fmt::Display for QueryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QueryStage::Embedding => "embedding",
            QueryStage::Retrieving => "retrieving",
            QueryStage::Synthesizing => "synthesizing",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuración inválida: {0}")]
    Config(String),

    /// Conectividad o consulta fallida contra el grafo. Siempre fatal para la ingesta.
    #[error("Error del grafo: {0}")]
    Store(String),

    /// Error devuelto por el servicio de LLM o de embeddings.
    #[error("Error del proveedor LLM: {message}")]
    Provider { transient: bool, message: String },

    #[error("Dimensión de embedding inesperada: se esperaba {expected}, se obtuvo {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No se pudo leer {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No se pudo decodificar {}", path.display())]
    Decode { path: PathBuf },

    #[error("La consulta falló en la etapa '{stage}': {source}")]
    Query {
        stage: QueryStage,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Marcadores de estado que identifican errores transitorios del proveedor
/// (límite de peticiones o carga útil demasiado grande).
const TRANSIENT_MARKERS: &[&str] = &[
    "429",
    "413",
    "rate limit",
    "rate_limit",
    "too many requests",
    "payload too large",
    "request too large",
];

impl Error {
    /// Construye un error de proveedor clasificándolo por su contenido.
    pub fn provider(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        let transient = TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m));
        Error::Provider { transient, message }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Error::Provider { transient, .. } => *transient,
            Error::Query { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn at_stage(self, stage: QueryStage) -> Self {
        Error::Query {
            stage,
            source: Box::new(self),
        }
    }
}

impl From<neo4rs::Error> for Error {
    fn from(err: neo4rs::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<rig::completion::PromptError> for Error {
    fn from(err: rig::completion::PromptError) -> Self {
        Error::provider(err.to_string())
    }
}

impl From<rig::embeddings::EmbeddingError> for Error {
    fn from(err: rig::embeddings::EmbeddingError) -> Self {
        Error::provider(err.to_string())
    }
}
