//! Carga y gestión de configuración de la aplicación (Neo4j + LLM + índice).
//!
//! La configuración se lee una única vez al arrancar el proceso y se inyecta
//! en cada componente; ningún módulo de negocio consulta el entorno.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Groq,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::Config(format!("Proveedor LLM no soportado: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    OpenAI,
    Ollama,
    /// Embeddings deterministas locales (feature hashing), sin red.
    Hashing,
}

impl EmbeddingProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            other => Err(Error::Config(format!(
                "Proveedor de embeddings no soportado: {other}"
            ))),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub server_addr: String,
    pub corpus_dir: PathBuf,

    pub llm_provider: LlmProvider,
    pub llm_api_key: Option<String>,
    pub llm_chat_model: String,

    pub embedding_provider: EmbeddingProvider,
    pub embedding_api_key: Option<String>,
    pub embedding_model: String,
    pub embedding_dimensions: usize,

    pub vector_index_name: String,
    pub top_k: usize,
    pub max_document_chars: usize,
    pub context_document_chars: usize,
    pub normalization_language: String,

    pub llm_max_retries: u32,
    pub rate_limit_cooldown: Duration,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de claves.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("Falta {key} en el entorno")))
        };
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let neo4j_uri = required("NEO4J_URI")?;
        let neo4j_user = required("NEO4J_USER")?;
        let neo4j_password = required("NEO4J_PASSWORD")?;

        let llm_provider = LlmProvider::from_str(&or_default("LLM_PROVIDER", "groq"))?;
        let embedding_provider =
            EmbeddingProvider::from_str(&or_default("EMBEDDING_PROVIDER", "ollama"))?;

        let cfg = Self {
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            server_addr: or_default("SERVER_ADDR", "127.0.0.1:3322"),
            corpus_dir: PathBuf::from(or_default("CORPUS_DIR", "medical_dialogues_50")),
            llm_provider,
            llm_api_key: optional("LLM_API_KEY"),
            llm_chat_model: or_default("LLM_CHAT_MODEL", "llama-3.1-8b-instant"),
            embedding_provider,
            embedding_api_key: optional("EMBEDDING_API_KEY"),
            embedding_model: or_default("EMBEDDING_MODEL", "all-minilm"),
            embedding_dimensions: parse_number(&lookup, "EMBEDDING_DIMENSIONS", 384)?,
            vector_index_name: or_default("VECTOR_INDEX_NAME", "consultation_vector"),
            top_k: parse_number(&lookup, "RETRIEVAL_TOP_K", 3)?,
            max_document_chars: parse_number(&lookup, "MAX_DOCUMENT_CHARS", 4000)?,
            context_document_chars: parse_number(&lookup, "CONTEXT_DOCUMENT_CHARS", 5000)?,
            normalization_language: or_default("NORMALIZATION_LANGUAGE", "English"),
            llm_max_retries: parse_number(&lookup, "LLM_MAX_RETRIES", 3)?,
            rate_limit_cooldown: Duration::from_secs(parse_number(
                &lookup,
                "RATE_LIMIT_COOLDOWN_SECS",
                30,
            )?),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        check_neo4j_uri(&self.neo4j_uri)?;
        if !is_plain_identifier(&self.vector_index_name) {
            return Err(Error::Config(format!(
                "VECTOR_INDEX_NAME debe ser un identificador simple: '{}'",
                self.vector_index_name
            )));
        }
        if self.embedding_dimensions == 0 {
            return Err(Error::Config("EMBEDDING_DIMENSIONS debe ser > 0".into()));
        }
        if self.top_k == 0 {
            return Err(Error::Config("RETRIEVAL_TOP_K debe ser > 0".into()));
        }
        if self.llm_provider != LlmProvider::Ollama && self.llm_api_key.is_none() {
            return Err(Error::Config(format!(
                "LLM_API_KEY es obligatorio para el proveedor {:?}",
                self.llm_provider
            )));
        }
        if self.embedding_provider == EmbeddingProvider::OpenAI
            && self.embedding_api_key.is_none()
            && self.llm_api_key.is_none()
        {
            return Err(Error::Config(
                "EMBEDDING_API_KEY es obligatorio para embeddings de OpenAI".into(),
            ));
        }
        Ok(())
    }
}

/// Esquemas Bolt admitidos; los terminados en `+s` usan TLS.
const NEO4J_SCHEMES: &[&str] = &["bolt", "bolt+s", "neo4j", "neo4j+s"];

/// La URI se entrega intacta al driver, que decide el cifrado por su esquema.
fn check_neo4j_uri(uri: &str) -> Result<()> {
    let url = Url::parse(uri)
        .map_err(|e| Error::Config(format!("NEO4J_URI inválida ({uri}): {e}")))?;
    if !NEO4J_SCHEMES.contains(&url.scheme()) {
        return Err(Error::Config(format!(
            "NEO4J_URI con esquema no soportado '{}' (se admite {})",
            url.scheme(),
            NEO4J_SCHEMES.join(", ")
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::Config(format!("NEO4J_URI sin host: {uri}")));
    }
    Ok(())
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} no es un número válido: '{raw}'"))),
    }
}

/// Los nombres de índice se interpolan en Cypher, así que sólo se admiten
/// identificadores `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
