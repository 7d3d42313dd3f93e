//! Abstracción sobre Rig para la generación de texto con distintos proveedores.
//!
//! El motor sólo necesita `generate(prompt) -> text`: una petición de un único
//! turno, sin estado. Las plantillas de prompt viven en `extract` y `rag`.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient as _;
use rig::completion::Prompt;
use rig::providers::{groq, ollama, openai};
use tracing::debug;

use crate::config::{AppConfig, LlmProvider};
use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, RetryingGenerator};

/// Capacidad de generación de texto.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Arc<G> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}

#[derive(Clone)]
enum ChatBackend {
    OpenAI(openai::Client),
    Groq(groq::Client),
    Ollama(ollama::Client),
}

/// Gestor de LLMs de chat.
#[derive(Clone)]
pub struct LlmManager {
    backend: ChatBackend,
    chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let api_key = || {
            cfg.llm_api_key
                .as_deref()
                .ok_or_else(|| Error::Config("Falta LLM_API_KEY".into()))
        };

        let backend = match cfg.llm_provider {
            LlmProvider::OpenAI => ChatBackend::OpenAI(openai::Client::new(api_key()?)),
            LlmProvider::Groq => ChatBackend::Groq(groq::Client::new(api_key()?)),
            LlmProvider::Ollama => ChatBackend::Ollama(ollama::Client::new()),
        };

        Ok(Self {
            backend,
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    /// Envuelve el manager con la política de reintentos ante límites de tasa.
    pub fn with_retries(self, cfg: &AppConfig) -> RetryingGenerator<Self> {
        RetryingGenerator::new(
            self,
            RetryPolicy::new(cfg.llm_max_retries, cfg.rate_limit_cooldown),
        )
    }
}

#[async_trait]
impl Generator for LlmManager {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Petición de generación ({} caracteres) a {}", prompt.len(), self.chat_model);

        // Temperatura 0: la extracción debe ser lo más estable posible.
        let answer = match &self.backend {
            ChatBackend::OpenAI(client) => {
                let agent = client.agent(&self.chat_model).temperature(0.0).build();
                agent.prompt(prompt).await?
            }
            ChatBackend::Groq(client) => {
                let agent = client.agent(&self.chat_model).temperature(0.0).build();
                agent.prompt(prompt).await?
            }
            ChatBackend::Ollama(client) => {
                let agent = client.agent(&self.chat_model).temperature(0.0).build();
                agent.prompt(prompt).await?
            }
        };

        Ok(answer)
    }
}
