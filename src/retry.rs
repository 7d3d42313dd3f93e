//! Reintentos acotados ante errores transitorios del proveedor LLM.
//!
//! Un 429 (límite de peticiones) o 413 (carga demasiado grande) no debe tumbar
//! una ingesta de decenas de ficheros: se hace una pausa larga y se reintenta.
//! Cualquier otro error se propaga en el primer intento.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;

use crate::error::Result;
use crate::llm::Generator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reintentos tras el primer intento.
    pub max_retries: u32,
    /// Pausa antes de cada reintento.
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, cooldown: Duration) -> Self {
        Self {
            max_retries,
            cooldown,
        }
    }

    /// Ejecuta la operación, reintentando sólo los errores transitorios.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Error transitorio del proveedor ({err}). Pausa de {:?} antes del reintento {}/{}",
                        self.cooldown, attempt, self.max_retries
                    );
                    sleep(self.cooldown).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Decorador de `Generator` que aplica una `RetryPolicy` a cada petición.
#[derive(Clone)]
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<G: Generator> Generator for RetryingGenerator<G> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.policy.run(|| self.inner.generate(prompt)).await
    }
}
