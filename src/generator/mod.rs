//! Narrative generator gateway.
//!
//! The report narrative comes from an external language model. This module owns
//! the call boundary: the [`NarrativeGenerator`] trait, an OpenRouter adapter,
//! and a retrying wrapper. Prompt content and reply parsing live in
//! [`crate::narrative`].

pub mod error;
pub mod openrouter;
pub mod types;

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

pub use error::{ErrorContext, GeneratorError};
pub use openrouter::OpenRouterGenerator;
pub use types::*;

#[async_trait::async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, req: GenerationRequest) -> Result<GenerationReply, GeneratorError>;
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Wraps a generator and retries retryable failures with exponential backoff.
pub struct RetryingGenerator<G> {
    inner: G,
    config: GeneratorConfig,
}

impl<G: NarrativeGenerator> RetryingGenerator<G> {
    pub fn new(inner: G) -> Self {
        Self::with_config(inner, GeneratorConfig::default())
    }

    pub fn with_config(inner: G, config: GeneratorConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

impl RetryingGenerator<OpenRouterGenerator> {
    pub fn from_env() -> Result<Self, GeneratorError> {
        Ok(Self::new(OpenRouterGenerator::from_env()?))
    }
}

#[async_trait::async_trait]
impl<G: NarrativeGenerator> NarrativeGenerator for RetryingGenerator<G> {
    async fn generate(&self, req: GenerationRequest) -> Result<GenerationReply, GeneratorError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(req.clone()).await {
                Ok(reply) => {
                    debug!(
                        caller = req.caller,
                        model = %req.model,
                        attempt,
                        input_tokens = reply.input_tokens,
                        output_tokens = reply.output_tokens,
                        latency_ms = reply.latency.as_millis() as u64,
                        "narrative generated"
                    );
                    return Ok(reply);
                }
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    let delay = match &err {
                        GeneratorError::RateLimited { retry_after, .. } => {
                            (*retry_after).max(backoff_delay(self.config.retry_base_delay, attempt))
                        }
                        _ => backoff_delay(self.config.retry_base_delay, attempt),
                    };
                    warn!(
                        caller = req.caller,
                        code = err.code(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "narrative generation failed, retrying: {err}"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.pow(attempt.min(5));
    base * multiplier
}
