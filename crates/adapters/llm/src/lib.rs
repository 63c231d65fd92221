//! # mindhub-adapter-llm
//!
//! Model backend adapters implementing [`LlmBackend`](mindhub_app::ports::LlmBackend).
//!
//! Each provider module owns its wire shapes and the conversion to and from
//! the canonical [`Message`](mindhub_domain::message::Message) turns; the
//! rest of the system never sees a provider-specific type.

use std::sync::Arc;

use mindhub_app::ports::LlmBackend;

pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

/// Backend selection and credentials, read from configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `anthropic`, `openai` or `ollama`.
    pub provider: String,
    /// API key, required for hosted providers.
    pub api_key: Option<String>,
    /// Model name passed through to the provider.
    pub model: String,
    /// Override of the provider's default endpoint.
    pub base_url: Option<String>,
}

/// Configuration mistakes caught while building a backend.
#[derive(Debug, thiserror::Error)]
pub enum LlmConfigError {
    #[error("unknown llm provider: {0}")]
    UnknownProvider(String),

    #[error("provider {0} requires an api key")]
    MissingApiKey(&'static str),
}

/// Build the configured backend.
///
/// # Errors
///
/// Returns [`LlmConfigError`] for an unknown provider name or a hosted
/// provider without an API key.
pub fn build_backend(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>, LlmConfigError> {
    match config.provider.as_str() {
        "anthropic" => {
            let api_key = config
                .api_key
                .clone()
                .ok_or(LlmConfigError::MissingApiKey("anthropic"))?;
            Ok(Arc::new(AnthropicBackend::new(
                api_key,
                config.model.clone(),
                config.base_url.clone(),
            )))
        }
        "openai" => {
            let api_key = config
                .api_key
                .clone()
                .ok_or(LlmConfigError::MissingApiKey("openai"))?;
            Ok(Arc::new(OpenAiBackend::new(
                api_key,
                config.model.clone(),
                config.base_url.clone(),
            )))
        }
        "ollama" => Ok(Arc::new(OllamaBackend::new(
            config.model.clone(),
            config.base_url.clone(),
        ))),
        other => Err(LlmConfigError::UnknownProvider(other.to_string())),
    }
}
