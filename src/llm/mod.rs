//! LLM integration for the classifier.
//!
//! Uses rig-core for the OpenAI transport and `RigAdapter` to bridge rig's
//! `CompletionModel` to our `CompletionClient`. The classifier only sees
//! `CompletionClient`, so tests can swap in a canned responder.

mod rig_adapter;

pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient as _;
use secrecy::ExposeSecret;

use crate::error::ClassifierError;

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for creating a completion client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// A chat model that answers with a JSON document.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send a system + user prompt pair and return the raw reply text.
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, ClassifierError>;
}

/// Create a completion client from configuration.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn CompletionClient>, ClassifierError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ClassifierError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI classifier (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, "openai")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_client_keeps_model_name() {
        // Construction accepts any key; auth fails on the first request.
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
        };
        let client = create_client(&config).unwrap();
        assert_eq!(client.model_name(), "gpt-4o");
    }
}
