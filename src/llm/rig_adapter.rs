//! Bridges a rig-core `CompletionModel` to our `CompletionClient`.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};

use crate::error::ClassifierError;
use crate::llm::CompletionClient;

/// Low temperature keeps classifications stable between runs.
const TEMPERATURE: f64 = 0.1;

/// Wraps a rig completion model for single-shot JSON classification.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> CompletionClient for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<String, ClassifierError> {
        let response = self
            .model
            .completion_request(user.to_string())
            .preamble(system.to_string())
            .temperature(TEMPERATURE)
            .send()
            .await
            .map_err(|e| ClassifierError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })?;

        let texts = response
            .choice
            .into_iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect();
        join_reply(self.provider, texts)
    }
}

/// Join the text parts of a reply; a reply with no text is invalid.
fn join_reply(provider: &str, texts: Vec<String>) -> Result<String, ClassifierError> {
    let joined = texts.concat();
    if joined.trim().is_empty() {
        return Err(ClassifierError::InvalidResponse {
            provider: provider.to_string(),
            reason: "no text content in response".into(),
        });
    }
    Ok(joined)
}
