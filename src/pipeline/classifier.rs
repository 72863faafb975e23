//! Classifier boundary. Turns a message into a `ClassificationResult`.
//!
//! Classification never fails from the router's point of view: any error is
//! logged and degraded to `ClassificationResult::default()`, which routes
//! nowhere.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::llm::CompletionClient;
use crate::pipeline::registry::CategoryRegistry;
use crate::pipeline::types::{ClassificationResult, Priority};

/// Max body characters sent to the model.
const BODY_PROMPT_CHARS: usize = 4000;

/// Subject markers that raise priority in the keyword classifier.
const URGENT_MARKERS: &[&str] = &["[urgent]", "urgent", "asap"];
const HIGH_MARKERS: &[&str] = &["[important]", "important", "[high]"];

/// Produces a classification for one message.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifier name for logging.
    fn name(&self) -> &str;

    async fn classify(&self, subject: &str, sender: &str, body: &str) -> ClassificationResult;
}

// ── LLM classifier ──────────────────────────────────────────────────

/// Asks a chat model to classify against the enabled categories.
pub struct LlmClassifier {
    client: Arc<dyn CompletionClient>,
    registry: Arc<CategoryRegistry>,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn CompletionClient>, registry: Arc<CategoryRegistry>) -> Self {
        Self { client, registry }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &str {
        self.client.model_name()
    }

    async fn classify(&self, subject: &str, sender: &str, body: &str) -> ClassificationResult {
        let system_prompt = build_system_prompt(&self.registry);
        let user_prompt = build_user_prompt(subject, sender, body);

        let raw = match self.client.complete_json(&system_prompt, &user_prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Classifier call failed, using default classification");
                return ClassificationResult::default();
            }
        };

        match parse_classification_response(&raw) {
            Ok(mut result) => {
                // The model may invent categories; keep only routable ones.
                result
                    .categories
                    .retain(|name| self.registry.is_enabled(name));
                debug!(
                    categories = ?result.categories,
                    priority = %result.priority,
                    "Classified message"
                );
                result
            }
            Err(e) => {
                warn!(
                    raw_response = %raw,
                    error = %e,
                    "Failed to parse classification, using default classification"
                );
                ClassificationResult::default()
            }
        }
    }
}

// ── Keyword classifier ──────────────────────────────────────────────

/// Offline fallback: matches registry keywords against subject and body.
pub struct KeywordClassifier {
    registry: Arc<CategoryRegistry>,
}

impl KeywordClassifier {
    pub fn new(registry: Arc<CategoryRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, subject: &str, _sender: &str, body: &str) -> ClassificationResult {
        let subject_lower = subject.to_lowercase();
        let text = format!("{subject_lower}\n{}", body.to_lowercase());

        // Earliest keyword hit first, so the primary category is the one
        // mentioned first (subject before body).
        let mut hits: Vec<(usize, &str)> = self
            .registry
            .enabled()
            .filter_map(|def| {
                def.keywords
                    .iter()
                    .map(|kw| kw.trim().to_lowercase())
                    .filter(|kw| !kw.is_empty())
                    .filter_map(|kw| text.find(&kw))
                    .min()
                    .map(|pos| (pos, def.name.as_str()))
            })
            .collect();
        hits.sort();
        let categories = hits.into_iter().map(|(_, name)| name.to_string()).collect();

        ClassificationResult {
            categories,
            priority: subject_priority(&subject_lower),
            ..Default::default()
        }
    }
}

/// Priority from markers in a lowercased subject.
fn subject_priority(subject_lower: &str) -> Priority {
    if URGENT_MARKERS.iter().any(|m| subject_lower.contains(m)) {
        Priority::Urgent
    } else if HIGH_MARKERS.iter().any(|m| subject_lower.contains(m)) {
        Priority::High
    } else {
        Priority::Normal
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the classification system prompt from the enabled categories.
fn build_system_prompt(registry: &CategoryRegistry) -> String {
    let mut categories = Vec::new();
    let mut keywords = Vec::new();
    for def in registry.enabled() {
        categories.push(def.name.as_str());
        keywords.extend(def.keywords.iter().map(String::as_str));
    }

    let mut prompt = String::with_capacity(1024);
    prompt.push_str("You are an expert email classifier. Analyze the email and:\n");
    prompt.push_str(&format!(
        "1. Identify relevant categories from: {}\n",
        categories.join(", ")
    ));
    prompt.push_str(&format!("2. Look for keywords: {}\n", keywords.join(", ")));
    prompt.push_str(
        "3. Determine priority (urgent/high/normal/low) based on content urgency\n\
         4. Extract any project names mentioned\n\
         5. Identify if the email appears to be spam or a sales pitch\n\
         6. Determine if this is an alert requiring attention or just a notification\n\
         7. List key points and required actions\n\n\
         Respond with ONLY a JSON object:\n\
         {\"categories\": [], \"priority\": \"normal\", \"project_names\": [], \"key_points\": [], \
         \"action_items\": [], \"is_spam\": false, \"is_sales_pitch\": false, \"is_alert\": false}\n\n\
         Rules:\n\
         - List the most relevant category first\n\
         - Use only the category names listed above\n\
         - Spam: unsolicited offers, too-good-to-be-true promises, requests for sensitive information\n\
         - Sales pitch: product or service offerings, promotional language, discounts\n\
         - Alerts require immediate attention; notifications are informational only",
    );
    prompt
}

/// Build the user prompt for one message.
fn build_user_prompt(subject: &str, sender: &str, body: &str) -> String {
    let mut prompt = String::with_capacity(256 + body.len().min(BODY_PROMPT_CHARS));
    prompt.push_str(&format!("From: {sender}\n"));
    prompt.push_str(&format!("Subject: {subject}\n"));
    let body_preview: String = body.chars().take(BODY_PROMPT_CHARS).collect();
    prompt.push_str(&format!("\nBody:\n{body_preview}"));
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse a model reply into a normalized classification.
fn parse_classification_response(raw: &str) -> Result<ClassificationResult, String> {
    let json_str = extract_json_object(raw);
    let result: ClassificationResult =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;
    Ok(result.normalized())
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
