//! In-memory mailbox. Backs dry runs from a JSON spool file and tests.
//!
//! Forwards, labels and read flags are recorded rather than sent anywhere.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::channels::Mailbox;
use crate::error::{ConfigError, MailboxError};
use crate::pipeline::types::{Message, MessageRef};

#[derive(Debug, Clone)]
struct StoredMessage {
    message: Message,
    unread: bool,
    important: bool,
    labels: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    messages: Vec<StoredMessage>,
    forwards: Vec<(String, String)>,
}

/// Mailbox held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    state: RwLock<State>,
    failing_addresses: HashSet<String>,
    failing_messages: HashSet<String>,
}

impl MemoryMailbox {
    /// Create a mailbox whose messages all start unread.
    pub fn new(messages: impl IntoIterator<Item = Message>) -> Self {
        let messages = messages
            .into_iter()
            .map(|message| StoredMessage {
                message,
                unread: true,
                important: false,
                labels: Vec::new(),
            })
            .collect();
        Self {
            state: RwLock::new(State {
                messages,
                forwards: Vec::new(),
            }),
            ..Default::default()
        }
    }

    /// Load messages from a JSON array spool file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let messages: Vec<Message> = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("spool {}: {e}", path.display())))?;
        info!(path = %path.display(), count = messages.len(), "Loaded message spool");
        Ok(Self::new(messages))
    }

    /// Make every forward to `address` fail.
    pub fn fail_forwards_to(mut self, address: &str) -> Self {
        self.failing_addresses.insert(address.to_lowercase());
        self
    }

    /// Make fetching message `id` fail.
    pub fn fail_fetch_of(mut self, id: &str) -> Self {
        self.failing_messages.insert(id.to_string());
        self
    }

    /// `(message id, address)` pairs forwarded so far.
    pub async fn forwards(&self) -> Vec<(String, String)> {
        self.state.read().await.forwards.clone()
    }

    pub async fn labels(&self, id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .messages
            .iter()
            .find(|m| m.message.id == id)
            .map(|m| m.labels.clone())
            .unwrap_or_default()
    }

    pub async fn is_unread(&self, id: &str) -> bool {
        self.state
            .read()
            .await
            .messages
            .iter()
            .any(|m| m.message.id == id && m.unread)
    }

    pub async fn is_important(&self, id: &str) -> bool {
        self.state
            .read()
            .await
            .messages
            .iter()
            .any(|m| m.message.id == id && m.important)
    }

    async fn update<F>(&self, id: &str, f: F) -> Result<(), MailboxError>
    where
        F: FnOnce(&mut StoredMessage),
    {
        let mut state = self.state.write().await;
        let stored = state
            .messages
            .iter_mut()
            .find(|m| m.message.id == id)
            .ok_or_else(|| MailboxError::NotFound { id: id.to_string() })?;
        f(stored);
        Ok(())
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_unread(&self, max: usize) -> Result<Vec<MessageRef>, MailboxError> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.unread)
            .take(max)
            .map(|m| MessageRef {
                id: m.message.id.clone(),
            })
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Message, MailboxError> {
        if self.failing_messages.contains(id) {
            return Err(MailboxError::NotFound { id: id.to_string() });
        }
        self.state
            .read()
            .await
            .messages
            .iter()
            .find(|m| m.message.id == id)
            .map(|m| m.message.clone())
            .ok_or_else(|| MailboxError::NotFound { id: id.to_string() })
    }

    async fn forward(&self, id: &str, to_address: &str) -> Result<(), MailboxError> {
        if self.failing_addresses.contains(&to_address.to_lowercase()) {
            return Err(MailboxError::ForwardFailed {
                id: id.to_string(),
                to: to_address.to_string(),
                reason: "recipient rejected".into(),
            });
        }
        let mut state = self.state.write().await;
        if !state.messages.iter().any(|m| m.message.id == id) {
            return Err(MailboxError::NotFound { id: id.to_string() });
        }
        state.forwards.push((id.to_string(), to_address.to_string()));
        debug!(id, to = to_address, "Recorded forward");
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        self.update(id, |m| m.unread = false).await
    }

    async fn add_label(&self, id: &str, label: &str) -> Result<(), MailboxError> {
        self.update(id, |m| {
            if !m.labels.iter().any(|l| l == label) {
                m.labels.push(label.to_string());
            }
        })
        .await
    }

    async fn mark_important(&self, id: &str) -> Result<(), MailboxError> {
        self.update(id, |m| m.important = true).await
    }
}
