//! Mailbox abstraction and report delivery channels.

pub mod email;
pub mod memory;

pub use email::{SmtpConfig, SmtpReportSink};
pub use memory::MemoryMailbox;

use async_trait::async_trait;

use crate::error::MailboxError;
use crate::pipeline::types::{Message, MessageRef};

/// Trait for mailbox backends. Pure I/O, no routing logic.
///
/// Every call either succeeds or reports a failure; the router never
/// retries on its own.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Backend name for logging (e.g. "gmail", "memory").
    fn name(&self) -> &str;

    /// Up to `max` unread messages, oldest first.
    async fn list_unread(&self, max: usize) -> Result<Vec<MessageRef>, MailboxError>;

    /// Fetch a full message.
    async fn get(&self, id: &str) -> Result<Message, MailboxError>;

    /// Forward a message to one address.
    async fn forward(&self, id: &str, to_address: &str) -> Result<(), MailboxError>;

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError>;

    async fn add_label(&self, id: &str, label: &str) -> Result<(), MailboxError>;

    async fn mark_important(&self, id: &str) -> Result<(), MailboxError>;
}
