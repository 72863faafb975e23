//! Calendar boundary for reminder event creation.

pub mod memory;

pub use memory::MemoryCalendar;

use async_trait::async_trait;

use crate::error::CalendarError;
use crate::pipeline::slots::CalendarSlot;

/// Everything needed to create one reminder event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub slot: CalendarSlot,
    pub color_id: String,
    /// Popup reminder lead time.
    pub reminder_minutes: u32,
    /// IANA zone name the slot's local times are expressed in.
    pub timezone: String,
}

/// Trait for calendar backends.
#[async_trait]
pub trait Calendar: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Create the event and return its backend id.
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, CalendarError>;
}

/// Web link to an event by id.
pub fn event_link(event_id: &str) -> String {
    format!("https://www.google.com/calendar/event?eid={event_id}")
}
