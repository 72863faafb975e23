//! In-memory calendar for dry runs and tests.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::calendar::{Calendar, CalendarEvent};
use crate::error::CalendarError;

/// Calendar that keeps created events in memory.
#[derive(Debug, Default)]
pub struct MemoryCalendar {
    events: RwLock<Vec<(String, CalendarEvent)>>,
    failing: bool,
}

impl MemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// A calendar that rejects every event.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    /// `(event id, event)` pairs in creation order.
    pub async fn events(&self) -> Vec<(String, CalendarEvent)> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl Calendar for MemoryCalendar {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_event(&self, event: &CalendarEvent) -> Result<String, CalendarError> {
        if self.failing {
            return Err(CalendarError::CreateFailed("calendar unavailable".into()));
        }
        let id = Uuid::new_v4().simple().to_string();
        debug!(id = %id, summary = %event.summary, start = %event.slot.start, "Recorded event");
        self.events.write().await.push((id.clone(), event.clone()));
        Ok(id)
    }
}
