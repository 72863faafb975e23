//! Reminder slot scheduler.
//!
//! Hands out calendar slots for reminders within one run so that reminders
//! created by the same run never start at the same time. Two modes:
//!
//! - **shared-slot** (`slot_minutes == 0`): every reminder gets `now`
//!   clamped into the working-hours window; no state is kept.
//! - **packed-slot**: the first reminder snaps to the next slot boundary
//!   after `now`, each following one is one slot later, rolling over to the
//!   window start on the next day once past `end`.
//!
//! The window is closed on both ends: a slot may start exactly at `end`.
//! Only overlap within a run is prevented; existing calendar events are not
//! consulted.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// A reserved calendar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl CalendarSlot {
    fn new(start: NaiveDateTime, duration_minutes: u32) -> Self {
        Self {
            start,
            end: start + TimeDelta::minutes(i64::from(duration_minutes)),
        }
    }
}

/// Validated scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConfig {
    start: NaiveTime,
    end: NaiveTime,
    slot_minutes: u32,
    default_duration_minutes: u32,
}

impl SlotConfig {
    /// Validate and build scheduler settings.
    ///
    /// The window must be non-empty (`start < end`) and events must last at
    /// least a minute.
    pub fn new(
        start: NaiveTime,
        end: NaiveTime,
        slot_minutes: u32,
        default_duration_minutes: u32,
    ) -> Result<Self, ConfigError> {
        if start >= end {
            return Err(ConfigError::invalid(
                "calendar window",
                format!("start {start} must be before end {end}"),
            ));
        }
        if default_duration_minutes == 0 {
            return Err(ConfigError::invalid(
                "default_duration_minutes",
                "must be greater than zero",
            ));
        }
        Ok(Self {
            start,
            end,
            slot_minutes,
            default_duration_minutes,
        })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn slot_minutes(&self) -> u32 {
        self.slot_minutes
    }

    pub fn default_duration_minutes(&self) -> u32 {
        self.default_duration_minutes
    }

    pub fn is_shared_slot(&self) -> bool {
        self.slot_minutes == 0
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_minutes: 30,
            default_duration_minutes: 60,
        }
    }
}

/// Per-run slot allocator. Create a fresh one (or `reset`) for every run.
#[derive(Debug, Clone)]
pub struct SlotScheduler {
    config: SlotConfig,
    current_slot: Option<CalendarSlot>,
}

impl SlotScheduler {
    pub fn new(config: SlotConfig) -> Self {
        Self {
            config,
            current_slot: None,
        }
    }

    /// Forget the last allocated slot.
    pub fn reset(&mut self) {
        self.current_slot = None;
    }

    /// Last slot handed out in packed mode, if any.
    pub fn current_slot(&self) -> Option<CalendarSlot> {
        self.current_slot
    }

    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    /// Allocate the next slot with the default event duration.
    pub fn allocate_next(&mut self, now: NaiveDateTime) -> CalendarSlot {
        self.allocate_next_lasting(now, self.config.default_duration_minutes)
    }

    /// Allocate the next slot with an explicit event duration.
    ///
    /// The duration only affects `end`; slot spacing is always
    /// `slot_minutes`.
    pub fn allocate_next_lasting(&mut self, now: NaiveDateTime, duration_minutes: u32) -> CalendarSlot {
        if self.config.is_shared_slot() {
            let slot = CalendarSlot::new(self.clamp_into_window(now), duration_minutes);
            debug!(start = %slot.start, "Allocated shared reminder slot");
            return slot;
        }

        let start = match self.current_slot {
            Some(current) if current.start.date() >= now.date() => {
                let next = self.advance(current.start);
                let fresh = self.snap_to_boundary(now);
                next.max(fresh)
            }
            _ => self.snap_to_boundary(now),
        };

        let slot = CalendarSlot::new(start, duration_minutes);
        self.current_slot = Some(slot);
        debug!(start = %slot.start, end = %slot.end, "Allocated packed reminder slot");
        slot
    }

    /// `now` if inside the window, else the next window start.
    fn clamp_into_window(&self, now: NaiveDateTime) -> NaiveDateTime {
        let time = now.time();
        if time < self.config.start {
            now.date().and_time(self.config.start)
        } else if time > self.config.end {
            next_day(now.date()).and_time(self.config.start)
        } else {
            now
        }
    }

    /// First slot boundary strictly after `now`, counted from the window start.
    fn snap_to_boundary(&self, now: NaiveDateTime) -> NaiveDateTime {
        let time = now.time();
        let date = now.date();
        if time < self.config.start {
            return date.and_time(self.config.start);
        }
        if time > self.config.end {
            return next_day(date).and_time(self.config.start);
        }

        let slot_secs = i64::from(self.config.slot_minutes) * 60;
        let elapsed_secs = (time - self.config.start).num_seconds();
        let slots_to_skip = elapsed_secs / slot_secs + 1;
        let candidate = date.and_time(self.config.start) + TimeDelta::seconds(slots_to_skip * slot_secs);
        self.roll_if_outside(date, candidate)
    }

    /// One slot after `previous`, rolling over past the window end.
    fn advance(&self, previous: NaiveDateTime) -> NaiveDateTime {
        let candidate = previous + TimeDelta::minutes(i64::from(self.config.slot_minutes));
        self.roll_if_outside(previous.date(), candidate)
    }

    fn roll_if_outside(&self, date: NaiveDate, candidate: NaiveDateTime) -> NaiveDateTime {
        if candidate.date() != date || candidate.time() > self.config.end {
            next_day(date).and_time(self.config.start)
        } else {
            candidate
        }
    }
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}
