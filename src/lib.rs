//! Inbox Router: classifies unread mail, forwards it by category, schedules
//! reminders and reports on each run.

pub mod calendar;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod report;
