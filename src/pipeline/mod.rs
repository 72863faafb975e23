//! Classification-to-action routing pipeline.
//!
//! Every unread message flows through:
//! 1. `Classifier::classify()`: categories, priority, action items
//! 2. `TargetResolver::resolve()`: deduplicated forward targets
//! 3. `ReminderPolicy` + `SlotScheduler`: optional calendar reminder
//! 4. `RunAggregator`: append-only bookkeeping for the run report
//!
//! `RunProcessor` wires these to the mailbox and calendar backends;
//! `runner` repeats it on a timer.

pub mod aggregator;
pub mod classifier;
pub mod processor;
pub mod registry;
pub mod reminder;
pub mod resolver;
pub mod runner;
pub mod slots;
pub mod types;
