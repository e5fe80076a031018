pub mod calendar_sync;
pub mod event;

pub use calendar_sync::{CalendarSyncEngine, ToggleOutcome};
pub use event::{ReminderOption, build_event_payload, generate_description, get_reminder_settings};
