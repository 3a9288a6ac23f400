//! Events Module
//!
//! The append-only event log and the broadcast bus that delivers new
//! events to live subscribers.

mod bus;
mod log;

pub use bus::{spawn_logging_listener, EventBus};
pub use log::EventLog;
