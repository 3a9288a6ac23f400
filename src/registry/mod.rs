//! Batch Registry Module
//!
//! Owns every batch record, the identifier counter and the event log.
//! Mutations are atomic and serialized; durable storage lives in SQLite.

mod allocator;
mod database;
mod registry;
mod state;


pub use allocator::IdAllocator;
pub use database::Database;
pub use registry::{BatchRegistry, MAX_EVENT_PAGE};
pub use state::RegistryState;
