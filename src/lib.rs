//! Provenance registry for agricultural product batches.
//! Records who originated each batch, who holds it now and what state it
//! is in, with every accepted change kept in an append-only event log.

pub mod types; // Batch records, events and the registry error type.
pub mod api; // JSON-RPC endpoint over the registry.
pub mod validation; // Identifier checks and the pluggable mutation gate.
pub mod events; // Append-only event log and live event broadcast.
pub mod registry; // Identifier allocation, registry state and SQLite storage.
pub mod config; // Defines and loads service configuration.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use registry::BatchRegistry;
