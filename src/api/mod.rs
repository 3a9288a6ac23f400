//! API Module
//!
//! JSON-RPC endpoint exposing the batch registry to supply-chain
//! participants and auditors.

mod server;

#[cfg(test)]
mod tests;

pub use server::{router, Server};
