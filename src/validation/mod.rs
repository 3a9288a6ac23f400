//! Validation Module
//!
//! Checks a requested mutation before the registry accepts it: the target
//! identifier must already be issued, and the configured `MutationGate`
//! must allow it.

mod validator;
pub use validator::{check_batch_id, Mutation, MutationGate, OpenGate, Validator};
