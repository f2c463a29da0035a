//! Persistent state management
//!
//! A StateManager actor owns the record store and serializes all access to
//! the target store and job ledger.

mod manager;
mod messages;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
