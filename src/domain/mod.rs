//! Core domain types for the lifecycle engine.
//!
//! Pure data and state transitions, no persistence dependencies:
//! - Actors and accounts
//! - Help requests, proofs and the two status axes
//! - Volunteers and their reputation ledger

pub mod actor;
pub mod request;
pub mod volunteer;

pub use actor::{Account, AccountId, Actor, Role};
