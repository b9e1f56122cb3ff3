//! Help-request aggregate: domain model and state transitions.
//!
//! - Request data, proofs and the two status axes live in [`state`]
//! - Transition methods live in [`transitions`]

pub mod state;
pub mod transitions;

pub use state::*;
pub use transitions::*;
