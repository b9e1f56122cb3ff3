//! Help-request lifecycle and volunteer matching engine.
//!
//! Help seekers submit requests, moderators and district leads vet them,
//! volunteers accept open requests and submit proof of completion, and
//! reviewers accept or reject that proof. Accepted proof credits the volunteer
//! with points according to the request's urgency.
//!
//! The [`LifecycleCoordinator`] runs every operation: it authorizes the actor
//! against the role policy table in [`auth`], applies the transition to the
//! request aggregate through a [`Storage`] conditional write, and then settles
//! the volunteer's ledger. Storage is in memory by default, or PostgreSQL with
//! the `postgres` feature.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lifeline::{InMemoryStorage, LifecycleCoordinator};
//! use lifeline::external::{InMemoryDirectory, MockBlobStore, NominatimGeocoder};
//!
//! let coordinator = LifecycleCoordinator::new(
//!     Arc::new(InMemoryStorage::new()),
//!     Arc::new(MockBlobStore::new()),
//!     Arc::new(NominatimGeocoder::default()),
//!     Arc::new(InMemoryDirectory::new()),
//! );
//! # let _ = coordinator;
//! ```

pub mod auth;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod external;
pub mod manager;
pub mod metrics;
pub mod points;

// Re-export commonly used types
pub use coordinator::{
    IdDocument, LeaderboardEntry, LifecycleConfig, LifecycleCoordinator, ProofMedia,
    ProofReceipt, ProofSubmission, RequestForm, RequestQuery, TransitionOutcome,
};
pub use domain::actor::{Account, AccountId, Actor, Role};
pub use domain::request::{
    AdminStatus, Category, HelpRequest, ModerationDecision, ProofId, RequestId, RequestStatus,
    ReviewDecision, UrgencyLevel,
};
pub use domain::volunteer::{Volunteer, VolunteerId, VolunteerStatus};
pub use error::{ErrorBody, ErrorKind, LifelineError, Result};
pub use manager::{InMemoryStorage, Page, Storage};
#[cfg(feature = "postgres")]
pub use manager::postgres::{PoolProvider, PostgresStorage};
#[cfg(feature = "metrics")]
pub use crate::metrics::LifelineMetrics;
pub use points::{PointsPolicy, RewardTable};

/// Get the lifeline database migrator
///
/// Returns a migrator that can be run against a connection pool.
#[cfg(feature = "postgres")]
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
