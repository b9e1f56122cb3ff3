//! Error types for the lifecycle engine.
//!
//! Every precondition failure surfaces as a [`LifelineError`] with a stable
//! [`ErrorKind`]. Hosts turn errors into structured responses through
//! [`ErrorBody`] and pick a transport status with [`LifelineError::status_code`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::request::{ProofId, RequestId};
use crate::domain::volunteer::VolunteerId;

/// Result type alias using the lifeline error type.
pub type Result<T> = std::result::Result<T, LifelineError>;

/// Main error type for the lifecycle engine.
#[derive(Error, Debug)]
pub enum LifelineError {
    /// A request, proof, volunteer or account does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The actor is outside the scope allowed for this action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The aggregate is in a state that does not allow the transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing required field or invalid enum value
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request write committed but the volunteer-ledger write did not.
    ///
    /// Complete it with `LifecycleCoordinator::reconcile_ledger`; the ledger
    /// side is idempotent.
    #[error(
        "Partial application on request {request_id}: ledger update for volunteer {volunteer_id} failed: {source}"
    )]
    PartialApplication {
        request_id: RequestId,
        volunteer_id: VolunteerId,
        proof_id: Option<ProofId>,
        #[source]
        source: Box<LifelineError>,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable error kind, safe to expose to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    Validation,
    PartialApplication,
    Internal,
}

impl LifelineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LifelineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LifelineError::NotFound { .. } => ErrorKind::NotFound,
            LifelineError::Forbidden(_) => ErrorKind::Forbidden,
            LifelineError::Conflict(_) => ErrorKind::Conflict,
            LifelineError::Validation(_) => ErrorKind::Validation,
            LifelineError::PartialApplication { .. } => ErrorKind::PartialApplication,
            LifelineError::Serialization(_) | LifelineError::Other(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-equivalent status: 4xx for caller-caused failures, 5xx otherwise.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::Validation => 422,
            ErrorKind::PartialApplication => 503,
            ErrorKind::Internal => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Partial applications can be completed by retrying; nothing else is
    /// worth retrying without a change on the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LifelineError::PartialApplication { .. })
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Structured error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&LifelineError> for ErrorBody {
    fn from(err: &LifelineError) -> Self {
        err.to_body()
    }
}
