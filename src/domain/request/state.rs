//! Help request aggregate: identifiers, status axes and embedded proofs.
//!
//! A request carries two orthogonal status axes:
//! - [`RequestStatus`]: operational progress (Open → InProgress → PendingVerification → Resolved)
//! - [`AdminStatus`]: content moderation (pending → approved | rejected)
//!
//! Which combinations may coexist is spelled out once in [`is_legal_combination`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::actor::AccountId;
use crate::domain::volunteer::VolunteerId;
use crate::error::{LifelineError, Result};

/// Unique identifier for a help request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        RequestId(uuid)
    }
}

impl std::ops::Deref for RequestId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Unique identifier for a proof within its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofId(pub Uuid);

impl std::fmt::Display for ProofId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for ProofId {
    fn from(uuid: Uuid) -> Self {
        ProofId(uuid)
    }
}

impl std::ops::Deref for ProofId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Status axes
// ============================================================================

/// Operational progress of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    InProgress,
    PendingVerification,
    Resolved,
    Closed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Open,
        RequestStatus::InProgress,
        RequestStatus::PendingVerification,
        RequestStatus::Resolved,
        RequestStatus::Closed,
        RequestStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::PendingVerification => "pending_verification",
            RequestStatus::Resolved => "resolved",
            RequestStatus::Closed => "closed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// States in which `assigned_volunteer` must be set.
    pub fn requires_assignment(&self) -> bool {
        matches!(
            self,
            RequestStatus::InProgress | RequestStatus::PendingVerification | RequestStatus::Resolved
        )
    }

    /// States in which the request sits in the assignee's `active_requests`.
    pub fn is_active_assignment(&self) -> bool {
        matches!(
            self,
            RequestStatus::InProgress | RequestStatus::PendingVerification
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Resolved | RequestStatus::Closed | RequestStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = LifelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| LifelineError::Validation(format!("invalid request status '{s}'")))
    }
}

/// Content-moderation state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminStatus {
    Pending,
    Approved,
    Rejected,
}

impl AdminStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminStatus::Pending => "pending",
            AdminStatus::Approved => "approved",
            AdminStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminStatus {
    type Err = LifelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(AdminStatus::Pending),
            "approved" => Ok(AdminStatus::Approved),
            "rejected" => Ok(AdminStatus::Rejected),
            _ => Err(LifelineError::Validation(format!(
                "invalid admin status '{s}'"
            ))),
        }
    }
}

/// Legality table for the two status axes.
///
/// | status               | pending | approved | rejected |
/// |----------------------|---------|----------|----------|
/// | Open                 | yes     | yes      | yes      |
/// | InProgress           | -       | yes      | -        |
/// | PendingVerification  | -       | yes      | -        |
/// | Resolved             | -       | yes      | -        |
/// | Closed / Cancelled   | yes     | yes      | yes      |
pub fn is_legal_combination(status: RequestStatus, admin_status: AdminStatus) -> bool {
    match status {
        RequestStatus::Open | RequestStatus::Closed | RequestStatus::Cancelled => true,
        RequestStatus::InProgress
        | RequestStatus::PendingVerification
        | RequestStatus::Resolved => admin_status == AdminStatus::Approved,
    }
}

// ============================================================================
// Content value types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Education,
    Healthcare,
    Employment,
    Counseling,
    Emergency,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Education,
        Category::Healthcare,
        Category::Employment,
        Category::Counseling,
        Category::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Education => "Education",
            Category::Healthcare => "Healthcare",
            Category::Employment => "Employment",
            Category::Counseling => "Counseling",
            Category::Emergency => "Emergency",
        }
    }
}

impl FromStr for Category {
    type Err = LifelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LifelineError::Validation(format!("invalid category '{s}'")))
    }
}

/// Urgency tier; drives the reward paid on resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyLevel {
    pub const ALL: [UrgencyLevel; 4] = [
        UrgencyLevel::Low,
        UrgencyLevel::Medium,
        UrgencyLevel::High,
        UrgencyLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "Low",
            UrgencyLevel::Medium => "Medium",
            UrgencyLevel::High => "High",
            UrgencyLevel::Critical => "Critical",
        }
    }
}

impl FromStr for UrgencyLevel {
    type Err = LifelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        UrgencyLevel::ALL
            .into_iter()
            .find(|u| u.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LifelineError::Validation(format!("invalid urgency level '{s}'")))
    }
}

/// `[longitude, latitude]` as returned by the geocoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Free-text address as submitted
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub district: String,
    pub coordinates: Option<Coordinates>,
}

/// Contact details captured at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    pub account_id: Option<AccountId>,
    pub name: String,
    pub phone: String,
    pub email: String,
}

/// Reference to a blob held by the external blob store. File bytes never live here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub public_id: Option<String>,
    pub mime_type: Option<String>,
    pub thumbnail: Option<String>,
}

// ============================================================================
// Proofs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofReview {
    pub status: ReviewStatus,
    pub reviewer: Option<AccountId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl ProofReview {
    pub fn pending() -> Self {
        Self {
            status: ReviewStatus::Pending,
            reviewer: None,
            reviewed_at: None,
            notes: None,
        }
    }
}

/// Completion evidence submitted by the assigned volunteer.
///
/// Proofs are owned by their request, so a review update commits in the same
/// write as the request status change it drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub id: ProofId,
    pub volunteer: VolunteerId,
    pub volunteer_account: AccountId,
    pub notes: String,
    pub media: MediaRef,
    pub submitted_at: DateTime<Utc>,
    pub review: ProofReview,
}

impl Proof {
    pub fn is_pending(&self) -> bool {
        self.review.status == ReviewStatus::Pending
    }
}

/// Submitter rating of a resolved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: u8,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

// ============================================================================
// The aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpRequest {
    pub id: RequestId,
    /// Human-readable reference, e.g. `REQ-1760000000000-3f2a9c01b7de`
    pub reference: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub urgency: UrgencyLevel,
    pub district: String,
    pub location: Location,
    pub submitter: Submitter,
    pub anonymous: bool,
    pub video: Option<MediaRef>,
    pub tags: Vec<String>,

    pub status: RequestStatus,
    pub admin_status: AdminStatus,
    pub is_public: bool,

    pub assigned_volunteer: Option<VolunteerId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub proofs: Vec<Proof>,
    pub feedback: Option<Feedback>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HelpRequest {
    pub fn proof(&self, proof_id: ProofId) -> Option<&Proof> {
        self.proofs.iter().find(|p| p.id == proof_id)
    }

    pub fn proof_mut(&mut self, proof_id: ProofId) -> Option<&mut Proof> {
        self.proofs.iter_mut().find(|p| p.id == proof_id)
    }

    /// The proof currently awaiting review, if any.
    pub fn pending_proof(&self) -> Option<&Proof> {
        self.proofs.iter().find(|p| p.is_pending())
    }

    /// Open, approved and unassigned: the pool volunteers pick work from.
    pub fn is_in_open_pool(&self) -> bool {
        self.status == RequestStatus::Open
            && self.admin_status == AdminStatus::Approved
            && self.assigned_volunteer.is_none()
    }

    pub fn is_submitted_by(&self, account: AccountId) -> bool {
        self.submitter.account_id == Some(account)
    }

    /// Check every cross-field invariant of the aggregate.
    ///
    /// Transitions call this before handing the request back for persistence,
    /// so a violated invariant never reaches storage.
    pub fn check_invariants(&self) -> Result<()> {
        if self.assigned_volunteer.is_some() != self.status.requires_assignment() {
            return Err(invariant(format!(
                "request {} has status '{}' but assigned_volunteer is {}",
                self.id,
                self.status,
                if self.assigned_volunteer.is_some() {
                    "set"
                } else {
                    "unset"
                }
            )));
        }

        let pending = self.proofs.iter().filter(|p| p.is_pending()).count();
        if pending > 1 {
            return Err(invariant(format!(
                "request {} has {pending} proofs awaiting review",
                self.id
            )));
        }
        if pending == 1 && self.status != RequestStatus::PendingVerification {
            return Err(invariant(format!(
                "request {} has a pending proof while '{}'",
                self.id, self.status
            )));
        }

        if self.is_public && self.admin_status != AdminStatus::Approved {
            return Err(invariant(format!(
                "request {} is public while '{}'",
                self.id, self.admin_status
            )));
        }

        if !is_legal_combination(self.status, self.admin_status) {
            return Err(invariant(format!(
                "request {} combines status '{}' with admin status '{}'",
                self.id, self.status, self.admin_status
            )));
        }

        Ok(())
    }
}

fn invariant(message: String) -> LifelineError {
    LifelineError::Other(anyhow::anyhow!("invariant violated: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_human_and_wire_forms() {
        assert_eq!(
            "In Progress".parse::<RequestStatus>().unwrap(),
            RequestStatus::InProgress
        );
        assert_eq!(
            "pending_verification".parse::<RequestStatus>().unwrap(),
            RequestStatus::PendingVerification
        );
        assert!("Approved".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_enum_values_are_validated() {
        assert_eq!("critical".parse::<UrgencyLevel>().unwrap(), UrgencyLevel::Critical);
        assert_eq!(" Healthcare ".parse::<Category>().unwrap(), Category::Healthcare);
        assert!(matches!(
            "Urgent".parse::<UrgencyLevel>(),
            Err(LifelineError::Validation(_))
        ));
        assert!(matches!(
            "Food".parse::<Category>(),
            Err(LifelineError::Validation(_))
        ));
    }

    #[test]
    fn test_legality_table() {
        for admin in [AdminStatus::Pending, AdminStatus::Approved, AdminStatus::Rejected] {
            assert!(is_legal_combination(RequestStatus::Open, admin));
            assert!(is_legal_combination(RequestStatus::Closed, admin));
            assert!(is_legal_combination(RequestStatus::Cancelled, admin));
        }
        for status in [
            RequestStatus::InProgress,
            RequestStatus::PendingVerification,
            RequestStatus::Resolved,
        ] {
            assert!(is_legal_combination(status, AdminStatus::Approved));
            assert!(!is_legal_combination(status, AdminStatus::Pending));
            assert!(!is_legal_combination(status, AdminStatus::Rejected));
        }
    }

    #[test]
    fn test_assignment_axes() {
        assert!(RequestStatus::Resolved.requires_assignment());
        assert!(!RequestStatus::Resolved.is_active_assignment());
        assert!(RequestStatus::PendingVerification.is_active_assignment());
        assert!(!RequestStatus::Open.requires_assignment());
        assert!(!RequestStatus::Cancelled.requires_assignment());
    }
}
