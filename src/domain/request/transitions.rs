//! State transitions for help requests.
//!
//! Transitions are pure methods on [`HelpRequest`]: they validate the current
//! state, mutate the aggregate and re-check its invariants. Storage runs them
//! inside a single-writer scope (see `Storage::modify_request`), which makes each
//! precondition check a conditional write.
//!
//! ```text
//! Open ──assign()──> InProgress ──attach_proof()──> PendingVerification
//!   ^                                                   │
//!   └──────────────── record_review(Reject) ────────────┤
//!                                                       └──record_review(Accept)──> Resolved
//!
//! Open | InProgress | PendingVerification ──override_status()──> Closed | Cancelled
//! ```
//!
//! The moderation axis is independent: `pending ──moderate()──> approved | rejected`,
//! both terminal.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{
    AdminStatus, Category, Feedback, HelpRequest, Location, MediaRef, Proof, ProofId,
    ProofReview, RequestId, RequestStatus, ReviewStatus, Submitter, UrgencyLevel,
};
use crate::domain::actor::AccountId;
use crate::domain::volunteer::VolunteerId;
use crate::error::{LifelineError, Result};

/// Note attached to a pending proof rejected as part of an administrative override.
pub const OVERRIDE_REVIEW_NOTE: &str = "request closed by administrative override";

/// Outcome of a proof review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Accept,
    Reject,
}

impl FromStr for ReviewDecision {
    type Err = LifelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" => Ok(ReviewDecision::Accept),
            "reject" => Ok(ReviewDecision::Reject),
            _ => Err(LifelineError::Validation(format!(
                "review action must be 'accept' or 'reject', got '{s}'"
            ))),
        }
    }
}

/// Outcome of content moderation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationDecision {
    Approve,
    Reject,
}

impl ModerationDecision {
    pub fn admin_status(&self) -> AdminStatus {
        match self {
            ModerationDecision::Approve => AdminStatus::Approved,
            ModerationDecision::Reject => AdminStatus::Rejected,
        }
    }
}

impl FromStr for ModerationDecision {
    type Err = LifelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Ok(ModerationDecision::Approve),
            "reject" => Ok(ModerationDecision::Reject),
            _ => Err(LifelineError::Validation(format!(
                "moderation action must be 'approve' or 'reject', got '{s}'"
            ))),
        }
    }
}

/// Validated content of a new request.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub urgency: UrgencyLevel,
    pub location: Location,
    pub submitter: Submitter,
    pub anonymous: bool,
    pub video: Option<MediaRef>,
    pub tags: Vec<String>,
}

/// What a review did, as needed to settle the volunteer ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub request_id: RequestId,
    pub proof_id: ProofId,
    pub volunteer: VolunteerId,
    pub decision: ReviewDecision,
    pub urgency: UrgencyLevel,
}

/// Assignment released by an administrative override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideRelease {
    pub volunteer: VolunteerId,
    /// The pending proof rejected by the override, if one was awaiting review.
    pub rejected_proof: Option<ProofId>,
}

impl HelpRequest {
    /// Create a new request in `Open` / `pending`, hidden until approved.
    pub fn submit(new: NewRequest, now: DateTime<Utc>) -> Self {
        let id = RequestId(Uuid::new_v4());
        // 48 random bits of the id: unique in practice even within one millisecond
        let reference = format!(
            "REQ-{}-{}",
            now.timestamp_millis(),
            &id.0.simple().to_string()[..12]
        );
        let district = new.location.district.clone();

        HelpRequest {
            id,
            reference,
            title: new.title,
            description: new.description,
            category: new.category,
            urgency: new.urgency,
            district,
            location: new.location,
            submitter: new.submitter,
            anonymous: new.anonymous,
            video: new.video,
            tags: new.tags,
            status: RequestStatus::Open,
            admin_status: AdminStatus::Pending,
            is_public: false,
            assigned_volunteer: None,
            assigned_at: None,
            resolved_at: None,
            proofs: Vec::new(),
            feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Open → InProgress. Fails with `Conflict` unless the request is still open
    /// and unassigned at write time.
    pub fn assign(&mut self, volunteer: VolunteerId, now: DateTime<Utc>) -> Result<()> {
        if self.status == RequestStatus::Resolved {
            return Err(LifelineError::Conflict(format!(
                "request {} has already been completed",
                self.id
            )));
        }
        if self.assigned_volunteer.is_some() {
            return Err(LifelineError::Conflict(format!(
                "request {} is already assigned to another volunteer",
                self.id
            )));
        }
        if self.status != RequestStatus::Open {
            return Err(LifelineError::Conflict(format!(
                "request {} is '{}', expected 'open'",
                self.id, self.status
            )));
        }
        if self.admin_status != AdminStatus::Approved {
            return Err(LifelineError::Forbidden(format!(
                "request {} has not been approved for volunteers",
                self.id
            )));
        }

        self.assigned_volunteer = Some(volunteer);
        self.assigned_at = Some(now);
        self.status = RequestStatus::InProgress;
        self.touch(now)
    }

    /// InProgress → PendingVerification, appending a proof awaiting review.
    pub fn attach_proof(
        &mut self,
        volunteer: VolunteerId,
        volunteer_account: AccountId,
        notes: String,
        media: MediaRef,
        now: DateTime<Utc>,
    ) -> Result<ProofId> {
        if self.assigned_volunteer != Some(volunteer) {
            return Err(LifelineError::Forbidden(format!(
                "request {} is not assigned to this volunteer",
                self.id
            )));
        }
        match self.status {
            RequestStatus::InProgress => {}
            RequestStatus::PendingVerification => {
                return Err(LifelineError::Conflict(format!(
                    "request {} already has a proof awaiting review",
                    self.id
                )));
            }
            other => {
                return Err(LifelineError::Conflict(format!(
                    "request {} is '{other}', expected 'in_progress'",
                    self.id
                )));
            }
        }

        let proof_id = ProofId(Uuid::new_v4());
        self.proofs.push(Proof {
            id: proof_id,
            volunteer,
            volunteer_account,
            notes,
            media,
            submitted_at: now,
            review: ProofReview::pending(),
        });
        self.status = RequestStatus::PendingVerification;
        self.touch(now)?;
        Ok(proof_id)
    }

    /// Review the pending proof. Accept resolves the request, reject returns it
    /// to the open pool. A proof can be reviewed once; later calls are `Conflict`.
    pub fn record_review(
        &mut self,
        proof_id: ProofId,
        decision: ReviewDecision,
        reviewer: AccountId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome> {
        let request_id = self.id;
        let urgency = self.urgency;
        let status = self.status;
        let assigned = self.assigned_volunteer;

        let proof = self
            .proof_mut(proof_id)
            .ok_or_else(|| LifelineError::not_found("proof", proof_id))?;
        if !proof.is_pending() {
            return Err(LifelineError::Conflict(format!(
                "proof {proof_id} has already been reviewed"
            )));
        }
        if status != RequestStatus::PendingVerification {
            return Err(LifelineError::Conflict(format!(
                "request {request_id} is '{status}', expected 'pending_verification'"
            )));
        }
        let volunteer = assigned.ok_or_else(|| {
            LifelineError::Conflict(format!("request {request_id} has no assigned volunteer"))
        })?;

        proof.review = ProofReview {
            status: match decision {
                ReviewDecision::Accept => ReviewStatus::Accepted,
                ReviewDecision::Reject => ReviewStatus::Rejected,
            },
            reviewer: Some(reviewer),
            reviewed_at: Some(now),
            notes: Some(notes.unwrap_or_default()),
        };

        match decision {
            ReviewDecision::Accept => {
                self.status = RequestStatus::Resolved;
                self.resolved_at = Some(now);
            }
            ReviewDecision::Reject => {
                self.status = RequestStatus::Open;
                self.assigned_volunteer = None;
                self.assigned_at = None;
            }
        }
        self.touch(now)?;

        Ok(ReviewOutcome {
            request_id,
            proof_id,
            volunteer,
            decision,
            urgency,
        })
    }

    /// pending → approved | rejected. When `publishes` is set the decision also
    /// drives `is_public`; otherwise visibility is left untouched.
    pub fn moderate(
        &mut self,
        decision: ModerationDecision,
        publishes: bool,
        now: DateTime<Utc>,
    ) -> Result<AdminStatus> {
        if self.admin_status != AdminStatus::Pending {
            return Err(LifelineError::Conflict(format!(
                "request {} has already been {}",
                self.id, self.admin_status
            )));
        }

        self.admin_status = decision.admin_status();
        if publishes {
            self.is_public = decision == ModerationDecision::Approve;
        }
        self.touch(now)?;
        Ok(self.admin_status)
    }

    /// Toggle public visibility of an approved request.
    pub fn set_visibility(&mut self, public: bool, now: DateTime<Utc>) -> Result<()> {
        if public && self.admin_status != AdminStatus::Approved {
            return Err(LifelineError::Conflict(format!(
                "request {} is '{}' and cannot be made public",
                self.id, self.admin_status
            )));
        }
        self.is_public = public;
        self.touch(now)
    }

    /// Move a non-terminal request to `Closed` or `Cancelled`.
    ///
    /// Any pending proof is rejected in the same write, attributed to the
    /// overriding administrator, so it cannot be reviewed afterwards.
    pub fn override_status(
        &mut self,
        target: RequestStatus,
        admin: AccountId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<OverrideRelease>> {
        if !matches!(target, RequestStatus::Closed | RequestStatus::Cancelled) {
            return Err(LifelineError::Validation(format!(
                "override target must be 'closed' or 'cancelled', got '{target}'"
            )));
        }
        if self.status.is_terminal() {
            return Err(LifelineError::Conflict(format!(
                "request {} is already '{}'",
                self.id, self.status
            )));
        }

        let mut rejected_proof = None;
        if let Some(proof) = self.proofs.iter_mut().find(|p| p.is_pending()) {
            proof.review = ProofReview {
                status: ReviewStatus::Rejected,
                reviewer: Some(admin),
                reviewed_at: Some(now),
                notes: Some(reason.unwrap_or_else(|| OVERRIDE_REVIEW_NOTE.to_string())),
            };
            rejected_proof = Some(proof.id);
        }

        let release = self.assigned_volunteer.take().map(|volunteer| OverrideRelease {
            volunteer,
            rejected_proof,
        });
        self.assigned_at = None;
        self.status = target;
        self.touch(now)?;
        Ok(release)
    }

    /// Attach the submitter's rating to a resolved request. Once only.
    pub fn record_feedback(
        &mut self,
        rating: u8,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(LifelineError::Validation(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        if self.status != RequestStatus::Resolved {
            return Err(LifelineError::Conflict(format!(
                "request {} is '{}', feedback needs 'resolved'",
                self.id, self.status
            )));
        }
        if self.feedback.is_some() {
            return Err(LifelineError::Conflict(format!(
                "feedback for request {} was already submitted",
                self.id
            )));
        }

        self.feedback = Some(Feedback {
            rating,
            comment,
            submitted_at: now,
        });
        self.touch(now)
    }

    /// Only unresolved requests may be removed by their submitter.
    pub fn ensure_deletable(&self) -> Result<()> {
        if self.status == RequestStatus::Resolved {
            return Err(LifelineError::Conflict(format!(
                "request {} is resolved and can no longer be deleted",
                self.id
            )));
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.updated_at = now;
        self.check_invariants()
    }
}
