//! Proof review and ledger settlement.

use chrono::Utc;

use super::{LifecycleCoordinator, TransitionOutcome};
use crate::auth::{self, Action, ResourceScope};
use crate::domain::actor::Actor;
use crate::domain::request::{ProofId, RequestId, RequestStatus, ReviewDecision};
use crate::domain::volunteer::{
    LedgerEntry, Settlement, SettlementOutcome, Volunteer, VolunteerId, entries_for,
};
use crate::error::{LifelineError, Result};
use crate::manager::Storage;

impl<S: Storage> LifecycleCoordinator<S> {
    /// Accept or reject a pending proof and settle the volunteer's ledger.
    ///
    /// Accepting resolves the request and credits the urgency's reward;
    /// rejecting returns the request to the open pool. In both cases the
    /// volunteer stops holding the assignment the proof was submitted under;
    /// if they have already re-accepted the request, that newer hold stays.
    /// A proof is reviewed once: later calls are `Conflict` and leave the
    /// ledger untouched.
    #[tracing::instrument(
        skip(self, actor, notes),
        fields(actor = %actor.id, request_id = %request_id, proof_id = %proof_id, decision = ?decision)
    )]
    pub async fn review_proof(
        &self,
        actor: &Actor,
        request_id: RequestId,
        proof_id: ProofId,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<TransitionOutcome> {
        let request = self.storage.get_request(request_id).await?;
        let proof = request
            .proof(proof_id)
            .ok_or_else(|| LifelineError::not_found("proof", proof_id))?;
        auth::require(
            actor,
            &ResourceScope::request(&request, None),
            Action::ReviewProof,
        )?;
        if !proof.is_pending() {
            return self.track_conflict(
                "review_proof",
                Err(LifelineError::Conflict(format!(
                    "proof {proof_id} has already been reviewed"
                ))),
            );
        }

        let reviewer = actor.id;
        let reviewed_at = Utc::now();
        let (request, outcome) = self.track_conflict(
            "review_proof",
            self.storage
                .modify_request(request_id, move |r| {
                    r.record_review(proof_id, decision, reviewer, notes, reviewed_at)
                })
                .await,
        )?;
        let target = match decision {
            ReviewDecision::Accept => RequestStatus::Resolved,
            ReviewDecision::Reject => RequestStatus::Open,
        };
        self.record_transition(RequestStatus::PendingVerification, target);
        tracing::info!(volunteer_id = %outcome.volunteer, status = %target, "Proof reviewed");

        let settlement = Settlement {
            request_id,
            proof_id,
            outcome: match decision {
                ReviewDecision::Accept => SettlementOutcome::Credited {
                    points: self.points.points_for(outcome.urgency),
                },
                ReviewDecision::Reject => SettlementOutcome::Rejected,
            },
        };
        let (volunteer, applied) = self
            .apply_ledger(
                "review_proof",
                request_id,
                outcome.volunteer,
                Some(proof_id),
                vec![
                    LedgerEntry::Settled(settlement),
                    LedgerEntry::Released {
                        request_id,
                        through: reviewed_at,
                    },
                ],
            )
            .await?;
        self.record_credits(outcome.urgency, &applied);

        Ok(TransitionOutcome {
            request,
            volunteer: Some(volunteer),
        })
    }

    /// Bring a volunteer's ledger in line with a request's current state.
    ///
    /// This completes an operation that failed with
    /// [`LifelineError::PartialApplication`]. The ledger entries are derived
    /// from the request as stored now, so running it any number of times, or
    /// when nothing is out of step, is harmless. A request that no longer
    /// exists is released.
    #[tracing::instrument(skip(self), fields(request_id = %request_id, volunteer_id = %volunteer_id))]
    pub async fn reconcile_ledger(
        &self,
        request_id: RequestId,
        volunteer_id: VolunteerId,
    ) -> Result<Volunteer> {
        let request = match self.storage.get_request(request_id).await {
            Ok(request) => Some(request),
            Err(LifelineError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let points = self.points;
        let entries = entries_for(
            request_id,
            request.as_ref(),
            volunteer_id,
            Utc::now(),
            |urgency| points.points_for(urgency),
        );
        let (volunteer, applied) = self
            .storage
            .modify_volunteer(volunteer_id, move |volunteer| {
                let now = Utc::now();
                Ok(entries
                    .into_iter()
                    .filter(|entry| volunteer.apply(entry, now))
                    .collect::<Vec<_>>())
            })
            .await?;

        if let Some(request) = &request {
            self.record_credits(request.urgency, &applied);
        }
        if applied.is_empty() {
            tracing::debug!("Ledger already consistent");
        } else {
            tracing::info!(repaired = applied.len(), "Ledger reconciled");
        }
        Ok(volunteer)
    }
}
