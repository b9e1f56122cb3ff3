//! Content moderation and administrative changes to a request.

use chrono::Utc;

use super::{LifecycleCoordinator, TransitionOutcome};
use crate::auth::{self, Action, ResourceScope};
use crate::domain::actor::Actor;
use crate::domain::request::{HelpRequest, ModerationDecision, RequestId, RequestStatus};
use crate::domain::volunteer::{LedgerEntry, Settlement, SettlementOutcome};
use crate::error::Result;
use crate::manager::Storage;

impl<S: Storage> LifecycleCoordinator<S> {
    /// Approve or reject a pending request's content.
    ///
    /// Whether the decision also sets `is_public` is part of the actor's role
    /// policy: admins and district leads publish on approval, moderators only
    /// change the moderation status.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, role = %actor.role, request_id = %request_id))]
    pub async fn moderate_content(
        &self,
        actor: &Actor,
        request_id: RequestId,
        decision: ModerationDecision,
    ) -> Result<HelpRequest> {
        let request = self.storage.get_request(request_id).await?;
        auth::require(
            actor,
            &ResourceScope::request(&request, None),
            Action::ModerateContent,
        )?;

        let publishes = auth::policy(actor.role).moderation_publishes;
        let (request, admin_status) = self.track_conflict(
            "moderate_content",
            self.storage
                .modify_request(request_id, move |r| {
                    r.moderate(decision, publishes, Utc::now())
                })
                .await,
        )?;
        tracing::info!(
            admin_status = %admin_status,
            is_public = request.is_public,
            "Request moderated"
        );
        Ok(request)
    }

    /// Publish or hide an approved request.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, request_id = %request_id))]
    pub async fn set_visibility(
        &self,
        actor: &Actor,
        request_id: RequestId,
        public: bool,
    ) -> Result<HelpRequest> {
        let request = self.storage.get_request(request_id).await?;
        auth::require(
            actor,
            &ResourceScope::request(&request, None),
            Action::SetVisibility,
        )?;

        let (request, ()) = self.track_conflict(
            "set_visibility",
            self.storage
                .modify_request(request_id, move |r| r.set_visibility(public, Utc::now()))
                .await,
        )?;
        tracing::info!(is_public = public, "Request visibility changed");
        Ok(request)
    }

    /// Move a non-terminal request to `closed` or `cancelled`.
    ///
    /// The assignment is cleared in the same write and any pending proof is
    /// rejected; the volunteer who held the request is then released.
    #[tracing::instrument(skip(self, actor, reason), fields(actor = %actor.id, request_id = %request_id, target = %target))]
    pub async fn override_status(
        &self,
        actor: &Actor,
        request_id: RequestId,
        target: RequestStatus,
        reason: Option<String>,
    ) -> Result<TransitionOutcome> {
        let request = self.storage.get_request(request_id).await?;
        auth::require(
            actor,
            &ResourceScope::request(&request, None),
            Action::OverrideStatus,
        )?;

        let admin = actor.id;
        let overridden_at = Utc::now();
        let (request, (from, release)) = self.track_conflict(
            "override_status",
            self.storage
                .modify_request(request_id, move |r| {
                    let from = r.status;
                    r.override_status(target, admin, reason, overridden_at)
                        .map(|release| (from, release))
                })
                .await,
        )?;
        self.record_transition(from, target);
        tracing::info!(from = %from, "Request status overridden");

        let Some(release) = release else {
            return Ok(TransitionOutcome {
                request,
                volunteer: None,
            });
        };

        let mut entries = Vec::with_capacity(2);
        if let Some(proof_id) = release.rejected_proof {
            entries.push(LedgerEntry::Settled(Settlement {
                request_id,
                proof_id,
                outcome: SettlementOutcome::Rejected,
            }));
        }
        entries.push(LedgerEntry::Released {
            request_id,
            through: overridden_at,
        });

        let (volunteer, _) = self
            .apply_ledger(
                "override_status",
                request_id,
                release.volunteer,
                release.rejected_proof,
                entries,
            )
            .await?;
        Ok(TransitionOutcome {
            request,
            volunteer: Some(volunteer),
        })
    }

    /// Delete an unresolved request. Only its submitter may do this.
    ///
    /// A volunteer holding the request is released after the delete.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, request_id = %request_id))]
    pub async fn delete_request(
        &self,
        actor: &Actor,
        request_id: RequestId,
    ) -> Result<TransitionOutcome> {
        let request = self.storage.get_request(request_id).await?;
        auth::require(
            actor,
            &ResourceScope::request(&request, None),
            Action::DeleteRequest,
        )?;

        let removed = self.track_conflict(
            "delete_request",
            self.storage
                .remove_request(request_id, |r| r.ensure_deletable())
                .await,
        )?;
        tracing::info!(status = %removed.status, "Request deleted");

        let Some(volunteer_id) = removed.assigned_volunteer else {
            return Ok(TransitionOutcome {
                request: removed,
                volunteer: None,
            });
        };
        let (volunteer, _) = self
            .apply_ledger(
                "delete_request",
                request_id,
                volunteer_id,
                None,
                vec![LedgerEntry::Released {
                    request_id,
                    through: Utc::now(),
                }],
            )
            .await?;
        Ok(TransitionOutcome {
            request: removed,
            volunteer: Some(volunteer),
        })
    }

    /// Rate a resolved request, once, as its submitter.
    #[tracing::instrument(skip(self, actor, comment), fields(actor = %actor.id, request_id = %request_id))]
    pub async fn submit_feedback(
        &self,
        actor: &Actor,
        request_id: RequestId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<HelpRequest> {
        let request = self.storage.get_request(request_id).await?;
        auth::require(
            actor,
            &ResourceScope::request(&request, None),
            Action::LeaveFeedback,
        )?;

        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let (request, ()) = self.track_conflict(
            "submit_feedback",
            self.storage
                .modify_request(request_id, move |r| {
                    r.record_feedback(rating, comment, Utc::now())
                })
                .await,
        )?;
        tracing::info!(rating, "Feedback recorded");
        Ok(request)
    }
}
