//! Taking on work: accepting a request and submitting proof of completion.

use chrono::Utc;

use super::{LifecycleCoordinator, TransitionOutcome};
use crate::auth::{self, Action, ResourceScope};
use crate::domain::actor::Actor;
use crate::domain::request::{HelpRequest, MediaRef, ProofId, RequestId, RequestStatus};
use crate::domain::volunteer::{LedgerEntry, Volunteer};
use crate::error::{LifelineError, Result};
use crate::external::Upload;
use crate::manager::Storage;

/// Evidence backing a proof.
#[derive(Debug, Clone)]
pub enum ProofMedia {
    /// A file to store in the blob store.
    Upload(Upload),
    /// Media already hosted elsewhere.
    Url(String),
}

#[derive(Debug, Clone, Default)]
pub struct ProofSubmission {
    pub notes: Option<String>,
    /// Required; a submission without media is rejected.
    pub media: Option<ProofMedia>,
}

/// Result of a proof submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofReceipt {
    pub proof_id: ProofId,
    pub request: HelpRequest,
    pub volunteer: Volunteer,
}

impl<S: Storage> LifecycleCoordinator<S> {
    /// Assign an open request to the acting volunteer.
    ///
    /// Exactly one of any number of concurrent acceptors succeeds; the others
    /// get `Conflict`.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, request_id = %request_id))]
    pub async fn accept_request(
        &self,
        actor: &Actor,
        request_id: RequestId,
    ) -> Result<TransitionOutcome> {
        let request = self.storage.get_request(request_id).await?;
        let volunteer = self.require_volunteer(actor).await?;
        auth::require(
            actor,
            &ResourceScope::request(&request, Some(&volunteer)),
            Action::AcceptRequest,
        )?;
        if !volunteer.can_take_work() {
            return Err(LifelineError::Forbidden(format!(
                "volunteer {} is '{}'{} and cannot accept requests",
                volunteer.id,
                volunteer.status,
                if volunteer.is_active { "" } else { " (inactive)" }
            )));
        }

        let volunteer_id = volunteer.id;
        let assigned_at = Utc::now();
        let (request, ()) = self.track_conflict(
            "accept_request",
            self.storage
                .modify_request(request_id, move |r| r.assign(volunteer_id, assigned_at))
                .await,
        )?;
        self.record_transition(RequestStatus::Open, RequestStatus::InProgress);
        tracing::info!(volunteer_id = %volunteer_id, "Request assigned");

        let (volunteer, _) = self
            .apply_ledger(
                "accept_request",
                request_id,
                volunteer_id,
                None,
                vec![LedgerEntry::Assigned {
                    request_id,
                    assigned_at,
                }],
            )
            .await?;

        Ok(TransitionOutcome {
            request,
            volunteer: Some(volunteer),
        })
    }

    /// Attach proof of completion to a request the acting volunteer holds and
    /// move it to `pending_verification`.
    ///
    /// Ownership is checked against the volunteer's own active requests as well
    /// as the request's assignee.
    #[tracing::instrument(skip(self, actor, submission), fields(actor = %actor.id, request_id = %request_id))]
    pub async fn submit_proof(
        &self,
        actor: &Actor,
        request_id: RequestId,
        submission: ProofSubmission,
    ) -> Result<ProofReceipt> {
        let request = self.storage.get_request(request_id).await?;
        let volunteer = self.require_volunteer(actor).await?;
        auth::require(
            actor,
            &ResourceScope::request(&request, Some(&volunteer)),
            Action::SubmitProof,
        )?;

        let media = match submission.media {
            Some(ProofMedia::Upload(upload)) => {
                let mime_type = upload.mime_type.clone();
                self.blobs
                    .upload(upload, &self.config.proof_folder)
                    .await?
                    .into_media(Some(mime_type))
            }
            Some(ProofMedia::Url(url)) if !url.trim().is_empty() => MediaRef {
                url: url.trim().to_string(),
                ..Default::default()
            },
            _ => {
                return Err(LifelineError::Validation(
                    "proof needs a file or a URL".to_string(),
                ));
            }
        };
        let notes = submission
            .notes
            .map(|n| n.trim().to_string())
            .unwrap_or_default();

        let volunteer_id = volunteer.id;
        let account = actor.id;
        let (request, proof_id) = self.track_conflict(
            "submit_proof",
            self.storage
                .modify_request(request_id, move |r| {
                    r.attach_proof(volunteer_id, account, notes, media, Utc::now())
                })
                .await,
        )?;
        self.record_transition(RequestStatus::InProgress, RequestStatus::PendingVerification);
        tracing::info!(proof_id = %proof_id, volunteer_id = %volunteer_id, "Proof submitted");

        let submitted_at = request
            .proof(proof_id)
            .map(|p| p.submitted_at)
            .unwrap_or_else(Utc::now);
        let (volunteer, _) = self
            .apply_ledger(
                "submit_proof",
                request_id,
                volunteer_id,
                Some(proof_id),
                vec![LedgerEntry::ProofSubmitted {
                    request_id,
                    proof_id,
                    submitted_at,
                }],
            )
            .await?;

        Ok(ProofReceipt {
            proof_id,
            request,
            volunteer,
        })
    }
}
