mod common;

use common::{Harness, proof};
use lifeline::coordinator::ProofSubmission;
use lifeline::{
    LifelineError, ModerationDecision, ReviewDecision, Role, VolunteerStatus,
};

#[test_log::test(tokio::test)]
async fn test_district_lead_cannot_moderate_other_district() {
    let h = Harness::new();
    let (_, request) = h.submit("High", "Mumbai").await;
    let lead = h.account(Role::DistrictLead, "Pune");

    let err = h
        .coordinator
        .moderate_content(&lead, request.id, ModerationDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, LifelineError::Forbidden(_)));
    assert_eq!(err.status_code(), 403);

    // Nothing changed
    let stored = h.request_state(request.id).await;
    assert_eq!(stored.admin_status, lifeline::AdminStatus::Pending);
}

#[tokio::test]
async fn test_district_lead_publishes_in_own_district() {
    let h = Harness::new();
    let (_, request) = h.submit("High", "Pune City").await;
    let lead = h.account(Role::DistrictLead, " pune ");

    let moderated = h
        .coordinator
        .moderate_content(&lead, request.id, ModerationDecision::Approve)
        .await
        .unwrap();
    assert!(moderated.is_public);
}

#[tokio::test]
async fn test_volunteer_cannot_submit_proof_for_someone_elses_assignment() {
    let h = Harness::new();
    let (_, request) = h.approved("Medium", "Pune").await;
    let (holder, _) = h.volunteer("Pune").await;
    let (intruder, intruder_profile) = h.volunteer("Pune").await;
    h.coordinator
        .accept_request(&holder, request.id)
        .await
        .unwrap();

    let err = h
        .coordinator
        .submit_proof(&intruder, request.id, proof())
        .await
        .unwrap_err();
    assert!(matches!(err, LifelineError::Forbidden(_)));

    let stored = h.request_state(request.id).await;
    assert!(stored.proofs.is_empty());
    assert!(
        h.volunteer_state(intruder_profile.id)
            .await
            .pending_proofs
            .is_empty()
    );
}

#[tokio::test]
async fn test_proof_without_media_is_rejected() {
    let h = Harness::new();
    let (_, request) = h.approved("Medium", "Pune").await;
    let (actor, _) = h.volunteer("Pune").await;
    h.coordinator
        .accept_request(&actor, request.id)
        .await
        .unwrap();

    let err = h
        .coordinator
        .submit_proof(
            &actor,
            request.id,
            ProofSubmission {
                notes: Some("done".to_string()),
                media: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifelineError::Validation(_)));
    assert_eq!(
        h.request_state(request.id).await.status,
        lifeline::RequestStatus::InProgress
    );
}

#[tokio::test]
async fn test_unapproved_or_inactive_volunteer_cannot_accept() {
    let h = Harness::new();
    let (_, request) = h.approved("Low", "Pune").await;

    let (actor, volunteer) = h.volunteer("Pune").await;
    h.coordinator
        .review_volunteer(&h.admin, volunteer.id, VolunteerStatus::PendingReview)
        .await
        .unwrap();
    assert!(matches!(
        h.coordinator.accept_request(&actor, request.id).await,
        Err(LifelineError::Forbidden(_))
    ));

    let (actor, volunteer) = h.volunteer("Pune").await;
    h.coordinator
        .set_volunteer_active(&h.admin, volunteer.id, false)
        .await
        .unwrap();
    assert!(matches!(
        h.coordinator.accept_request(&actor, request.id).await,
        Err(LifelineError::Forbidden(_))
    ));

    // An account without a volunteer profile is refused too
    let seeker = h.account(Role::HelpSeeker, "Pune");
    assert!(matches!(
        h.coordinator.accept_request(&seeker, request.id).await,
        Err(LifelineError::Forbidden(_))
    ));

    assert!(h.request_state(request.id).await.is_in_open_pool());
}

#[tokio::test]
async fn test_admin_takes_work_only_through_a_volunteer_profile() {
    let h = Harness::new();
    let (_, request) = h.approved("Low", "Pune").await;

    assert!(matches!(
        h.coordinator.accept_request(&h.admin, request.id).await,
        Err(LifelineError::Forbidden(_))
    ));
    assert!(matches!(
        h.coordinator
            .submit_proof(&h.admin, request.id, proof())
            .await,
        Err(LifelineError::Forbidden(_))
    ));

    // Holding someone else's assignment does not let the admin prove it
    let (actor, _) = h.volunteer("Pune").await;
    h.coordinator
        .accept_request(&actor, request.id)
        .await
        .unwrap();
    assert!(matches!(
        h.coordinator
            .submit_proof(&h.admin, request.id, proof())
            .await,
        Err(LifelineError::Forbidden(_))
    ));
    assert!(h.request_state(request.id).await.proofs.is_empty());
}

#[tokio::test]
async fn test_reviewers_are_scoped() {
    let h = Harness::new();
    let (seeker, request) = h.approved("High", "Pune").await;
    let (actor, _) = h.volunteer("Pune").await;
    h.coordinator
        .accept_request(&actor, request.id)
        .await
        .unwrap();
    let receipt = h
        .coordinator
        .submit_proof(&actor, request.id, proof())
        .await
        .unwrap();

    for outsider in [
        h.account(Role::DistrictLead, "Mumbai"),
        seeker.clone(),
        actor.clone(),
    ] {
        let err = h
            .coordinator
            .review_proof(
                &outsider,
                request.id,
                receipt.proof_id,
                ReviewDecision::Accept,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifelineError::Forbidden(_)), "{:?}", outsider.role);
    }

    let moderator = h.account(Role::Moderator, "Mumbai");
    let reviewed = h
        .coordinator
        .review_proof(
            &moderator,
            request.id,
            receipt.proof_id,
            ReviewDecision::Accept,
            None,
        )
        .await
        .unwrap();
    assert_eq!(reviewed.request.status, lifeline::RequestStatus::Resolved);
}

#[tokio::test]
async fn test_lookups_check_existence_first() {
    let h = Harness::new();
    let (_, request) = h.approved("High", "Pune").await;
    let lead = h.account(Role::DistrictLead, "Mumbai");

    let missing = lifeline::RequestId(uuid::Uuid::new_v4());
    assert!(matches!(
        h.coordinator
            .moderate_content(&lead, missing, ModerationDecision::Approve)
            .await,
        Err(LifelineError::NotFound { .. })
    ));

    let missing_proof = lifeline::ProofId(uuid::Uuid::new_v4());
    assert!(matches!(
        h.coordinator
            .review_proof(&lead, request.id, missing_proof, ReviewDecision::Accept, None)
            .await,
        Err(LifelineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_hidden_requests_visible_only_within_scope() {
    let h = Harness::new();
    let (seeker, request) = h.submit("Low", "Pune").await;

    assert!(h.coordinator.get_request(&seeker, request.id).await.is_ok());
    assert!(
        h.coordinator
            .get_request(&h.account(Role::DistrictLead, "Pune"), request.id)
            .await
            .is_ok()
    );
    assert!(
        h.coordinator
            .get_request(&h.account(Role::Moderator, "Mumbai"), request.id)
            .await
            .is_ok()
    );

    let (volunteer, _) = h.volunteer("Pune").await;
    assert!(matches!(
        h.coordinator.get_request(&volunteer, request.id).await,
        Err(LifelineError::Forbidden(_))
    ));
    assert!(matches!(
        h.coordinator
            .get_request(&h.account(Role::DistrictLead, "Mumbai"), request.id)
            .await,
        Err(LifelineError::Forbidden(_))
    ));
}
