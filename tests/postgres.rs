#![cfg(feature = "postgres")]

mod common;

use std::sync::Arc;

use common::{Harness, proof};
use futures::future::join_all;
use lifeline::{LifelineError, PostgresStorage, RequestStatus, ReviewDecision};

#[sqlx::test]
#[test_log::test]
async fn test_happy_path_against_postgres(pool: sqlx::PgPool) {
    let h = Harness::with_storage(PostgresStorage::new(pool));
    let (_, request) = h.approved("Critical", "Pune").await;
    let (actor, volunteer) = h.volunteer("Pune").await;

    h.coordinator
        .accept_request(&actor, request.id)
        .await
        .expect("accept failed");
    let receipt = h
        .coordinator
        .submit_proof(&actor, request.id, proof())
        .await
        .expect("proof submission failed");
    h.coordinator
        .review_proof(&h.admin, request.id, receipt.proof_id, ReviewDecision::Accept, None)
        .await
        .expect("review failed");

    let stored = h.request_state(request.id).await;
    assert_eq!(stored.status, RequestStatus::Resolved);
    stored.check_invariants().unwrap();

    let after = h.volunteer_state(volunteer.id).await;
    assert_eq!(after.points, 100);
    assert_eq!(after.contribution_history, vec![request.id]);
    assert!(after.active_requests.is_empty());

    let board = h.coordinator.leaderboard().await.unwrap();
    assert_eq!(board[0].volunteer_id, volunteer.id);
}

#[sqlx::test]
#[test_log::test]
async fn test_concurrent_accept_against_postgres(pool: sqlx::PgPool) {
    let h = Harness::with_storage(PostgresStorage::new(pool));
    let (_, request) = h.approved("Low", "Pune").await;

    let mut actors = Vec::new();
    for _ in 0..5 {
        actors.push(h.volunteer("Pune").await.0);
    }

    let handles = actors.into_iter().map(|actor| {
        let coordinator = Arc::clone(&h.coordinator);
        let request_id = request.id;
        tokio::spawn(async move { coordinator.accept_request(&actor, request_id).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, LifelineError::Conflict(_)))
    );
    h.request_state(request.id)
        .await
        .check_invariants()
        .unwrap();
}
