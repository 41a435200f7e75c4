//! Consistency subsystem tests: invariant checking, rebuild, and the
//! dead-letter lifecycle, driven through the assembled engine.

use std::time::Duration;

use integration_tests::fixtures;
use integration_tests::setup::TestContext;

use audit::Invariant;
use scoring_core::Error;
use scoring_store::{LeadStore, LeaseStore};
use uuid::Uuid;

#[tokio::test]
async fn test_checker_is_clean_after_normal_pipeline() {
    let ctx = TestContext::new().await;
    let gateway = ctx.engine.gateway();

    let mut lead_id = None;
    for event_type in ["page_view", "demo_request", "quiz_completed"] {
        let outcome = gateway
            .submit(fixtures::submission("anon-1", event_type))
            .await
            .unwrap();
        lead_id = Some(outcome.lead_id());
    }
    ctx.wait_scored(lead_id.unwrap()).await;

    let report = ctx.engine.checker().run().await.unwrap();
    assert!(report.is_clean(), "unexpected findings: {:?}", report.findings);
}

#[tokio::test]
async fn test_rebuild_roundtrip_restores_identical_state() {
    let ctx = TestContext::new().await;
    let gateway = ctx.engine.gateway();

    let mut lead_id = None;
    for event_type in ["pricing_view", "form_submit", "email_click"] {
        let outcome = gateway
            .submit(fixtures::submission("anon-1", event_type))
            .await
            .unwrap();
        lead_id = Some(outcome.lead_id());
    }
    let lead_id = lead_id.unwrap();
    ctx.wait_scored(lead_id).await;

    let before = ctx.lead(lead_id).await;
    assert_eq!(before.score, 30);

    let summary = ctx.engine.rebuilds().rebuild_lead(lead_id).await.unwrap();
    assert_eq!(summary.history_deleted, 3);
    assert_eq!(summary.events_reset, 3);

    ctx.wait_scored(lead_id).await;

    let after = ctx.lead(lead_id).await;
    assert_eq!(after.score, before.score);
    assert_eq!(after.stage, before.stage);
    assert_eq!(ctx.history(lead_id).await.len(), 3);

    let report = ctx.engine.checker().run().await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_checker_flags_corruption_and_rebuild_repairs_it() {
    let ctx = TestContext::new().await;

    let outcome = ctx
        .engine
        .gateway()
        .submit(fixtures::submission("anon-1", "demo_request"))
        .await
        .unwrap();
    let lead_id = outcome.lead_id();
    ctx.wait_scored(lead_id).await;

    // Corrupt the materialized aggregate behind the pipeline's back.
    let mut corrupted = ctx.lead(lead_id).await;
    corrupted.score = 42;
    ctx.engine.storage().put_lead(corrupted).await.unwrap();

    let report = ctx.engine.checker().run().await.unwrap();
    let finding = report
        .finding(Invariant::ScoreOutOfSync)
        .expect("corruption not detected");
    assert_eq!(finding.sample, vec![lead_id.to_string()]);

    ctx.engine.rebuilds().rebuild_lead(lead_id).await.unwrap();
    ctx.wait_scored(lead_id).await;

    assert_eq!(ctx.lead(lead_id).await.score, 30);
    let report = ctx.engine.checker().run().await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_dead_letter_lifecycle_recovers_the_lead() {
    // Start with an idle engine so the lease is pinned before any worker can
    // touch the job; every delivery then fails until the retry budget runs
    // out.
    let ctx = TestContext::new_idle().await;
    let blocked = ctx
        .engine
        .gateway()
        .submit(fixtures::submission("anon-1", "demo_request"))
        .await
        .unwrap();
    let lead_id = blocked.lead_id();
    ctx.engine
        .storage()
        .acquire_lease(lead_id, Duration::from_secs(120))
        .await
        .unwrap();
    ctx.engine.start();

    let failed = ctx.wait_dead_lettered(lead_id).await;
    assert_eq!(failed.attempts, 3);
    assert!(!failed.retried);
    assert!(!ctx.engine.queue().is_scheduled(lead_id));

    // Operator releases the blockage and replays the job.
    ctx.engine.storage().release_lease(lead_id).await.unwrap();
    ctx.engine.dead_letters().retry(failed.id).await.unwrap();
    ctx.wait_scored(lead_id).await;

    assert_eq!(ctx.lead(lead_id).await.score, 30);
    assert_eq!(ctx.history(lead_id).await.len(), 1);

    // The replay consumed the one-shot retry.
    let err = ctx.engine.dead_letters().retry(failed.id).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRetried(_)));
}

#[tokio::test]
async fn test_rebuild_of_unknown_lead_is_not_found() {
    let ctx = TestContext::new_idle().await;
    let err = ctx
        .engine
        .rebuilds()
        .rebuild_lead(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
