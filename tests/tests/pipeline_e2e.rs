//! End-to-end pipeline tests: submission through async scoring to the
//! materialized lead aggregate and score history.

use integration_tests::fixtures;
use integration_tests::setup::TestContext;

use scoring_core::{EventStatus, Stage, SubmissionOutcome};

#[tokio::test]
async fn test_single_event_scored_end_to_end() {
    let ctx = TestContext::new().await;

    let outcome = ctx
        .engine
        .gateway()
        .submit(fixtures::submission("anon-1", "pricing_view"))
        .await
        .unwrap();
    let lead_id = outcome.lead_id();
    assert!(matches!(outcome, SubmissionOutcome::Accepted { .. }));

    ctx.wait_scored(lead_id).await;

    let lead = ctx.lead(lead_id).await;
    assert_eq!(lead.score, 10);
    assert_eq!(lead.stage, Stage::Cold);
    assert!(lead.last_event_at.is_some());

    let history = ctx.history(lead_id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_score, 0);
    assert_eq!(history[0].new_score, 10);
    assert_eq!(history[0].delta, 10);

    let events = ctx.events(lead_id).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Processed);
}

#[tokio::test]
async fn test_history_chains_across_events() {
    let ctx = TestContext::new().await;
    let gateway = ctx.engine.gateway();

    let mut lead_id = None;
    for event_type in ["demo_request", "pricing_view", "form_submit"] {
        let outcome = gateway
            .submit(fixtures::submission("anon-1", event_type))
            .await
            .unwrap();
        lead_id = Some(outcome.lead_id());
    }
    let lead_id = lead_id.unwrap();

    ctx.wait_scored(lead_id).await;

    // 30 + 10 + 15, order independent.
    let lead = ctx.lead(lead_id).await;
    assert_eq!(lead.score, 55);
    assert_eq!(lead.stage, Stage::Hot);

    // Each entry starts where the previous one ended.
    let history = ctx.history(lead_id).await;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].old_score, 0);
    for pair in history.windows(2) {
        assert_eq!(pair[1].old_score, pair[0].new_score);
    }
    assert_eq!(history.last().unwrap().new_score, 55);
}

#[tokio::test]
async fn test_duplicate_event_id_is_idempotent() {
    let ctx = TestContext::new().await;
    let sub = fixtures::submission_with_id("anon-1", "demo_request", "evt-dup-1");

    let first = ctx.engine.gateway().submit(sub.clone()).await.unwrap();
    let lead_id = first.lead_id();
    ctx.wait_scored(lead_id).await;

    let second = ctx.engine.gateway().submit(sub).await.unwrap();
    assert!(second.is_duplicate());
    assert_eq!(second.lead_id(), lead_id);
    assert_eq!(second.event_id(), "evt-dup-1");
    ctx.wait_scored(lead_id).await;

    assert_eq!(ctx.events(lead_id).await.len(), 1);
    assert_eq!(ctx.history(lead_id).await.len(), 1);
    assert_eq!(ctx.lead(lead_id).await.score, 30);
}

#[tokio::test]
async fn test_concurrent_duplicate_submissions_accept_exactly_once() {
    let ctx = TestContext::new().await;
    let sub = fixtures::submission_with_id("anon-1", "demo_request", "evt-race-1");

    let (a, b) = {
        let eng_a = ctx.engine.clone();
        let eng_b = ctx.engine.clone();
        let sub_a = sub.clone();
        let sub_b = sub;
        let a = tokio::spawn(async move { eng_a.gateway().submit(sub_a).await });
        let b = tokio::spawn(async move { eng_b.gateway().submit(sub_b).await });
        (a.await.unwrap().unwrap(), b.await.unwrap().unwrap())
    };

    assert_eq!(a.lead_id(), b.lead_id());
    let accepted = [&a, &b].iter().filter(|o| !o.is_duplicate()).count();
    assert_eq!(accepted, 1, "exactly one submission owns the event");

    let lead_id = a.lead_id();
    ctx.wait_scored(lead_id).await;
    assert_eq!(ctx.events(lead_id).await.len(), 1);
    assert_eq!(ctx.history(lead_id).await.len(), 1);
    assert_eq!(ctx.lead(lead_id).await.score, 30);
}

#[tokio::test]
async fn test_unknown_event_type_consumed_at_zero() {
    let ctx = TestContext::new().await;

    let outcome = ctx
        .engine
        .gateway()
        .submit(fixtures::submission("anon-1", "quiz_completed"))
        .await
        .unwrap();
    let lead_id = outcome.lead_id();
    ctx.wait_scored(lead_id).await;

    let lead = ctx.lead(lead_id).await;
    assert_eq!(lead.score, 0);
    assert_eq!(lead.stage, Stage::Cold);

    // The event is consumed, with an explicit zero-delta audit row.
    let history = ctx.history(lead_id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].delta, 0);
    assert!(ctx.events(lead_id).await[0].is_processed());
}

#[tokio::test]
async fn test_score_clamps_at_ceiling() {
    let ctx = TestContext::new().await;
    let gateway = ctx.engine.gateway();

    let mut lead_id = None;
    for _ in 0..4 {
        let outcome = gateway
            .submit(fixtures::submission("anon-1", "demo_request"))
            .await
            .unwrap();
        lead_id = Some(outcome.lead_id());
    }
    let lead_id = lead_id.unwrap();

    ctx.wait_scored(lead_id).await;

    // 4 x 30 clamps to 100.
    let lead = ctx.lead(lead_id).await;
    assert_eq!(lead.score, 100);
    assert_eq!(lead.stage, Stage::Qualified);

    let history = ctx.history(lead_id).await;
    assert_eq!(history.len(), 4);
    assert_eq!(history.last().unwrap().new_score, 100);
}

#[tokio::test]
async fn test_email_merges_onto_existing_lead() {
    let ctx = TestContext::new().await;

    let first = ctx
        .engine
        .gateway()
        .submit(fixtures::submission("anon-1", "page_view"))
        .await
        .unwrap();
    ctx.wait_scored(first.lead_id()).await;
    assert!(ctx.lead(first.lead_id()).await.email.is_none());

    let second = ctx
        .engine
        .gateway()
        .submit(fixtures::submission_with_email(
            "anon-1",
            "form_submit",
            "ada@example.com",
        ))
        .await
        .unwrap();
    assert_eq!(second.lead_id(), first.lead_id());

    ctx.wait_scored(first.lead_id()).await;
    let lead = ctx.lead(first.lead_id()).await;
    assert_eq!(lead.email.as_deref(), Some("ada@example.com"));
    assert_eq!(lead.score, 16);
}

#[tokio::test]
async fn test_velocity_tracks_recent_events() {
    let ctx = TestContext::new().await;
    let gateway = ctx.engine.gateway();

    let mut lead_id = None;
    for _ in 0..3 {
        let outcome = gateway
            .submit(fixtures::submission("anon-1", "page_view"))
            .await
            .unwrap();
        lead_id = Some(outcome.lead_id());
    }
    let lead_id = lead_id.unwrap();

    ctx.wait_scored(lead_id).await;

    let lead = ctx.lead(lead_id).await;
    assert_eq!(lead.events_last_24h, 3);
    assert!((lead.velocity - 4.5).abs() < f64::EPSILON);
}
