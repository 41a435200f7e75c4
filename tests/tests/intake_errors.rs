//! Intake rejection tests: invalid and unauthenticated submissions must fail
//! before the first write.

use integration_tests::fixtures;
use integration_tests::setup::TestContext;

use scoring_core::{Error, EventSubmission};
use scoring_store::{EventStore, LeadStore};

async fn assert_nothing_written(ctx: &TestContext) {
    assert!(ctx.engine.storage().all_events().await.unwrap().is_empty());
    assert!(ctx.engine.storage().all_leads().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_event_type_rejected_with_field_error() {
    let ctx = TestContext::new_idle().await;

    let sub = EventSubmission {
        event_type: String::new(),
        ..fixtures::submission("anon-1", "page_view")
    };
    let err = ctx.engine.gateway().submit(sub).await.unwrap_err();

    match err {
        Error::Validation { errors } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "event_type");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_nothing_written(&ctx).await;
}

#[tokio::test]
async fn test_invalid_email_rejected() {
    let ctx = TestContext::new_idle().await;

    let sub = EventSubmission {
        email: Some("not-an-email".into()),
        ..fixtures::submission("anon-1", "page_view")
    };
    let err = ctx.engine.gateway().submit(sub).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert_nothing_written(&ctx).await;
}

#[tokio::test]
async fn test_oversized_properties_rejected() {
    let ctx = TestContext::new_idle().await;

    let sub = EventSubmission {
        properties: Some(fixtures::oversized_properties()),
        ..fixtures::submission("anon-1", "page_view")
    };
    let err = ctx.engine.gateway().submit(sub).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert_nothing_written(&ctx).await;
}

#[tokio::test]
async fn test_malformed_api_key_rejected() {
    let ctx = TestContext::new_idle().await;

    let sub = EventSubmission {
        api_key: "sk_live_wrong_prefix".into(),
        ..fixtures::submission("anon-1", "page_view")
    };
    let err = ctx.engine.gateway().submit(sub).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert_nothing_written(&ctx).await;
}

#[tokio::test]
async fn test_unregistered_api_key_rejected() {
    let ctx = TestContext::new_idle().await;

    let sub = EventSubmission {
        api_key: fixtures::unknown_api_key(),
        ..fixtures::submission("anon-1", "page_view")
    };
    let err = ctx.engine.gateway().submit(sub).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert_nothing_written(&ctx).await;
}

#[tokio::test]
async fn test_revoked_key_stops_resolving() {
    let ctx = TestContext::new_idle().await;

    let key = scoring_core::ProjectKey::parse(&fixtures::test_api_key()).unwrap();
    assert!(ctx.engine.keyring().revoke(&key));

    let err = ctx
        .engine
        .gateway()
        .submit(fixtures::submission("anon-1", "page_view"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert_nothing_written(&ctx).await;
}
