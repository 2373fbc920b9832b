//! Public signing is token-addressed and must be safe to submit twice:
//! the first submission wins, later ones get the idempotent success
//! response, and exactly one job exists for the quotation afterwards.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::handlers;
use crate::tests::TestContext;

fn sign_request(token: &str, signer: &str) -> Request<Body> {
    let payload = json!({
        "signed_by": signer,
        "signature_data": format!("data:image/png;base64,{}", "A".repeat(2000)),
        "device": "iPad",
    });
    Request::builder()
        .method("POST")
        .uri(format!("/{token}/sign"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn signing_twice_keeps_first_signature_and_one_job() {
    let ctx = TestContext::new().await;
    let company = ctx.seed_company().await;
    let customer = ctx.seed_customer(company).await;
    let owner = ctx.seed_user(company).await;
    let quotation = ctx
        .seed_sent_quotation(company, customer, owner, "tok-sign-once")
        .await;

    let app = handlers::public_quotation_routes().with_state(ctx.state.clone());

    let first = app
        .clone()
        .oneshot(sign_request("tok-sign-once", "Marie Tremblay"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["success"], json!(true));
    assert!(first.get("already_signed").is_none());

    let second = app
        .oneshot(sign_request("tok-sign-once", "Someone Else"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second = body_json(second).await;
    assert_eq!(second["already_signed"], json!(true));

    let (status, signed_by): (String, Option<String>) = sqlx::query_as(
        "SELECT status::text, signed_by FROM quotations WHERE id = $1",
    )
    .bind(quotation)
    .fetch_one(&ctx.db_pool)
    .await
    .unwrap();
    assert_eq!(status, "SIGNED");
    assert_eq!(signed_by.as_deref(), Some("Marie Tremblay"));

    let jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE quotation_id = $1")
        .bind(quotation)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(jobs, 1);
}

#[tokio::test]
async fn signing_an_unsent_quotation_is_rejected() {
    let ctx = TestContext::new().await;
    let company = ctx.seed_company().await;
    let customer = ctx.seed_customer(company).await;
    let owner = ctx.seed_user(company).await;
    let quotation = ctx
        .seed_sent_quotation(company, customer, owner, "tok-expired")
        .await;
    sqlx::query(
        "UPDATE quotations SET expires_at = NOW() - INTERVAL '1 day' WHERE id = $1",
    )
    .bind(quotation)
    .execute(&ctx.db_pool)
    .await
    .unwrap();

    let app = handlers::public_quotation_routes().with_state(ctx.state.clone());
    let response = app
        .oneshot(sign_request("tok-expired", "Marie Tremblay"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let status: String = sqlx::query_scalar("SELECT status::text FROM quotations WHERE id = $1")
        .bind(quotation)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(status, "EXPIRED");
}
