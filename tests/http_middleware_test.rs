//! Integration tests for the axum middleware and extractor.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Router, middleware};
use common::{EventLog, Failures, RecordingConnection, RecordingPool, recording_lifecycle};
use db_request_scope::config::{CompletionPolicy, LifecycleOptions};
use db_request_scope::db::PooledConnection;
use db_request_scope::error::DbResult;
use db_request_scope::scope::ConnectionLifecycle;
use db_request_scope::transport::{RequestConnection, connection_middleware};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

type Conn = RequestConnection<RecordingConnection>;

async fn request_id(RequestConnection(ctx): Conn) -> String {
    assert!(ctx.is_attached().await);
    ctx.request_id().to_string()
}

async fn insert(RequestConnection(ctx): Conn) -> DbResult<StatusCode> {
    let mut handle = ctx.connection().await?;
    handle
        .connection_mut()
        .execute("INSERT INTO orders VALUES (1)")
        .await?;
    Ok(StatusCode::CREATED)
}

async fn conflict(RequestConnection(ctx): Conn) -> StatusCode {
    let mut handle = ctx.connection().await.unwrap();
    handle
        .connection_mut()
        .execute("INSERT INTO orders VALUES (1)")
        .await
        .unwrap();
    StatusCode::CONFLICT
}

fn app(lifecycle: ConnectionLifecycle<RecordingPool>) -> Router {
    Router::new()
        .route("/id", get(request_id))
        .route("/orders", post(insert))
        .route("/conflict", post(conflict))
        .layer(middleware::from_fn_with_state(
            Arc::new(lifecycle),
            connection_middleware::<RecordingPool>,
        ))
}

async fn send(app: Router, method: &str, uri: &str) -> Response {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn lifecycle_with(
    completion: CompletionPolicy,
) -> (ConnectionLifecycle<RecordingPool>, EventLog) {
    let pool = RecordingPool::new(Failures::default());
    let log = pool.log.clone();
    let options = LifecycleOptions::new()
        .with_transaction(true)
        .with_completion(completion);
    (ConnectionLifecycle::new(pool, options), log)
}

#[tokio::test]
async fn test_handler_sees_connection_and_it_is_released() {
    let (lifecycle, log, _) = recording_lifecycle(false, Failures::default());

    let response = send(app(lifecycle), "GET", "/id").await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"req_"));
    assert_eq!(log.events(), vec!["acquire", "release"]);
}

#[tokio::test]
async fn test_transactional_request_commits() {
    let (lifecycle, log, _) = recording_lifecycle(true, Failures::default());

    let response = send(app(lifecycle), "POST", "/orders").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        log.events(),
        vec![
            "acquire",
            "BEGIN",
            "INSERT INTO orders VALUES (1)",
            "COMMIT",
            "release"
        ]
    );
}

#[tokio::test]
async fn test_commit_failure_does_not_change_response() {
    let failures = Failures {
        commit: true,
        ..Failures::default()
    };
    let (lifecycle, log, sink) = recording_lifecycle(true, failures);

    let response = send(app(lifecycle), "POST", "/orders").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(log.count("release"), 1);
    assert!(sink.contains("error when calling COMMIT"));
}

#[tokio::test]
async fn test_acquire_failure_short_circuits_with_error_body() {
    let failures = Failures {
        acquire: true,
        ..Failures::default()
    };
    let (lifecycle, log, _) = recording_lifecycle(true, failures);

    let response = send(app(lifecycle), "POST", "/orders").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "connection_failed");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("too many connections")
    );
    assert_eq!(log.events(), vec!["acquire"]);
}

#[tokio::test]
async fn test_begin_failure_returns_transaction_error() {
    let failures = Failures {
        begin: true,
        ..Failures::default()
    };
    let (lifecycle, log, _) = recording_lifecycle(true, failures);

    let response = send(app(lifecycle), "POST", "/orders").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "transaction_error");
    assert_eq!(log.events(), vec!["acquire", "BEGIN", "release"]);
}

#[tokio::test]
async fn test_nested_middleware_acquires_once() {
    let (lifecycle, log, _) = recording_lifecycle(true, Failures::default());
    let lifecycle = Arc::new(lifecycle);

    let app = Router::new()
        .route("/orders", post(insert))
        .layer(middleware::from_fn_with_state(
            lifecycle.clone(),
            connection_middleware::<RecordingPool>,
        ))
        .layer(middleware::from_fn_with_state(
            lifecycle,
            connection_middleware::<RecordingPool>,
        ));

    let response = send(app, "POST", "/orders").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(log.count("acquire"), 1);
    assert_eq!(log.count("COMMIT"), 1);
    assert_eq!(log.count("release"), 1);
}

#[tokio::test]
async fn test_error_status_commits_by_default() {
    let (lifecycle, log) = lifecycle_with(CompletionPolicy::CommitAlways);

    let response = send(app(lifecycle), "POST", "/conflict").await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(log.count("COMMIT"), 1);
    assert_eq!(log.count("ROLLBACK"), 0);
}

#[tokio::test]
async fn test_error_status_rolls_back_when_configured() {
    let (lifecycle, log) = lifecycle_with(CompletionPolicy::RollbackOnErrorStatus);

    let response = send(app(lifecycle), "POST", "/conflict").await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        log.events(),
        vec![
            "acquire",
            "BEGIN",
            "INSERT INTO orders VALUES (1)",
            "ROLLBACK",
            "release"
        ]
    );
}

#[tokio::test]
async fn test_extractor_without_middleware_is_rejected() {
    let app = Router::new().route("/id", get(request_id));

    let response = send(app, "GET", "/id").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "missing_context");
}
