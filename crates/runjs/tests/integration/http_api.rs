use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use runjs::server::{AppState, create_router};
use tower::ServiceExt;

use super::{fixture_source, test_config};

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_execute_default_flavor() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(AppState::new(&test_config(dir.path())));

    let response = app
        .oneshot(post_json(
            "/api/execute",
            serde_json::json!({ "code": "console.log('hi')" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
    let json = body_json(response).await;
    assert_eq!(json["output"], "hi\n");
    assert_eq!(json["moduleType"], "esm");
    assert_eq!(json["installedPackages"], serde_json::json!([]));
}

#[tokio::test]
async fn test_execute_thrown_error_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(AppState::new(&test_config(dir.path())));

    let response = app
        .oneshot(post_json(
            "/api/execute",
            serde_json::json!({ "code": "throw new Error('boom')", "moduleType": "esm" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["output"].as_str().unwrap().contains("Error: boom"));
}

#[tokio::test]
async fn test_execute_cjs_route() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(AppState::new(&test_config(dir.path())));

    let response = app
        .oneshot(post_json(
            "/api/execute/cjs",
            serde_json::json!({ "code": "console.log(typeof require)" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["output"], "function\n");
    assert_eq!(json["moduleType"], "commonjs");
}

#[tokio::test]
async fn test_execute_process_failure_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(AppState::new(&test_config(dir.path())));

    let response = app
        .oneshot(post_json(
            "/api/execute",
            serde_json::json!({ "code": "process.exit(4)", "moduleType": "commonjs" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("execution failed"));
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_installed_package_is_listed() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(AppState::new(&test_config(dir.path())));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/execute",
            serde_json::json!({
                "code": fixture_source("left_pad.cjs"),
                "moduleType": "commonjs",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["output"], "007\n");
    assert_eq!(json["installedPackages"][0]["name"], "left-pad");

    let request = Request::builder()
        .uri("/api/packages")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let names: Vec<_> = json["packages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["left-pad"]);
}
