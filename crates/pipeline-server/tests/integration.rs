use axum::http::StatusCode;
use http_body_util::BodyExt;
use pipeline_core::config::Config;
use pipeline_server::state::AppState;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bootstrap a minimal project inside the given temp directory and return a
/// router over it.
fn app(dir: &TempDir) -> axum::Router {
    Config::new("test-project").save(dir.path()).unwrap();
    let state = AppState::open(dir.path()).unwrap();
    pipeline_server::build_router(state)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn invoke(app: &axum::Router, function: &str, args: &[&str]) -> (StatusCode, serde_json::Value) {
    post_json(
        app.clone(),
        &format!("/api/invoke/{function}"),
        serde_json::json!({ "args": args }),
    )
    .await
}

// ---------------------------------------------------------------------------
// /api/invoke
// ---------------------------------------------------------------------------

#[tokio::test]
async fn assign_returns_stored_record() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, body) = invoke(&app, "assign", &["Bug", "7", "Crash on save", "SprintA"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["class"], "changepipeline.change-item");
    assert_eq!(body["current_state"], "assigned");
    assert_eq!(body["item_number"], "7");
    assert_eq!(body["sprint_name"], "SprintA");
}

#[tokio::test]
async fn scenario_walk_and_mismatch() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    invoke(&app, "assign", &["Bug", "7", "Crash on save", "SprintA"]).await;
    let (status, body) = invoke(&app, "design", &["Bug", "7", "SprintA", "Dana"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_state"], "designing");
    assert_eq!(body["designer_name"], "Dana");

    let (status, body) = invoke(&app, "develop", &["Bug", "7", "SprintA", "Dana", "Raj"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["developer_name"], "Raj");

    let (status, body) = invoke(&app, "verify", &["Bug", "7", "WrongName", "abc123"]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let msg = body["error"].as_str().unwrap();
    assert!(msg.contains("Raj"), "{msg}");
    assert!(msg.contains("WrongName"), "{msg}");

    let (_, body) = get(app.clone(), "/api/items/Bug/7").await;
    assert_eq!(body["current_state"], "developing");
}

#[tokio::test]
async fn duplicate_assign_is_conflict() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    invoke(&app, "assign", &["Bug", "7", "Crash on save", "SprintA"]).await;
    let (status, body) = invoke(&app, "assign", &["Bug", "7", "Crash on save", "SprintA"]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn out_of_order_transition_is_422() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    invoke(&app, "assign", &["Bug", "7", "Crash on save", "SprintA"]).await;
    let (status, body) = invoke(&app, "verify", &["Bug", "7", "Raj", "abc123"]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("assigned"));
}

#[tokio::test]
async fn unknown_function_and_bad_arity_are_400() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (status, _) = invoke(&app, "delete", &["Bug", "7"]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = invoke(&app, "assign", &["Bug"]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("expects 4"));
}

#[tokio::test]
async fn unknown_item_is_404() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (status, _) = invoke(&app, "design", &["Bug", "404", "SprintA", "Dana"]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(app.clone(), "/api/items/Bug/404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn query_all_alias_lists_items() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    invoke(&app, "assign", &["Bug", "7", "a", "S1"]).await;
    invoke(&app, "assign", &["Story", "3", "b", "S1"]).await;

    let selector = r#"{"selector": {"class": "changepipeline.change-item"}}"#;
    let (status, body) = invoke(&app, "queryAll", &[selector]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = invoke(&app, "queryAll", &[r#"{"selector": {"owner": "x"}}"#]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// /api/items
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_items_returns_every_item() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    for n in ["3", "1", "2"] {
        invoke(&app, "assign", &["Bug", n, "bulk", "S1"]).await;
    }
    let (status, body) = get(app.clone(), "/api/items").await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i["record"]["current_state"] == "assigned"));
}

#[tokio::test]
async fn item_history_lists_versions_oldest_first() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    invoke(&app, "assign", &["Bug", "7", "Crash on save", "SprintA"]).await;
    invoke(&app, "design", &["Bug", "7", "SprintA", "Dana"]).await;
    invoke(&app, "design", &["Bug", "7", "SprintA", "Dana"]).await;

    let (status, body) = get(app.clone(), "/api/items/Bug/7/history").await;
    assert_eq!(status, StatusCode::OK);
    let versions = body.as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["value"]["current_state"], "assigned");
    assert_eq!(versions[1]["value"]["current_state"], "designing");
    assert_eq!(versions[1]["is_delete"], false);
}

#[tokio::test]
async fn functions_are_listed() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (status, body) = get(app, "/api/functions").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert!(names.contains(&"assign"));
    assert!(names.contains(&"history_of"));
}

// ---------------------------------------------------------------------------
// Concurrent submissions
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transitions_accept_exactly_one() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    for round in 0..10 {
        let number = round.to_string();
        let (status, _) = invoke(&app, "assign", &["Bug", number.as_str(), "race", "SprintA"]).await;
        assert_eq!(status, StatusCode::OK);

        let dana_args = ["Bug", number.as_str(), "SprintA", "Dana"];
        let eve_args = ["Bug", number.as_str(), "SprintA", "Eve"];
        let (first, second) = tokio::join!(
            invoke(&app, "design", &dana_args),
            invoke(&app, "design", &eve_args),
        );
        let statuses = [first.0, second.0];
        assert_eq!(
            statuses.iter().filter(|s| **s == StatusCode::OK).count(),
            1,
            "round {round}: {statuses:?}"
        );
        assert!(statuses.contains(&StatusCode::UNPROCESSABLE_ENTITY));

        let (_, history) = get(app.clone(), &format!("/api/items/Bug/{number}/history")).await;
        assert_eq!(history.as_array().unwrap().len(), 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assigns_accept_exactly_one() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    for round in 0..10 {
        let number = round.to_string();
        let first_args = ["Bug", number.as_str(), "first", "SprintA"];
        let second_args = ["Bug", number.as_str(), "second", "SprintA"];
        let (first, second) = tokio::join!(
            invoke(&app, "assign", &first_args),
            invoke(&app, "assign", &second_args),
        );
        let statuses = [first.0, second.0];
        assert!(statuses.contains(&StatusCode::OK), "round {round}: {statuses:?}");
        assert!(statuses.contains(&StatusCode::CONFLICT), "round {round}: {statuses:?}");
    }
}
