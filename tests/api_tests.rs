use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use podcast_bot::api::{ApiState, router};
use podcast_bot::config::Community;
use serde_json::{Value, json};
use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;

const CONFIG: &str = r#"
[chats.main]
id = -1001

[shows.show]
name = "The Show"
domain = "show.example.com"

[shows.quiet]
name = "Quiet Show"
domain = "quiet.example.com"

[announce]
show = [-1001]
quiet = [-1001]
"#;

fn test_server(api_key: Option<&str>) -> TestServer {
    let community = Community::from_toml_str(CONFIG).expect("Failed to parse config");
    // Never reaches Telegram: every request below is refused before a bot call.
    let bot = Bot::new("123456:TEST").throttle(Limits::default());
    let state = ApiState {
        bot,
        community: Arc::new(community),
        api_key: api_key.map(str::to_string),
    };
    TestServer::new(router(state)).expect("Failed to create test server")
}

#[tokio::test]
async fn test_wrong_key_is_not_found() {
    let server = test_server(Some("secret"));

    let response = server
        .post("/announce")
        .add_query_param("apikey", "guess")
        .form(&[("group", "show"), ("message", "hi")])
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert!(response.text().is_empty());
}

#[tokio::test]
async fn test_missing_key_is_not_found() {
    let server = test_server(Some("secret"));

    let response = server.post("/announce").form(&[("group", "show")]).await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_disabled_without_configured_key() {
    let server = test_server(None);

    let response = server
        .post("/announce")
        .add_query_param("apikey", "")
        .form(&[("group", "show")])
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_group_is_bad_request() {
    let server = test_server(Some("secret"));

    let response = server
        .post("/announce")
        .add_query_param("apikey", "secret")
        .form(&[("group", "nope"), ("message", "hi")])
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body, json!({"status": "Error", "message": "Unknown group"}));
}

#[tokio::test]
async fn test_key_accepted_from_form_field() {
    let server = test_server(Some("secret"));

    let response = server
        .post("/announce")
        .form(&[("apikey", "secret"), ("group", "nope")])
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_now_playing_for_unknown_show_is_not_found() {
    let server = test_server(Some("secret"));

    let response = server
        .post("/announce")
        .add_query_param("apikey", "secret")
        .form(&[("title", "Episode 1"), ("show", "missing")])
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "Unknown show slug");
}

#[tokio::test]
async fn test_now_playing_without_np_chats_reports_error() {
    let server = test_server(Some("secret"));

    let response = server
        .post("/announce")
        .add_query_param("apikey", "secret")
        .form(&[("title", "Episode 1"), ("show", "quiet")])
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!({"status": "Error", "error": "No now-playing chat for show"}));
}
