//! OAuth token endpoint client tests.

use lowdeck_common::models::SourceOptions;
use lowdeck_error::ErrorCode;
use lowdeck_services::oauth::{exchange_authorization_code, refresh_access_token};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn oauth_source(token_url: &str) -> SourceOptions {
    SourceOptions::from([
        ("access_token_url".to_string(), json!(token_url)),
        ("client_id".to_string(), json!("client-1")),
        ("client_secret".to_string(), json!("shh")),
        ("grant_type".to_string(), json!("authorization_code")),
    ])
}

#[tokio::test]
async fn test_exchange_authorization_code_success() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("\"code\":\"auth-code\""))
        .and(body_string_contains("\"client_id\":\"client-1\""))
        .and(body_string_contains("\"grant_type\":\"authorization_code\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-123",
            "refresh_token": "refresh-456"
        })))
        .mount(&mock_server)
        .await;

    let source = oauth_source(&format!("{}/oauth/token", mock_server.uri()));
    let client = reqwest::Client::new();

    let details = exchange_authorization_code(
        &client,
        &source,
        "auth-code",
        "https://apps.example.com/oauth2/authorize",
    )
    .await
    .expect("exchange succeeds");

    assert_eq!(details.access_token, "token-123");
    assert_eq!(details.refresh_token.as_deref(), Some("refresh-456"));
}

#[tokio::test]
async fn test_refresh_uses_form_encoding_when_declared() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token"
        })))
        .mount(&mock_server)
        .await;

    let mut source = oauth_source(&format!("{}/oauth/token", mock_server.uri()));
    source.insert(
        "headers".to_string(),
        json!([["Content-Type", "application/x-www-form-urlencoded"]]),
    );
    source.insert(
        "token_data".to_string(),
        json!({ "access_token": "stale", "refresh_token": "refresh-456" }),
    );

    let client = reqwest::Client::new();
    let details = refresh_access_token(&client, &source)
        .await
        .expect("refresh succeeds");

    assert_eq!(details.access_token, "fresh-token");
    assert!(details.refresh_token.is_none());
}

#[tokio::test]
async fn test_custom_headers_and_params_are_merged() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("X-Provider", "custom"))
        .and(body_string_contains("\"audience\":\"https://api.example.com\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-123"
        })))
        .mount(&mock_server)
        .await;

    let mut source = oauth_source(&format!("{}/oauth/token", mock_server.uri()));
    source.insert(
        "access_token_custom_headers".to_string(),
        json!([["X-Provider", "custom"], ["", "dropped"]]),
    );
    source.insert(
        "custom_auth_params".to_string(),
        json!([["audience", "https://api.example.com"], ["blank", ""]]),
    );
    source.insert(
        "token_data".to_string(),
        json!({ "refresh_token": "refresh-456" }),
    );

    let client = reqwest::Client::new();
    let details = refresh_access_token(&client, &source)
        .await
        .expect("refresh succeeds");
    assert_eq!(details.access_token, "token-123");
}

#[tokio::test]
async fn test_token_endpoint_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string("invalid_grant: refresh token revoked"),
        )
        .mount(&mock_server)
        .await;

    let mut source = oauth_source(&format!("{}/oauth/token", mock_server.uri()));
    source.insert(
        "token_data".to_string(),
        json!({ "refresh_token": "revoked" }),
    );

    let client = reqwest::Client::new();
    let err = refresh_access_token(&client, &source).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenRefreshFailed);
    assert_eq!(err.http_status(), Some(400));
    assert!(err.message.contains("invalid_grant"));
}

#[tokio::test]
async fn test_corrupt_token_response() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("corrupt{json"))
        .mount(&mock_server)
        .await;

    let mut source = oauth_source(&format!("{}/oauth/token", mock_server.uri()));
    source.insert(
        "token_data".to_string(),
        json!({ "refresh_token": "refresh-456" }),
    );

    let client = reqwest::Client::new();
    let err = refresh_access_token(&client, &source).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenRefreshFailed);
    assert!(err.message.contains("parse"));
}

#[tokio::test]
async fn test_response_without_access_token() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "scope": "read" })))
        .mount(&mock_server)
        .await;

    let mut source = oauth_source(&format!("{}/oauth/token", mock_server.uri()));
    source.insert(
        "token_data".to_string(),
        json!({ "refresh_token": "refresh-456" }),
    );

    let client = reqwest::Client::new();
    let err = refresh_access_token(&client, &source).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenRefreshFailed);
    assert!(err.message.contains("access_token"));
}
