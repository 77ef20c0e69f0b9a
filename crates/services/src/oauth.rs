//! OAuth 2.0 token endpoint client.
//!
//! Handles both the authorization-code exchange (after the user consents in
//! the provider's UI) and the refresh-token grant used by the runtime's
//! retry-on-unauthorized path. The token endpoint URL, client credentials,
//! and any custom parameters all come from the data source's options.

use crate::option_str;
use lowdeck_common::models::{AccessTokenDetails, SourceOptions, TOKEN_DATA_KEY};
use lowdeck_error::{ErrorCode, ErrorContext, LowdeckError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

const URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// Whether the source declares a url-encoded token request body.
///
/// `headers` is the stored pair list (`[["Content-Type", "..."], ...]`).
pub fn is_url_encoded(source_options: &SourceOptions) -> bool {
    let Some(Value::Array(pairs)) = source_options.get("headers") else {
        return false;
    };
    pairs.iter().any(|pair| match pair.as_array() {
        Some(entry) if entry.len() == 2 => {
            entry[0].as_str().is_some_and(|k| k.eq_ignore_ascii_case("content-type"))
                && entry[1].as_str() == Some(URL_ENCODED)
        }
        _ => false,
    })
}

/// Flatten a stored pair list, dropping entries with empty keys or values.
pub(crate) fn sanitize_custom_pairs(raw: Option<&Value>) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let Some(Value::Array(pairs)) = raw else {
        return params;
    };
    for pair in pairs {
        let Some(entry) = pair.as_array() else {
            continue;
        };
        if entry.len() != 2 {
            continue;
        }
        let Some(key) = entry[0].as_str() else {
            continue;
        };
        let value = match &entry[1] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        params.insert(key.to_string(), value);
    }
    params
}

/// Exchange an authorization code for token material.
pub async fn exchange_authorization_code(
    client: &reqwest::Client,
    source_options: &SourceOptions,
    code: &str,
    redirect_uri: &str,
) -> Result<AccessTokenDetails> {
    let body = BTreeMap::from([
        ("code".to_string(), code.to_string()),
        (
            "grant_type".to_string(),
            option_str(source_options, "grant_type")
                .unwrap_or("authorization_code")
                .to_string(),
        ),
        ("redirect_uri".to_string(), redirect_uri.to_string()),
    ]);
    request_token(client, source_options, body_with_client(source_options, body)).await
}

/// Exchange the stored refresh token for a fresh access token.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    source_options: &SourceOptions,
) -> Result<AccessTokenDetails> {
    let refresh_token = source_options
        .get(TOKEN_DATA_KEY)
        .and_then(|token_data| token_data.get("refresh_token"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            LowdeckError::new(
                ErrorCode::MissingTokenData,
                "Data source has no refresh token",
            )
        })?;

    let body = BTreeMap::from([
        ("grant_type".to_string(), "refresh_token".to_string()),
        ("refresh_token".to_string(), refresh_token.to_string()),
    ]);
    request_token(client, source_options, body_with_client(source_options, body)).await
}

fn body_with_client(
    source_options: &SourceOptions,
    mut body: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    if let Some(client_id) = option_str(source_options, "client_id") {
        body.insert("client_id".to_string(), client_id.to_string());
    }
    if let Some(client_secret) = option_str(source_options, "client_secret") {
        body.insert("client_secret".to_string(), client_secret.to_string());
    }
    for (key, value) in sanitize_custom_pairs(source_options.get("custom_auth_params")) {
        body.insert(key, value);
    }
    body
}

async fn request_token(
    client: &reqwest::Client,
    source_options: &SourceOptions,
    body: BTreeMap<String, String>,
) -> Result<AccessTokenDetails> {
    let access_token_url = option_str(source_options, "access_token_url").ok_or_else(|| {
        LowdeckError::new(
            ErrorCode::MissingRequiredField,
            "Data source has no access token URL",
        )
    })?;

    info!(url = %access_token_url, "Requesting OAuth token");

    let mut request = client.post(access_token_url);
    for (key, value) in sanitize_custom_pairs(source_options.get("access_token_custom_headers")) {
        request = request.header(key, value);
    }

    let request = if is_url_encoded(source_options) {
        request.form(&body)
    } else {
        request.json(&body)
    };

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LowdeckError::new(
            ErrorCode::TokenRefreshFailed,
            format!("OAuth token request failed: {} - {}", status, body),
        )
        .with_context(ErrorContext::Http {
            status: status.as_u16(),
            url: Some(access_token_url.to_string()),
        }));
    }

    let payload: Value = response.json().await.map_err(|e| {
        LowdeckError::new(
            ErrorCode::TokenRefreshFailed,
            format!("Failed to parse OAuth token response: {}", e),
        )
    })?;

    let access_token = payload
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            LowdeckError::new(
                ErrorCode::TokenRefreshFailed,
                "OAuth token response carried no access_token",
            )
        })?;

    Ok(AccessTokenDetails {
        access_token: access_token.to_string(),
        refresh_token: payload
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_url_encoded_detection() {
        let mut options = SourceOptions::new();
        options.insert(
            "headers".to_string(),
            json!([["Content-Type", "application/x-www-form-urlencoded"]]),
        );
        assert!(is_url_encoded(&options));

        options.insert(
            "headers".to_string(),
            json!([["content-type", "application/json"]]),
        );
        assert!(!is_url_encoded(&options));

        options.remove("headers");
        assert!(!is_url_encoded(&options));
    }

    #[test]
    fn test_sanitize_custom_pairs_drops_empties() {
        let raw = json!([
            ["audience", "https://api.example.com"],
            ["", "dropped"],
            ["empty", ""],
            ["numeric", 7],
            "not a pair"
        ]);
        let params = sanitize_custom_pairs(Some(&raw));
        assert_eq!(params.len(), 2);
        assert_eq!(params["audience"], "https://api.example.com");
        assert_eq!(params["numeric"], "7");
    }

    #[tokio::test]
    async fn test_refresh_without_token_data() {
        let client = reqwest::Client::new();
        let err = refresh_access_token(&client, &SourceOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingTokenData);
    }

    #[tokio::test]
    async fn test_exchange_without_token_url() {
        let client = reqwest::Client::new();
        let err = exchange_authorization_code(
            &client,
            &SourceOptions::new(),
            "auth-code",
            "http://localhost/oauth2/authorize",
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
    }
}
