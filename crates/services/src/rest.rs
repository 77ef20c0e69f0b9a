//! REST API query service.
//!
//! Executes resolved query options as an HTTP request: method and path from
//! the query, base URL and authentication from the data source. This is the
//! service behind adhoc API queries, so it tolerates missing source options
//! entirely.

use crate::oauth;
use crate::{option_str, QueryService};
use async_trait::async_trait;
use lowdeck_common::config::HttpSettings;
use lowdeck_common::models::{AccessTokenDetails, ExecutionContext, SourceOptions, TOKEN_DATA_KEY};
use lowdeck_error::{ErrorCode, ErrorContext, LowdeckError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

pub struct RestApiService {
    client: reqwest::Client,
}

impl RestApiService {
    pub fn new(http: &HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| {
                LowdeckError::new(
                    ErrorCode::ServiceInternal,
                    format!("Failed to build HTTP client: {}", e),
                )
            })?;
        Ok(Self { client })
    }
}

/// Query options as authored in the editor, after placeholder resolution.
///
/// Pair lists (`headers`, `url_params`, `body`) use the stored
/// `[["key", "value"], ...]` shape.
#[derive(Debug, Default, Deserialize)]
struct RestQueryOptions {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    headers: Option<Value>,
    #[serde(default)]
    url_params: Option<Value>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    json_body: Option<Value>,
}

#[async_trait]
impl QueryService for RestApiService {
    fn kind(&self) -> &'static str {
        "restapi"
    }

    async fn run(
        &self,
        source_options: &SourceOptions,
        query_options: &Value,
        context: &ExecutionContext,
    ) -> Result<Value> {
        let options: RestQueryOptions = serde_json::from_value(query_options.clone())?;

        let url = request_url(source_options, options.url.as_deref())?;
        let method = request_method(options.method.as_deref());
        debug!(
            method = %method,
            url = %url,
            data_source_id = context.data_source_id.as_deref().unwrap_or("adhoc"),
            "Dispatching REST query"
        );

        let mut headers = oauth::sanitize_custom_pairs(source_options.get("headers"));
        headers.extend(oauth::sanitize_custom_pairs(options.headers.as_ref()));

        let mut request = self.client.request(method.clone(), url.as_str());
        for (key, value) in &headers {
            request = request.header(key, value);
        }
        request = apply_auth(request, source_options, &headers);

        let url_params = oauth::sanitize_custom_pairs(options.url_params.as_ref());
        if !url_params.is_empty() {
            request = request.query(&url_params);
        }

        if let Some(json_body) = &options.json_body {
            request = request.json(json_body);
        } else if method != reqwest::Method::GET {
            let body = oauth::sanitize_custom_pairs(options.body.as_ref());
            if !body.is_empty() {
                request = if url_encoded_content_type(&headers) {
                    request.form(&body)
                } else {
                    request.json(&body)
                };
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 401 && source_options.contains_key(TOKEN_DATA_KEY) {
            // Only OAuth-backed sources raise the unauthorized-client signal;
            // a bare 401 from an unauthenticated API is an ordinary failure.
            return Err(LowdeckError::new(
                ErrorCode::UnauthorizedClient,
                "REST endpoint rejected the stored access token",
            )
            .with_context(ErrorContext::Http {
                status: 401,
                url: Some(url),
            }));
        }
        if !status.is_success() {
            return Err(LowdeckError::new(
                ErrorCode::QueryFailed,
                format!("REST query failed: {} - {}", status, body),
            )
            .with_context(ErrorContext::Http {
                status: status.as_u16(),
                url: Some(url),
            }));
        }

        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    async fn refresh_token(
        &self,
        source_options: &SourceOptions,
        data_source_id: Option<&str>,
    ) -> Result<AccessTokenDetails> {
        debug!(
            data_source_id = data_source_id.unwrap_or("adhoc"),
            "Refreshing OAuth access token"
        );
        oauth::refresh_access_token(&self.client, source_options).await
    }
}

fn request_url(source_options: &SourceOptions, path: Option<&str>) -> Result<String> {
    let base = option_str(source_options, "url").unwrap_or_default();
    let path = path.unwrap_or_default();

    // Absolute query URLs stand alone (adhoc queries have no base at all).
    let url = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{}{}", base, path)
    };

    if url.is_empty() {
        return Err(LowdeckError::new(
            ErrorCode::MissingRequiredField,
            "REST query has no URL",
        ));
    }
    Ok(url)
}

fn request_method(method: Option<&str>) -> reqwest::Method {
    match method {
        Some(name) => match name.to_ascii_uppercase().as_str() {
            "POST" => reqwest::Method::POST,
            "PUT" => reqwest::Method::PUT,
            "PATCH" => reqwest::Method::PATCH,
            "DELETE" => reqwest::Method::DELETE,
            "HEAD" => reqwest::Method::HEAD,
            other => {
                if other != "GET" {
                    warn!(method = other, "Unknown HTTP method, defaulting to GET");
                }
                reqwest::Method::GET
            }
        },
        None => reqwest::Method::GET,
    }
}

/// Apply source-level authentication. Stored token data wins over static
/// bearer/basic settings; an explicit Authorization header wins over both.
fn apply_auth(
    request: reqwest::RequestBuilder,
    source_options: &SourceOptions,
    headers: &BTreeMap<String, String>,
) -> reqwest::RequestBuilder {
    if headers.keys().any(|k| k.eq_ignore_ascii_case("authorization")) {
        return request;
    }

    if let Some(access_token) = source_options
        .get(TOKEN_DATA_KEY)
        .and_then(|token_data| token_data.get("access_token"))
        .and_then(Value::as_str)
    {
        return request.header("Authorization", format!("Bearer {}", access_token));
    }

    match option_str(source_options, "auth_type") {
        Some("bearer") => match option_str(source_options, "bearer_token") {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        },
        Some("basic") => {
            let username = option_str(source_options, "username").unwrap_or_default();
            let credentials = match option_str(source_options, "password") {
                Some(password) => format!("{}:{}", username, password),
                None => username.to_string(),
            };
            let encoded = base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                credentials.as_bytes(),
            );
            request.header("Authorization", format!("Basic {}", encoded))
        }
        _ => request,
    }
}

fn url_encoded_content_type(headers: &BTreeMap<String, String>) -> bool {
    headers.iter().any(|(key, value)| {
        key.eq_ignore_ascii_case("content-type") && value == "application/x-www-form-urlencoded"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_url_joins_base_and_path() {
        let mut options = SourceOptions::new();
        options.insert("url".to_string(), json!("https://api.example.com"));
        assert_eq!(
            request_url(&options, Some("/items")).unwrap(),
            "https://api.example.com/items"
        );
    }

    #[test]
    fn test_request_url_absolute_path_wins() {
        let mut options = SourceOptions::new();
        options.insert("url".to_string(), json!("https://api.example.com"));
        assert_eq!(
            request_url(&options, Some("https://other.example.com/items")).unwrap(),
            "https://other.example.com/items"
        );
    }

    #[test]
    fn test_request_url_requires_something() {
        let err = request_url(&SourceOptions::new(), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
    }

    #[test]
    fn test_request_method_parsing() {
        assert_eq!(request_method(Some("post")), reqwest::Method::POST);
        assert_eq!(request_method(Some("DELETE")), reqwest::Method::DELETE);
        assert_eq!(request_method(None), reqwest::Method::GET);
        assert_eq!(request_method(Some("teapot")), reqwest::Method::GET);
    }

    #[test]
    fn test_query_options_parsing() {
        let raw = json!({
            "method": "post",
            "url": "/search",
            "headers": [["X-Trace", "abc"]],
            "body": [["q", "widgets"]]
        });
        let options: RestQueryOptions = serde_json::from_value(raw).unwrap();
        assert_eq!(options.method.as_deref(), Some("post"));
        assert_eq!(options.url.as_deref(), Some("/search"));
        assert!(options.json_body.is_none());
    }
}
