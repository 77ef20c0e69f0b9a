//! Backend query services.
//!
//! Lowdeck uses a pluggable service architecture where each integration kind
//! implements the `QueryService` trait. This module manages the registration
//! and lookup of these services.
//!
//! # Built-in Services
//!
//! | Kind      | Implementation | Description |
//! |-----------|----------------|-------------|
//! | `restapi` | `RestApiService` | HTTP JSON APIs, with bearer/basic/OAuth2 auth |
//!
//! # Adding a New Service
//!
//! 1. Create a struct implementing `QueryService`.
//! 2. Implement `run`, and `refresh_token` if the integration speaks OAuth.
//! 3. Register the service in `default_registry` in this module.

use async_trait::async_trait;
use lowdeck_common::config::HttpSettings;
use lowdeck_common::models::{AccessTokenDetails, ExecutionContext, SourceOptions};
use lowdeck_error::{ErrorCode, ErrorContext, LowdeckError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub mod oauth;
pub mod rest;

#[async_trait]
pub trait QueryService: Send + Sync {
    /// The integration kind this service handles (e.g., "restapi").
    fn kind(&self) -> &'static str;

    /// Execute resolved query options against the integration.
    ///
    /// The result is opaque to the runtime and returned to the caller as-is.
    async fn run(
        &self,
        source_options: &SourceOptions,
        query_options: &Value,
        context: &ExecutionContext,
    ) -> Result<Value>;

    /// Exchange the stored refresh token for fresh token material.
    ///
    /// Services without OAuth support keep the default.
    async fn refresh_token(
        &self,
        _source_options: &SourceOptions,
        _data_source_id: Option<&str>,
    ) -> Result<AccessTokenDetails> {
        Err(LowdeckError::new(
            ErrorCode::MissingTokenData,
            format!("Service '{}' does not support token refresh", self.kind()),
        ))
    }
}

#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<&'static str, Arc<dyn QueryService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: Arc<dyn QueryService>) {
        self.services.insert(service.kind(), service);
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn QueryService>> {
        self.services.get(kind).cloned().ok_or_else(|| {
            LowdeckError::new(
                ErrorCode::UnsupportedServiceKind,
                format!("No service registered for kind: {}", kind),
            )
            .with_context(ErrorContext::DataSource {
                data_source_id: None,
                kind: Some(kind.to_string()),
            })
        })
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = self.services.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Registry with the built-in services wired up.
pub fn default_registry(http: &HttpSettings) -> Result<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    registry.register(Arc::new(rest::RestApiService::new(http)?));
    Ok(registry)
}

/// String-valued entry of materialized source options.
pub(crate) fn option_str<'a>(options: &'a SourceOptions, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullService;

    #[async_trait]
    impl QueryService for NullService {
        fn kind(&self) -> &'static str {
            "null"
        }

        async fn run(
            &self,
            _source_options: &SourceOptions,
            _query_options: &Value,
            _context: &ExecutionContext,
        ) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(NullService));

        assert!(registry.get("null").is_ok());
        let err = registry.get("graphql").err().unwrap();
        assert_eq!(err.code, ErrorCode::UnsupportedServiceKind);
    }

    #[test]
    fn test_default_registry_kinds() {
        let registry = default_registry(&HttpSettings::default()).unwrap();
        assert_eq!(registry.kinds(), vec!["restapi"]);
    }

    #[tokio::test]
    async fn test_refresh_token_default_rejects() {
        let service = NullService;
        let err = service
            .refresh_token(&SourceOptions::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingTokenData);
    }
}
