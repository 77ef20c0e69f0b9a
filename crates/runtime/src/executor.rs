//! Query execution orchestration.
//!
//! Composes source-option materialization, placeholder interpolation, and
//! service dispatch, and owns the one-shot OAuth recovery path: when a run
//! fails with an unauthorized-client signal (or a 401 against a source that
//! holds token data), the executor refreshes the token, persists it, reloads
//! the data source, re-resolves everything, and retries exactly once.

use crate::datasource::DataSourceStore;
use lowdeck_common::config::{HttpSettings, ServerSettings};
use lowdeck_common::models::{
    DataSource, ExecutionContext, QueryDefinition, RuntimeOptions, SourceOptions, TOKEN_DATA_KEY,
};
use lowdeck_error::{ErrorCode, LowdeckError, Result};
use lowdeck_resolver::{Interpolator, SourceOptionsMaterializer};
use lowdeck_services::{oauth, QueryService, ServiceRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct QueryExecutor {
    registry: Arc<ServiceRegistry>,
    interpolator: Interpolator,
    materializer: SourceOptionsMaterializer,
    data_sources: Arc<dyn DataSourceStore>,
    oauth_client: reqwest::Client,
    oauth_redirect_uri: String,
}

/// Everything needed for one dispatch, resolved from a fresh data source
/// snapshot.
struct PreparedRun {
    service: Arc<dyn QueryService>,
    source_options: SourceOptions,
    query_options: Value,
    context: ExecutionContext,
    data_source: Option<DataSource>,
}

impl QueryExecutor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        interpolator: Interpolator,
        materializer: SourceOptionsMaterializer,
        data_sources: Arc<dyn DataSourceStore>,
        server: &ServerSettings,
        http: &HttpSettings,
    ) -> Result<Self> {
        let oauth_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| {
                LowdeckError::new(
                    ErrorCode::ServiceInternal,
                    format!("Failed to build HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            registry,
            interpolator,
            materializer,
            data_sources,
            oauth_client,
            oauth_redirect_uri: server.oauth_redirect_uri(),
        })
    }

    /// Execute a query with resolved options, applying the one-shot
    /// refresh-and-retry recovery on authorization failures.
    pub async fn run_query(
        &self,
        query: &QueryDefinition,
        runtime_options: &RuntimeOptions,
        organization_id: &str,
    ) -> Result<Value> {
        let prepared = self.prepare(query, runtime_options, organization_id).await?;

        let error = match prepared
            .service
            .run(
                &prepared.source_options,
                &prepared.query_options,
                &prepared.context,
            )
            .await
        {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        if !should_refresh(&error, &prepared.source_options) {
            return Err(error);
        }
        let Some(data_source) = prepared.data_source else {
            // Nothing stored to refresh against; surface the original error.
            return Err(error);
        };

        warn!(
            query = %query.name,
            data_source_id = %data_source.id,
            "Access token expired, attempting refresh token flow"
        );

        let details = prepared
            .service
            .refresh_token(&prepared.source_options, Some(&data_source.id))
            .await?;
        self.data_sources
            .update_oauth_access_token(&details, data_source.options.as_ref(), &data_source.id)
            .await?;

        // Re-resolve from the reloaded record so the retried run sees the
        // persisted token, then dispatch exactly once more.
        let retried = self.prepare(query, runtime_options, organization_id).await?;
        retried
            .service
            .run(
                &retried.source_options,
                &retried.query_options,
                &retried.context,
            )
            .await
    }

    /// Exchange an OAuth authorization code and persist the resulting token
    /// material on the data source.
    pub async fn authorize_oauth2(&self, data_source_id: &str, code: &str) -> Result<()> {
        let data_source = self.data_sources.get(data_source_id).await?;
        let source_options = self
            .materializer
            .materialize(data_source.options.as_ref())
            .await?;

        let details = oauth::exchange_authorization_code(
            &self.oauth_client,
            &source_options,
            code,
            &self.oauth_redirect_uri,
        )
        .await?;

        info!(data_source_id = %data_source_id, "Persisting OAuth token material");
        let entries = json!({
            TOKEN_DATA_KEY: { "value": details, "encrypted": false }
        });
        self.data_sources
            .update_options(data_source_id, entries)
            .await
    }

    async fn prepare(
        &self,
        query: &QueryDefinition,
        runtime_options: &RuntimeOptions,
        organization_id: &str,
    ) -> Result<PreparedRun> {
        let data_source = match &query.data_source_id {
            Some(id) => Some(self.data_sources.get(id).await?),
            None => None,
        };

        let source_options = self
            .materializer
            .materialize(data_source.as_ref().and_then(|ds| ds.options.as_ref()))
            .await?;
        let query_options = self
            .interpolator
            .interpolate(&query.options, runtime_options, organization_id)
            .await?;
        let service = self.registry.get(&query.kind)?;

        let context = match &data_source {
            Some(ds) => ExecutionContext::for_data_source(organization_id, ds),
            None => ExecutionContext::new(organization_id),
        };

        Ok(PreparedRun {
            service,
            source_options,
            query_options,
            context,
            data_source,
        })
    }
}

/// Whether a run failure qualifies for the refresh-and-retry path: either
/// the service raised the OAuth unauthorized-client signal, or the failure
/// carries HTTP 401 and the source holds prior token data.
fn should_refresh(error: &LowdeckError, source_options: &SourceOptions) -> bool {
    error.code == ErrorCode::UnauthorizedClient
        || (error.http_status() == Some(401) && source_options.contains_key(TOKEN_DATA_KEY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lowdeck_error::ErrorContext;

    #[test]
    fn test_should_refresh_classification() {
        let unauthorized = LowdeckError::new(ErrorCode::UnauthorizedClient, "no");
        let plain_401 = LowdeckError::new(ErrorCode::QueryFailed, "no")
            .with_context(ErrorContext::Http {
                status: 401,
                url: None,
            });
        let server_error = LowdeckError::new(ErrorCode::QueryFailed, "boom")
            .with_context(ErrorContext::Http {
                status: 500,
                url: None,
            });

        let without_token = SourceOptions::new();
        let with_token = SourceOptions::from([(
            TOKEN_DATA_KEY.to_string(),
            json!({ "access_token": "stale" }),
        )]);

        assert!(should_refresh(&unauthorized, &without_token));
        assert!(should_refresh(&plain_401, &with_token));
        assert!(!should_refresh(&plain_401, &without_token));
        assert!(!should_refresh(&server_error, &with_token));
    }
}
