//! Data source persistence collaborator.
//!
//! The runtime never talks to a database directly; it goes through the
//! `DataSourceStore` trait. The in-memory implementation here backs tests and
//! single-process deployments.

use async_trait::async_trait;
use lowdeck_common::models::{AccessTokenDetails, DataSource, TOKEN_DATA_KEY};
use lowdeck_error::{ErrorCode, ErrorContext, LowdeckError, Result};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[async_trait]
pub trait DataSourceStore: Send + Sync {
    /// Fresh snapshot of the data source, read from the persisted record.
    async fn get(&self, data_source_id: &str) -> Result<DataSource>;

    /// Persist new OAuth token material into the stored options.
    ///
    /// `current_options` is the options tree the caller last observed.
    /// Implementations must apply the update atomically with respect to
    /// concurrent refreshes of the same data source (single writer or
    /// compare-and-swap); a retried execution must never observe
    /// half-updated token state.
    async fn update_oauth_access_token(
        &self,
        details: &AccessTokenDetails,
        current_options: Option<&Value>,
        data_source_id: &str,
    ) -> Result<()>;

    /// Merge the given option entries into the stored options.
    async fn update_options(&self, data_source_id: &str, entries: Value) -> Result<()>;
}

/// Build the stored options tree carrying new token material.
///
/// The token lands as a plaintext `token_data` entry alongside the existing
/// entries, mirroring how the editor stores non-secret options.
pub fn options_with_token(current: Option<&Value>, details: &AccessTokenDetails) -> Value {
    let mut entries = match current {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    entries.insert(
        TOKEN_DATA_KEY.to_string(),
        json!({ "value": details, "encrypted": false }),
    );
    Value::Object(entries)
}

fn not_found(data_source_id: &str) -> LowdeckError {
    LowdeckError::new(
        ErrorCode::DataSourceNotFound,
        format!("Data source '{}' not found", data_source_id),
    )
    .with_context(ErrorContext::DataSource {
        data_source_id: Some(data_source_id.to_string()),
        kind: None,
    })
}

/// In-memory store. The mutex makes every token update a single-writer
/// transaction per process, satisfying the atomicity contract.
#[derive(Default)]
pub struct MemoryDataSourceStore {
    records: Mutex<HashMap<String, DataSource>>,
}

impl MemoryDataSourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, data_source: DataSource) {
        self.records
            .lock()
            .await
            .insert(data_source.id.clone(), data_source);
    }
}

#[async_trait]
impl DataSourceStore for MemoryDataSourceStore {
    async fn get(&self, data_source_id: &str) -> Result<DataSource> {
        self.records
            .lock()
            .await
            .get(data_source_id)
            .cloned()
            .ok_or_else(|| not_found(data_source_id))
    }

    async fn update_oauth_access_token(
        &self,
        details: &AccessTokenDetails,
        current_options: Option<&Value>,
        data_source_id: &str,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(data_source_id)
            .ok_or_else(|| not_found(data_source_id))?;
        let current = current_options.or(record.options.as_ref());
        record.options = Some(options_with_token(current, details));
        Ok(())
    }

    async fn update_options(&self, data_source_id: &str, entries: Value) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(data_source_id)
            .ok_or_else(|| not_found(data_source_id))?;

        let mut merged = match record.options.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Value::Object(new_entries) = entries {
            merged.extend(new_entries);
        }
        record.options = Some(Value::Object(merged));
        Ok(())
    }
}
