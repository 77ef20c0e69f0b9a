use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Key under which OAuth token material is stored inside data source options.
pub const TOKEN_DATA_KEY: &str = "token_data";

/// Caller-supplied values for placeholders already resolved on the client,
/// keyed by the literal placeholder text (e.g. `"{{components.table1.selectedRow.id}}"`).
///
/// Read-only during resolution.
pub type RuntimeOptions = HashMap<String, Value>;

/// Connection configuration after credential resolution: plain key -> value.
pub type SourceOptions = HashMap<String, Value>;

/// An organization-scoped secret, exposed to queries only through the
/// `globals.environmentVariables.server` namespace.
///
/// The value is stored encrypted and decrypted on every access so that
/// secret rotation is observed immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerVariable {
    pub name: String,
    pub encrypted_value: String,
    pub organization_id: String,
}

/// One entry of a data source's stored options.
///
/// Exactly one of `value` (when `encrypted` is false) or `credential_id`
/// (when `encrypted` is true) is meaningful.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceOption {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub credential_id: Option<String>,
}

impl SourceOption {
    pub fn plain(value: Value) -> Self {
        Self {
            value: Some(value),
            encrypted: false,
            credential_id: None,
        }
    }

    pub fn credential(credential_id: impl Into<String>) -> Self {
        Self {
            value: None,
            encrypted: true,
            credential_id: Some(credential_id.into()),
        }
    }
}

/// A stored connection configuration.
///
/// `updated_at` doubles as a cache-invalidation token for backend services
/// that pool connections per data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A query definition as authored in the app editor.
///
/// `options` is a JSON tree that may contain `{{ ... }}` placeholders;
/// it is never mutated in place, resolution produces a new tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub options: Value,
    #[serde(default)]
    pub data_source_id: Option<String>,
}

/// Per-execution context, passed through to services and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub organization_id: String,
    #[serde(default)]
    pub data_source_id: Option<String>,
    #[serde(default)]
    pub data_source_updated_at: Option<String>,
}

impl ExecutionContext {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            data_source_id: None,
            data_source_updated_at: None,
        }
    }

    pub fn for_data_source(organization_id: impl Into<String>, source: &DataSource) -> Self {
        Self {
            organization_id: organization_id.into(),
            data_source_id: Some(source.id.clone()),
            data_source_updated_at: source.updated_at.clone(),
        }
    }
}

/// Token material returned by an OAuth token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenDetails {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
