//! # Error Contexts
//!
//! Structured metadata for errors to enable programmatic analysis.

use serde::{Deserialize, Serialize};

/// Structured context attached to a [`crate::LowdeckError`].
///
/// Each variant carries the fields relevant to that failure class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for LOWDECK-2001/2002/2003 (expression errors).
    ///
    /// Always carries the offending expression text for diagnostics.
    Expression { expression: String },

    /// Context for LOWDECK-3001 (SecretDecryptionFailed)
    Secret {
        variable: String,
        organization_id: String,
    },

    /// Context for LOWDECK-3002 (CredentialNotFound)
    Credential { credential_id: String },

    /// Context for failures originating from an upstream HTTP response.
    ///
    /// The orchestrator reads `status` when deciding whether a failure
    /// qualifies for the token refresh path.
    Http { status: u16, url: Option<String> },

    /// Context for LOWDECK-1001/1005 (data source errors)
    DataSource {
        data_source_id: Option<String>,
        kind: Option<String>,
    },

    /// Generic key-value context for extensibility
    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}
