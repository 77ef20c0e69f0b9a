//! Materialization of stored data source options.
//!
//! Stored options map each key to a [`SourceOption`] entry that is either a
//! plain value or a reference to an encrypted credential. Materialization
//! produces the flat key -> value map handed to backend services.

use async_trait::async_trait;
use lowdeck_common::models::{SourceOption, SourceOptions};
use lowdeck_error::{ErrorCode, ErrorContext, LowdeckError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// External credential store; plaintext never persists in this core.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_value(&self, credential_id: &str) -> Result<SecretString>;
}

pub struct SourceOptionsMaterializer {
    credentials: Arc<dyn CredentialStore>,
}

impl SourceOptionsMaterializer {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    /// Resolve raw stored options into a flat map.
    ///
    /// Adhoc queries (REST API queries without a stored data source) carry no
    /// options at all; that case yields an empty map, not an error.
    pub async fn materialize(&self, raw: Option<&Value>) -> Result<SourceOptions> {
        let raw = match raw {
            None | Some(Value::Null) => return Ok(HashMap::new()),
            Some(value) => value,
        };

        let entries = raw.as_object().ok_or_else(|| invalid_options(raw))?;

        let mut materialized = HashMap::with_capacity(entries.len());
        for (key, entry) in entries {
            let option: SourceOption =
                serde_json::from_value(entry.clone()).map_err(|_| invalid_options(entry))?;

            if option.encrypted {
                let credential_id = option.credential_id.as_deref().ok_or_else(|| {
                    LowdeckError::new(
                        ErrorCode::InvalidSourceOptions,
                        format!("Encrypted option '{}' has no credential id", key),
                    )
                })?;
                let secret = self.credentials.get_value(credential_id).await?;
                materialized.insert(
                    key.clone(),
                    Value::String(secret.expose_secret().to_string()),
                );
            } else {
                materialized.insert(key.clone(), option.value.unwrap_or(Value::Null));
            }
        }

        Ok(materialized)
    }
}

fn invalid_options(entry: &Value) -> LowdeckError {
    LowdeckError::new(
        ErrorCode::InvalidSourceOptions,
        "Stored source options are malformed",
    )
    .with_context(ErrorContext::Generic {
        data: std::collections::HashMap::from([(
            "entry".to_string(),
            Value::String(entry.to_string()),
        )]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticCredentials(HashMap<String, String>);

    #[async_trait]
    impl CredentialStore for StaticCredentials {
        async fn get_value(&self, credential_id: &str) -> Result<SecretString> {
            self.0
                .get(credential_id)
                .map(|value| SecretString::from(value.clone()))
                .ok_or_else(|| {
                    LowdeckError::new(ErrorCode::CredentialNotFound, "No such credential")
                        .with_context(ErrorContext::Credential {
                            credential_id: credential_id.to_string(),
                        })
                })
        }
    }

    fn materializer() -> SourceOptionsMaterializer {
        SourceOptionsMaterializer::new(Arc::new(StaticCredentials(HashMap::from([(
            "cred-1".to_string(),
            "hunter2".to_string(),
        )]))))
    }

    #[tokio::test]
    async fn test_null_options_yield_empty_map() {
        assert!(materializer().materialize(None).await.unwrap().is_empty());
        assert!(materializer()
            .materialize(Some(&Value::Null))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_plain_and_encrypted_options() {
        let raw = json!({
            "url": { "value": "https://api.example.com", "encrypted": false },
            "password": { "encrypted": true, "credential_id": "cred-1" },
            "token_data": { "value": { "access_token": "abc" }, "encrypted": false }
        });

        let materialized = materializer().materialize(Some(&raw)).await.unwrap();
        assert_eq!(materialized["url"], json!("https://api.example.com"));
        assert_eq!(materialized["password"], json!("hunter2"));
        assert_eq!(materialized["token_data"], json!({ "access_token": "abc" }));
    }

    #[tokio::test]
    async fn test_missing_credential_propagates() {
        let raw = json!({
            "password": { "encrypted": true, "credential_id": "gone" }
        });
        let err = materializer().materialize(Some(&raw)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CredentialNotFound);
    }

    #[tokio::test]
    async fn test_malformed_entry_rejected() {
        let raw = json!({ "url": "bare string, not an option entry" });
        let err = materializer().materialize(Some(&raw)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSourceOptions);
    }

    #[tokio::test]
    async fn test_encrypted_without_credential_id_rejected() {
        let raw = json!({ "password": { "encrypted": true } });
        let err = materializer().materialize(Some(&raw)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSourceOptions);
    }
}
