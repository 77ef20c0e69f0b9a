//! Organization-scoped server variable resolution.
//!
//! Server variables are stored encrypted and decrypted on every resolution;
//! nothing is cached across executions so secret rotation takes effect on the
//! next query run.

use async_trait::async_trait;
use futures::future::join_all;
use lowdeck_common::models::ServerVariable;
use lowdeck_error::{ErrorCode, ErrorContext, LowdeckError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Encryption scope under which server variables are stored.
pub const SERVER_VARIABLES_SCOPE: &str = "org_environment_variables";

/// Read access to an organization's stored server variables.
#[async_trait]
pub trait VariableStore: Send + Sync {
    /// All server-scoped variables for the organization, in stable store order.
    async fn server_variables(&self, organization_id: &str) -> Result<Vec<ServerVariable>>;
}

/// Column-level decryption collaborator.
#[async_trait]
pub trait EncryptionService: Send + Sync {
    async fn decrypt(
        &self,
        scope: &str,
        organization_id: &str,
        ciphertext: &str,
    ) -> Result<String>;
}

/// Resolves the plaintext server-variable map for one organization.
pub struct SecretResolver {
    variables: Arc<dyn VariableStore>,
    encryption: Arc<dyn EncryptionService>,
}

impl SecretResolver {
    pub fn new(variables: Arc<dyn VariableStore>, encryption: Arc<dyn EncryptionService>) -> Self {
        Self {
            variables,
            encryption,
        }
    }

    /// Fetch and decrypt every server variable for `organization_id`.
    ///
    /// Decryptions are dispatched concurrently and fully joined. A single
    /// failure fails the whole resolution (fail-closed); when several fail,
    /// the one earliest in store order is reported, keeping the error
    /// deterministic.
    pub async fn resolve_server_variables(
        &self,
        organization_id: &str,
    ) -> Result<HashMap<String, String>> {
        let variables = self.variables.server_variables(organization_id).await?;
        debug!(
            organization_id,
            count = variables.len(),
            "Resolving server variables"
        );

        let decryptions = variables.iter().map(|variable| {
            let encryption = Arc::clone(&self.encryption);
            async move {
                let plaintext = encryption
                    .decrypt(
                        SERVER_VARIABLES_SCOPE,
                        organization_id,
                        &variable.encrypted_value,
                    )
                    .await
                    .map_err(|source| {
                        LowdeckError::new(
                            ErrorCode::SecretDecryptionFailed,
                            format!(
                                "Failed to decrypt server variable '{}': {}",
                                variable.name, source.message
                            ),
                        )
                        .with_context(ErrorContext::Secret {
                            variable: variable.name.clone(),
                            organization_id: organization_id.to_string(),
                        })
                    })?;
                Ok((variable.name.clone(), plaintext)) as Result<(String, String)>
            }
        });

        let mut resolved = HashMap::with_capacity(variables.len());
        for outcome in join_all(decryptions).await {
            let (name, plaintext) = outcome?;
            resolved.insert(name, plaintext);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticVariables(Vec<ServerVariable>);

    #[async_trait]
    impl VariableStore for StaticVariables {
        async fn server_variables(&self, _organization_id: &str) -> Result<Vec<ServerVariable>> {
            Ok(self.0.clone())
        }
    }

    /// Reverses the ciphertext; fails on the marker value.
    struct ReversingEncryption;

    #[async_trait]
    impl EncryptionService for ReversingEncryption {
        async fn decrypt(
            &self,
            _scope: &str,
            _organization_id: &str,
            ciphertext: &str,
        ) -> Result<String> {
            if ciphertext == "corrupt" {
                return Err(LowdeckError::new(
                    ErrorCode::SecretDecryptionFailed,
                    "Bad ciphertext",
                ));
            }
            Ok(ciphertext.chars().rev().collect())
        }
    }

    fn variable(name: &str, ciphertext: &str) -> ServerVariable {
        ServerVariable {
            name: name.to_string(),
            encrypted_value: ciphertext.to_string(),
            organization_id: "org-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_resolves_all_variables() {
        let resolver = SecretResolver::new(
            Arc::new(StaticVariables(vec![
                variable("API_KEY", "terces"),
                variable("DB_PASSWORD", "drowssap"),
            ])),
            Arc::new(ReversingEncryption),
        );

        let resolved = resolver.resolve_server_variables("org-1").await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["API_KEY"], "secret");
        assert_eq!(resolved["DB_PASSWORD"], "password");
    }

    #[tokio::test]
    async fn test_single_decryption_failure_fails_closed() {
        let resolver = SecretResolver::new(
            Arc::new(StaticVariables(vec![
                variable("GOOD", "enif"),
                variable("BAD", "corrupt"),
                variable("ALSO_BAD", "corrupt"),
            ])),
            Arc::new(ReversingEncryption),
        );

        let err = resolver
            .resolve_server_variables("org-1")
            .await
            .expect_err("resolution must fail closed");
        assert_eq!(err.code, ErrorCode::SecretDecryptionFailed);
        // First failure in store order wins.
        assert!(err.message.contains("'BAD'"));
        match err.context {
            Some(ErrorContext::Secret {
                variable,
                organization_id,
            }) => {
                assert_eq!(variable, "BAD");
                assert_eq!(organization_id, "org-1");
            }
            _ => panic!("Expected secret context"),
        }
    }

    #[tokio::test]
    async fn test_no_variables_resolves_empty() {
        let resolver = SecretResolver::new(
            Arc::new(StaticVariables(vec![])),
            Arc::new(ReversingEncryption),
        );
        let resolved = resolver.resolve_server_variables("org-1").await.unwrap();
        assert!(resolved.is_empty());
    }
}
