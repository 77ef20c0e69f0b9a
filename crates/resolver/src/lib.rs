//! Query-options resolution engine.
//!
//! Everything between a stored query definition and a runnable request lives
//! here:
//!
//! - **Secrets** (`secrets`): organization-scoped server variables, decrypted
//!   per execution through the `EncryptionService` collaborator.
//! - **Expressions** (`expr`): a constrained evaluator for the text inside a
//!   `{{ ... }}` placeholder. No general code execution, by construction.
//! - **Interpolation** (`interpolate`): the recursive walk that replaces
//!   placeholders throughout a query's option tree.
//! - **Source options** (`source_options`): materializes stored connection
//!   configuration, resolving encrypted entries through the credential store.

pub mod expr;
pub mod interpolate;
pub mod secrets;
pub mod source_options;

pub use interpolate::Interpolator;
pub use secrets::{EncryptionService, SecretResolver, VariableStore};
pub use source_options::{CredentialStore, SourceOptionsMaterializer};
