//! # lowdeck-error
//!
//! Unified error types for the Lowdeck query execution core.
//!
//! All errors are designed to be machine-parseable with:
//! - Numeric error codes (LOWDECK-XXXX)
//! - Structured JSON context
//! - Actionable hints surfaced to app builders

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;
pub use convert::closest_match;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all Lowdeck operations.
///
/// Serialized as-is into query run responses, so codes and field names are
/// a stable contract with the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowdeckError {
    /// Numeric error code (e.g., "LOWDECK-3001")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Actionable suggestion surfaced in the query editor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Correlation ID for distributed tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl LowdeckError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
            trace_id: None,
        }
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add an actionable hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Add trace ID for correlation
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// HTTP status carried by this error, if the failure originated from an
    /// upstream HTTP response.
    pub fn http_status(&self) -> Option<u16> {
        match &self.context {
            Some(ErrorContext::Http { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Serialize to JSON for API responses
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize LowdeckError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }

    /// Serialize to pretty JSON for logging
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

impl fmt::Display for LowdeckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for LowdeckError {}

/// Result type alias for Lowdeck operations
pub type Result<T> = std::result::Result<T, LowdeckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowdeck_error_builder() {
        let err = LowdeckError::new(ErrorCode::SecretDecryptionFailed, "Decryption failed")
            .with_hint("Check the organization encryption key")
            .with_trace_id("12345");

        assert_eq!(err.code, ErrorCode::SecretDecryptionFailed);
        assert_eq!(err.message, "Decryption failed");
        assert_eq!(
            err.hint,
            Some("Check the organization encryption key".to_string())
        );
        assert_eq!(err.trace_id, Some("12345".to_string()));
        assert!(err.context.is_none());
    }

    #[test]
    fn test_display_implementation() {
        let err = LowdeckError::new(ErrorCode::ExpressionSyntax, "Unexpected token")
            .with_hint("Close the parenthesis");

        assert_eq!(
            err.to_string(),
            "[LOWDECK-2001] Unexpected token (Hint: Close the parenthesis)"
        );

        let err_no_hint = LowdeckError::new(ErrorCode::Unknown, "Crash");
        assert_eq!(err_no_hint.to_string(), "[LOWDECK-9999] Crash");
    }

    #[test]
    fn test_http_status_accessor() {
        let err = LowdeckError::new(ErrorCode::QueryFailed, "Upstream rejected the request")
            .with_context(ErrorContext::Http {
                status: 401,
                url: None,
            });
        assert_eq!(err.http_status(), Some(401));

        let plain = LowdeckError::new(ErrorCode::QueryFailed, "boom");
        assert_eq!(plain.http_status(), None);
    }

    #[test]
    fn test_json_output() {
        let err = LowdeckError::new(ErrorCode::UnauthorizedClient, "Access token rejected");
        let json = err.to_json();

        assert!(json.contains("\"code\":\"LOWDECK-4001\""));
        assert!(json.contains("\"message\":\"Access token rejected\""));

        let pretty = err.to_json_pretty();
        assert!(pretty.contains('\n'));
        assert!(pretty.contains("LOWDECK-4001"));
    }
}
