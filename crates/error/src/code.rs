use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following LOWDECK-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Data source / connection errors
/// - **2000-2999**: Query and expression errors
/// - **3000-3999**: Secret and configuration errors
/// - **4000-4999**: Authentication/token errors
/// - **5000-5999**: Internal/System errors
///
/// Codes are stable across versions (semver contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Data Source Errors (1000-1999) ===
    /// LOWDECK-1001: Data source not found
    DataSourceNotFound = 1001,
    /// LOWDECK-1002: Network connection timeout
    ConnectionTimeout = 1002,
    /// LOWDECK-1005: No service registered for the query kind
    UnsupportedServiceKind = 1005,

    // === Query Errors (2000-2999) ===
    /// LOWDECK-2001: Placeholder expression syntax error
    ExpressionSyntax = 2001,
    /// LOWDECK-2002: Placeholder expression references an unknown name
    UnknownReference = 2002,
    /// LOWDECK-2003: Type mismatch in expression
    TypeMismatch = 2003,
    /// LOWDECK-2004: Backend service reported a query failure
    QueryFailed = 2004,

    // === Secret/Config Errors (3000-3999) ===
    /// LOWDECK-3001: Server variable decryption failed
    SecretDecryptionFailed = 3001,
    /// LOWDECK-3002: Credential not found in the credential store
    CredentialNotFound = 3002,
    /// LOWDECK-3003: Missing required field in configuration
    MissingRequiredField = 3003,
    /// LOWDECK-3004: Stored source options are malformed
    InvalidSourceOptions = 3004,

    // === Auth Errors (4000-4999) ===
    /// LOWDECK-4001: OAuth client unauthorized (access token expired/revoked)
    UnauthorizedClient = 4001,
    /// LOWDECK-4002: Token refresh flow failed
    TokenRefreshFailed = 4002,
    /// LOWDECK-4003: Data source carries no token data to refresh
    MissingTokenData = 4003,

    // === Internal Errors (5000-5999) ===
    /// LOWDECK-5001: Unexpected internal service error
    ServiceInternal = 5001,
    /// LOWDECK-5002: Serialization/deserialization failed
    SerializationFailed = 5002,
    /// LOWDECK-5004: Feature not implemented
    NotImplemented = 5004,

    /// LOWDECK-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "LOWDECK-3001")
    pub fn as_str(&self) -> String {
        format!("LOWDECK-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::DataSource,
            2000..=2999 => ErrorCategory::Query,
            3000..=3999 => ErrorCategory::Secrets,
            4000..=4999 => ErrorCategory::Auth,
            5000..=5999 => ErrorCategory::Internal,
            _ => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        // Parse "LOWDECK-XXXX" format
        let num: u16 = s
            .strip_prefix("LOWDECK-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::DataSourceNotFound),
            1002 => Ok(Self::ConnectionTimeout),
            1005 => Ok(Self::UnsupportedServiceKind),
            2001 => Ok(Self::ExpressionSyntax),
            2002 => Ok(Self::UnknownReference),
            2003 => Ok(Self::TypeMismatch),
            2004 => Ok(Self::QueryFailed),
            3001 => Ok(Self::SecretDecryptionFailed),
            3002 => Ok(Self::CredentialNotFound),
            3003 => Ok(Self::MissingRequiredField),
            3004 => Ok(Self::InvalidSourceOptions),
            4001 => Ok(Self::UnauthorizedClient),
            4002 => Ok(Self::TokenRefreshFailed),
            4003 => Ok(Self::MissingTokenData),
            5001 => Ok(Self::ServiceInternal),
            5002 => Ok(Self::SerializationFailed),
            5004 => Ok(Self::NotImplemented),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// High-level error category for frontend grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCategory {
    DataSource,
    Query,
    Secrets,
    Auth,
    Internal,
}
