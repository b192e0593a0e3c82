//! Result and error types for the core library

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::connection::ConnectionStatus;

/// Typed error code reported by a provider client
///
/// Provider adapters translate their wire-level codes into one of these
/// variants so that services switch on the tag instead of matching on
/// message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    /// The user must log in again at the institution
    LoginRequired,
    /// Access token is invalid, revoked or expired
    InvalidAccessToken,
    /// Refresh token is invalid or expired
    InvalidRefreshToken,
    /// Provider rate limit hit
    RateLimited,
    /// Temporary network, institution or provider failure
    Transient,
    /// Operation not offered by this provider
    Unsupported,
    /// Any other provider code, kept verbatim for diagnostics
    Other(String),
}

impl ProviderErrorCode {
    /// True when retrying cannot help until the user acts
    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            Self::LoginRequired | Self::InvalidAccessToken | Self::InvalidRefreshToken
        )
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoginRequired => write!(f, "login_required"),
            Self::InvalidAccessToken => write!(f, "invalid_access_token"),
            Self::InvalidRefreshToken => write!(f, "invalid_refresh_token"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Transient => write!(f, "transient"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Other(code) => write!(f, "{}", code.to_lowercase()),
        }
    }
}

/// Error returned by a provider client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn login_required(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::LoginRequired, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Transient, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Unsupported, message)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Failure classes that drive retry and notification decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection or account missing; fatal for the invocation
    NotFound,
    /// Rate limits, network or provider hiccups; retried with backoff
    ProviderTransient,
    /// Login required or token invalid; never retried automatically
    ProviderAuthExpired,
    /// Datastore failure; retried after a longer fixed delay
    SystemPersistence,
    /// Automated path is done; converted into a user notification
    ExhaustedRetries,
    /// Programming, configuration or validation error; not retried
    Fatal,
}

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Bank connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Bank account not found: {0}")]
    AccountNotFound(String),

    #[error("Provider did not return account {0}")]
    ProviderAccountMismatch(String),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify the error for retry and notification policy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionNotFound(_) | Self::AccountNotFound(_) => ErrorKind::NotFound,
            Self::Provider(e) if e.code.is_auth_expired() => ErrorKind::ProviderAuthExpired,
            Self::Provider(e) if e.code == ProviderErrorCode::Unsupported => ErrorKind::Fatal,
            Self::Provider(_) | Self::ProviderAccountMismatch(_) | Self::Timeout(_) => {
                ErrorKind::ProviderTransient
            }
            Self::Database(_) | Self::Io(_) => ErrorKind::SystemPersistence,
            Self::RetriesExhausted { .. } => ErrorKind::ExhaustedRetries,
            Self::InvalidTransition { .. }
            | Self::Config(_)
            | Self::Validation(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorKind::Fatal,
        }
    }

    /// Provider error code, if this is a provider error
    pub fn provider_code(&self) -> Option<&ProviderErrorCode> {
        match self {
            Self::Provider(e) => Some(&e.code),
            _ => None,
        }
    }

    /// True for rate-limit responses
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.provider_code(), Some(ProviderErrorCode::RateLimited))
    }
}

impl From<ProviderError> for Error {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Provider(ProviderError::transient("Provider request timed out"))
        } else if e.is_connect() {
            Self::Provider(ProviderError::transient("Unable to connect to provider"))
        } else {
            Self::Provider(ProviderError::transient(format!("Provider request failed: {}", e)))
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let mut context = HashMap::new();
                context.insert(
                    "kind".to_string(),
                    serde_json::to_value(e.kind()).unwrap_or(serde_json::Value::Null),
                );
                Self::fail_with_context(e.to_string(), context)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kind() {
        assert_eq!(
            Error::ConnectionNotFound("c1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(Error::AccountNotFound("a1".into()).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_auth_errors_are_not_transient() {
        for code in [
            ProviderErrorCode::LoginRequired,
            ProviderErrorCode::InvalidAccessToken,
            ProviderErrorCode::InvalidRefreshToken,
        ] {
            let err = Error::Provider(ProviderError::new(code, "expired"));
            assert_eq!(err.kind(), ErrorKind::ProviderAuthExpired);
        }
    }

    #[test]
    fn test_transient_and_persistence_kinds() {
        let err = Error::Provider(ProviderError::rate_limited("slow down"));
        assert_eq!(err.kind(), ErrorKind::ProviderTransient);
        assert!(err.is_rate_limited());

        assert_eq!(
            Error::database("disk full").kind(),
            ErrorKind::SystemPersistence
        );
        assert_eq!(Error::Timeout(300).kind(), ErrorKind::ProviderTransient);
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new(
            ProviderErrorCode::Other("PRODUCT_NOT_READY".into()),
            "the requested product is not yet ready",
        );
        assert_eq!(
            err.to_string(),
            "the requested product is not yet ready (product_not_ready)"
        );
    }

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_from_result_carries_kind() {
        let err: Result<i32> = Err(Error::AccountNotFound("a1".into()));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Bank account not found"));
        let context = result.context.unwrap();
        assert_eq!(context["kind"], serde_json::json!("not_found"));
    }
}
