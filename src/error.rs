//! Error types for the Lookout MCP server.
//!
//! This module defines `LookoutError`, the unified error type used throughout
//! the application. Upstream failures are mapped onto a small set of semantic
//! kinds (see [`ErrorKind`]) so tool handlers never reason about transport
//! status codes.
//!
//! # Security
//!
//! Credentials must never appear in logs or in errors returned to callers.
//! Use `sanitize_message()` when constructing messages from external sources.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Semantic error kinds surfaced to tool handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad parameters, including upstream field validation failures.
    InvalidInput,
    /// The addressed resource or endpoint does not exist.
    NotFound,
    /// Bad credentials, missing credentials or insufficient scope.
    Unauthorized,
    /// The upstream API throttled the call.
    RateLimit,
    /// Upstream unavailable, timed out, failed or returned an unexpected shape.
    Upstream,
    /// Local failure unrelated to the upstream API (configuration, serialization).
    Internal,
}

impl ErrorKind {
    /// Returns the stable string form used in tool responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Upstream => "upstream_error",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Diagnostics attached to every error raised for an outbound call.
///
/// The correlation id is generated once per logical call and appears in every
/// log event for that call, so a user-visible failure can be matched with the
/// server-side logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    /// Correlation id of the call.
    pub correlation_id: String,
    /// HTTP method attempted.
    pub method: String,
    /// Endpoint path attempted, relative to the client's base URL.
    pub endpoint: String,
    /// Number of attempts made before the error was raised.
    pub attempts: u32,
    /// Actionable hint for the caller, if one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ErrorContext {
    /// Creates a context with a fresh correlation id.
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            method: method.into(),
            endpoint: endpoint.into(),
            attempts: 0,
            suggestion: None,
        }
    }

    /// Attaches an actionable suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// A single field-level validation failure reported by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Path of the offending field (e.g. `subject`).
    pub path: String,
    /// Upstream explanation.
    pub message: String,
}

/// Unified error type for all Lookout operations.
#[derive(Error, Debug)]
pub enum LookoutError {
    /// Configuration error - missing or invalid environment variables.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client initialization or transport failure outside a mapped call.
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local input validation failed before any call was made.
    #[error("validation error: {0}")]
    Validation(String),

    /// The upstream API rejected the parameters.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Human-readable summary.
        message: String,
        /// Field-level detail, present for HTTP 422 responses.
        field_errors: Vec<FieldError>,
        /// Call diagnostics.
        context: ErrorContext,
    },

    /// The resource or endpoint does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable summary.
        message: String,
        /// Call diagnostics.
        context: ErrorContext,
    },

    /// Authentication failed, no credential is configured, or the scope is insufficient.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Human-readable summary.
        message: String,
        /// Call diagnostics.
        context: ErrorContext,
    },

    /// Rate limited by the server (HTTP 429).
    #[error("rate limited by server - please wait before retrying")]
    RateLimited {
        /// Suggested retry delay, if provided by the server.
        retry_after: Option<Duration>,
        /// Call diagnostics.
        context: ErrorContext,
    },

    /// Upstream unavailable, timed out, returned 5xx or an unexpected payload.
    #[error("upstream error: {message}")]
    Upstream {
        /// Human-readable summary.
        message: String,
        /// HTTP status, when the upstream answered at all.
        status: Option<u16>,
        /// Whether retrying the call may succeed.
        transient: bool,
        /// Call diagnostics.
        context: ErrorContext,
    },
}

impl LookoutError {
    /// Creates a configuration error for a missing environment variable.
    pub fn missing_env(var_name: &str) -> Self {
        LookoutError::Config(format!(
            "missing required environment variable: {}",
            var_name
        ))
    }

    /// Creates a configuration error for an invalid value.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        LookoutError::Config(message.into())
    }

    /// Creates a local validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        LookoutError::Validation(message.into())
    }

    /// Creates a not-found error for a call.
    pub fn not_found(message: impl Into<String>, context: ErrorContext) -> Self {
        LookoutError::NotFound {
            message: message.into(),
            context,
        }
    }

    /// Creates an unauthorized error for a call.
    pub fn unauthorized(message: impl Into<String>, context: ErrorContext) -> Self {
        LookoutError::Unauthorized {
            message: message.into(),
            context,
        }
    }

    /// Creates a transient upstream error (timeouts, network failures, 5xx).
    pub fn transient(message: impl Into<String>, status: Option<u16>, context: ErrorContext) -> Self {
        LookoutError::Upstream {
            message: message.into(),
            status,
            transient: true,
            context,
        }
    }

    /// Creates a permanent upstream error such as an unexpected response shape.
    pub fn unexpected_shape(message: impl Into<String>, context: ErrorContext) -> Self {
        LookoutError::Upstream {
            message: message.into(),
            status: None,
            transient: false,
            context,
        }
    }

    /// Error raised when no credential is configured for a client.
    pub fn missing_credentials(context: ErrorContext) -> Self {
        LookoutError::Unauthorized {
            message: "no API credentials configured".to_string(),
            context: context.with_suggestion(
                "set HELPSCOUT_APP_ID and HELPSCOUT_APP_SECRET, or HELPSCOUT_API_TOKEN \
                 (HELPSCOUT_DOCS_API_KEY for Docs tools)",
            ),
        }
    }

    /// Error raised when a delete is attempted while deletions are disabled.
    pub fn deletion_disabled(context: ErrorContext) -> Self {
        LookoutError::Unauthorized {
            message: format!(
                "deletions are disabled; refusing to delete {}",
                context.endpoint
            ),
            context: context
                .with_suggestion("set HELPSCOUT_ALLOW_DELETES=true to enable destructive operations"),
        }
    }

    /// Returns the semantic kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            LookoutError::Validation(_) | LookoutError::InvalidInput { .. } => {
                ErrorKind::InvalidInput
            }
            LookoutError::NotFound { .. } => ErrorKind::NotFound,
            LookoutError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LookoutError::RateLimited { .. } => ErrorKind::RateLimit,
            LookoutError::Upstream { .. } => ErrorKind::Upstream,
            LookoutError::Config(_)
            | LookoutError::HttpClient(_)
            | LookoutError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Returns the call diagnostics, if the error originates from a call.
    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            LookoutError::InvalidInput { context, .. }
            | LookoutError::NotFound { context, .. }
            | LookoutError::Unauthorized { context, .. }
            | LookoutError::RateLimited { context, .. }
            | LookoutError::Upstream { context, .. } => Some(context),
            _ => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            LookoutError::InvalidInput { context, .. }
            | LookoutError::NotFound { context, .. }
            | LookoutError::Unauthorized { context, .. }
            | LookoutError::RateLimited { context, .. }
            | LookoutError::Upstream { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Records how many attempts were made before this error was raised.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        if let Some(context) = self.context_mut() {
            context.attempts = attempts;
        }
        self
    }

    /// Returns true if this error is transient and the operation should be retried.
    ///
    /// Retryable errors are rate limiting (HTTP 429), transient upstream
    /// failures (timeouts, network errors, 5xx) and raw transport errors
    /// that are timeouts or connection failures.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            LookoutError::RateLimited { .. } => true,
            LookoutError::Upstream { transient, .. } => *transient,
            LookoutError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Returns true if this is a rate limit error, indicating we should back off.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LookoutError::RateLimited { .. })
    }

    /// Returns the server-suggested delay before retry, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LookoutError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Builds the structured error payload returned to tool callers.
    ///
    /// The payload is sanitized against every secret in `secrets`.
    #[must_use]
    pub fn to_payload(&self, secrets: &[&str]) -> serde_json::Value {
        let message = self.sanitized_display(secrets);

        let mut payload = serde_json::json!({
            "error": self.kind().as_str(),
            "message": message,
        });

        if let Some(context) = self.context() {
            payload["correlation_id"] = serde_json::json!(context.correlation_id);
            payload["method"] = serde_json::json!(context.method);
            payload["endpoint"] = serde_json::json!(context.endpoint);
            payload["attempts"] = serde_json::json!(context.attempts);
            if let Some(suggestion) = &context.suggestion {
                payload["suggestion"] = serde_json::json!(suggestion);
            }
        }

        match self {
            LookoutError::InvalidInput { field_errors, .. } if !field_errors.is_empty() => {
                payload["field_errors"] = serde_json::json!(field_errors);
            }
            LookoutError::RateLimited {
                retry_after: Some(delay),
                ..
            } => {
                payload["retry_after_seconds"] = serde_json::json!(delay.as_secs());
            }
            _ => {}
        }

        payload
    }

    /// Sanitizes an error message to remove any occurrence of a secret.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to sanitize
    /// * `secret` - The secret to strip from the message
    ///
    /// # Returns
    ///
    /// The message with any occurrence of the secret replaced with `[REDACTED]`
    #[must_use]
    pub fn sanitize_message(message: &str, secret: &str) -> String {
        if secret.is_empty() {
            return message.to_string();
        }
        message.replace(secret, "[REDACTED]")
    }

    /// Creates a version of this error's display message with every secret stripped.
    #[must_use]
    pub fn sanitized_display(&self, secrets: &[&str]) -> String {
        secrets
            .iter()
            .fold(self.to_string(), |msg, secret| Self::sanitize_message(&msg, secret))
    }
}
