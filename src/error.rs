//! Gateway error taxonomy.
//!
//! Every failure that crosses the gateway boundary is a [`GatewayError`]
//! carrying a closed [`ErrorCode`], an HTTP status, and a client-safe message.
//! Callers branch on [`GatewayError::code`], never on the message text.
//!
//! | Code | Status | Meaning |
//! |------|--------|---------|
//! | `UPSTREAM_TIMEOUT` | 504 | Every attempt against the CMS timed out |
//! | `UPSTREAM_ERROR` | upstream status or 502 | Terminal non-timeout upstream failure |
//! | `VALIDATION_ERROR` | 500 | Upstream answered with a malformed body |
//! | `NOT_FOUND` | 404 | Detail lookup with no matching slug |
//! | `MISCONFIGURED` | 500 | Content backend cannot be built (fatal in production) |

use serde::{Deserialize, Serialize};
use std::fmt;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Closed set of machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UpstreamTimeout,
    UpstreamError,
    ValidationError,
    NotFound,
    Misconfigured,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ErrorCode::UpstreamError => "UPSTREAM_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Misconfigured => "MISCONFIGURED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure surfaced through the response envelope.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub status_code: u16,
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl GatewayError {
    pub fn new(status_code: u16, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn upstream_timeout(message: impl Into<String>) -> Self {
        Self::new(504, ErrorCode::UpstreamTimeout, message)
    }

    /// Upstream failure with the upstream status passed through.
    ///
    /// Statuses outside the 4xx/5xx range cannot describe a failure and are
    /// mapped to 502.
    pub fn upstream_error(status_code: u16, message: impl Into<String>) -> Self {
        let status = if (400..=599).contains(&status_code) {
            status_code
        } else {
            502
        };
        Self::new(status, ErrorCode::UpstreamError, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(500, ErrorCode::ValidationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, ErrorCode::NotFound, message)
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::new(500, ErrorCode::Misconfigured, message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::UpstreamTimeout
    }
}
