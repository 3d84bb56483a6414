//! Uniform response envelope.
//!
//! Every gateway-facing operation returns either
//!
//! ```json
//! { "success": true, "data": { ... }, "meta": { ... } }
//! ```
//!
//! or
//!
//! ```json
//! { "success": false, "error": { "code": "UPSTREAM_TIMEOUT", "message": "..." }, "meta": { ... } }
//! ```
//!
//! `meta` always carries the correlation id, request id, and an RFC 3339
//! timestamp so failures stay traceable across the gateway boundary.

use chrono::{SecondsFormat, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ErrorCode, GatewayError};

/// Placeholder used when no inbound request context exists.
pub const UNKNOWN_ID: &str = "unknown";

/// Correlation identifiers propagated from the inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: String,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            request_id: request_id.into(),
        }
    }

    /// Builds a context from optional header values, substituting
    /// [`UNKNOWN_ID`] for anything missing or blank.
    pub fn from_optional(correlation_id: Option<&str>, request_id: Option<&str>) -> Self {
        fn pick(value: Option<&str>) -> String {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(UNKNOWN_ID)
                .to_string()
        }
        Self::new(pick(correlation_id), pick(request_id))
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(UNKNOWN_ID, UNKNOWN_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub correlation_id: String,
    pub request_id: String,
    pub timestamp: String,
}

impl Meta {
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            correlation_id: ctx.correlation_id.clone(),
            request_id: ctx.request_id.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Wire shape of an error inside a failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope<T> {
    Success { data: T, meta: Meta },
    Failure { error: ErrorBody, meta: Meta },
}

impl<T> ResponseEnvelope<T> {
    pub fn success(data: T, ctx: &RequestContext) -> Self {
        ResponseEnvelope::Success {
            data,
            meta: Meta::from_context(ctx),
        }
    }

    pub fn failure(error: &GatewayError, ctx: &RequestContext) -> Self {
        ResponseEnvelope::Failure {
            error: ErrorBody::from(error),
            meta: Meta::from_context(ctx),
        }
    }

    pub fn from_result(result: Result<T, GatewayError>, ctx: &RequestContext) -> Self {
        match result {
            Ok(data) => Self::success(data, ctx),
            Err(err) => Self::failure(&err, ctx),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success { .. })
    }

    pub fn meta(&self) -> &Meta {
        match self {
            ResponseEnvelope::Success { meta, .. } | ResponseEnvelope::Failure { meta, .. } => meta,
        }
    }
}

impl<T: Serialize> Serialize for ResponseEnvelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResponseEnvelope", 3)?;
        match self {
            ResponseEnvelope::Success { data, meta } => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
                state.serialize_field("meta", meta)?;
            }
            ResponseEnvelope::Failure { error, meta } => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
                state.serialize_field("meta", meta)?;
            }
        }
        state.end()
    }
}
