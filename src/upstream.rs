//! Resilient upstream query client.
//!
//! Executes one logical query against the CMS HTTP query API:
//!
//! ```text
//! GET <base>/v{apiVersion}/data/query/{dataset}?query=...&params=...&perspective=published
//! Authorization: Bearer <token>        (only when a read token is configured)
//! ```
//!
//! # Retry Strategy
//!
//! Each attempt runs under its own timeout; an expired attempt is dropped
//! (which cancels the in-flight request) and counts as a timeout.
//!
//! - Network error or timeout → retry
//! - HTTP 429 or 5xx → retry
//! - Other non-2xx → fail immediately
//! - 2xx with a body-level `error` → fail immediately
//! - 2xx with a malformed body or no `result` → fail immediately (validation)
//! - Body larger than the transport's cap → fail immediately (validation)
//!
//! `max_retries` bounds the *additional* attempts, so at most
//! `max_retries + 1` requests are made, separated by a fixed
//! `retry_delay`. The retry loop is a small state machine
//! ([`RetryState`]) driven by the pure [`classify`] function; transport and
//! sleeping are injected so the policy can be exercised without a network
//! or real timers.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CmsConfig, ProviderConfig};
use crate::error::{GatewayError, GatewayResult};

/// Query parameters, key-sorted so the encoded URL is deterministic.
pub type QueryParams = BTreeMap<String, Value>;

/// Longest slice of an upstream body copied into logs.
const LOG_BODY_LIMIT: usize = 512;

/// Largest upstream response body read into memory.
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

// ============ Transport ============

/// Raw HTTP response as seen by the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Network(String),
    /// The response body exceeded the transport's size cap.
    BodyTooLarge { limit: usize },
}

/// Performs a single HTTP GET. Timeouts are enforced by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, bearer: Option<&str>) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ReqwestTransport {
    pub fn new() -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("content-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::misconfigured(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, bearer: Option<&str>) -> Result<HttpResponse, TransportError> {
        let mut request = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        };

        let mut response = request.send().await.map_err(map_err)?;
        let status = response.status().as_u16();

        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(TransportError::BodyTooLarge { limit });
        }
        // Content-Length is advisory; the cap also applies while reading.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_err)? {
            if body.len() + chunk.len() > limit {
                return Err(TransportError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ============ URL ============

/// Builds the query URL from the CMS connection parameters.
///
/// The base is `api_host` when configured, otherwise the project's CDN or
/// live API host. `params` is JSON-encoded and omitted when empty.
pub fn build_query_url(cms: &CmsConfig, query: &str, params: &QueryParams) -> GatewayResult<Url> {
    let (project, dataset) = cms.connection_ids().ok_or_else(|| {
        GatewayError::misconfigured("CMS project id and dataset must both be configured")
    })?;

    let base = match cms.api_host.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) => host.trim_end_matches('/').to_string(),
        None => {
            let host = if cms.use_cdn { "apicdn" } else { "api" };
            format!("https://{}.{}.sanity.io", project, host)
        }
    };
    let version = cms.api_version.trim().trim_start_matches('v');

    let mut url = Url::parse(&format!("{}/v{}/data/query/{}", base, version, dataset))
        .map_err(|e| GatewayError::misconfigured(format!("invalid CMS query URL: {}", e)))?;

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("query", query);
        if !params.is_empty() {
            let encoded = serde_json::to_string(params).map_err(|e| {
                GatewayError::validation(format!("query parameters are not encodable: {}", e))
            })?;
            pairs.append_pair("params", &encoded);
        }
        pairs.append_pair("perspective", "published");
    }

    Ok(url)
}

// ============ Classification ============

/// What one attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Response(HttpResponse),
    Failed(TransportError),
}

/// Why a retryable attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryCause {
    Timeout,
    Network(String),
    Status(u16),
}

impl RetryCause {
    /// The error reported once the retry budget is exhausted.
    pub fn into_terminal(self, attempts: u32) -> GatewayError {
        match self {
            RetryCause::Timeout => GatewayError::upstream_timeout(format!(
                "CMS did not respond in time after {} attempt(s)",
                attempts
            )),
            RetryCause::Network(_) => GatewayError::upstream_error(
                502,
                format!("CMS was unreachable after {} attempt(s)", attempts),
            ),
            RetryCause::Status(status) => GatewayError::upstream_error(
                status,
                format!("CMS responded with status {} after {} attempt(s)", status, attempts),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Success(Value),
    Retry(RetryCause),
    Fail(GatewayError),
}

/// Decides what an attempt outcome means. Pure: no I/O, no clock.
pub fn classify(outcome: &AttemptOutcome) -> Classification {
    match outcome {
        AttemptOutcome::Failed(TransportError::Timeout) => {
            Classification::Retry(RetryCause::Timeout)
        }
        AttemptOutcome::Failed(TransportError::Network(msg)) => {
            Classification::Retry(RetryCause::Network(msg.clone()))
        }
        AttemptOutcome::Failed(TransportError::BodyTooLarge { limit }) => {
            Classification::Fail(GatewayError::validation(format!(
                "CMS response body exceeds {} bytes",
                limit
            )))
        }
        AttemptOutcome::Response(resp) if resp.status == 429 || resp.status >= 500 => {
            Classification::Retry(RetryCause::Status(resp.status))
        }
        AttemptOutcome::Response(resp) if !(200..300).contains(&resp.status) => {
            Classification::Fail(GatewayError::upstream_error(
                resp.status,
                format!("CMS rejected the query with status {}", resp.status),
            ))
        }
        AttemptOutcome::Response(resp) => classify_body(&resp.body),
    }
}

fn classify_body(body: &str) -> Classification {
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) => {
            return Classification::Fail(GatewayError::validation(
                "CMS returned a response body that is not valid JSON",
            ))
        }
    };

    let Value::Object(mut obj) = json else {
        return Classification::Fail(GatewayError::validation(
            "CMS returned a response body that is not a JSON object",
        ));
    };

    if obj.get("error").is_some_and(|e| !e.is_null()) {
        return Classification::Fail(GatewayError::upstream_error(
            502,
            "CMS reported a query error",
        ));
    }

    match obj.remove("result") {
        Some(result) => Classification::Success(result),
        None => Classification::Fail(GatewayError::validation(
            "CMS response is missing the result field",
        )),
    }
}

// ============ Retry state machine ============

#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    /// About to make attempt number `attempt` (1-based).
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed with a retryable cause; waiting to retry.
    RetryScheduled { attempt: u32, cause: RetryCause },
    Terminal(GatewayResult<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Transition after attempt number `attempt` was classified.
    pub fn after_attempt(&self, attempt: u32, classification: Classification) -> RetryState {
        match classification {
            Classification::Success(value) => RetryState::Terminal(Ok(value)),
            Classification::Fail(err) => RetryState::Terminal(Err(err)),
            Classification::Retry(cause) if attempt < self.total_attempts() => {
                RetryState::RetryScheduled { attempt, cause }
            }
            Classification::Retry(cause) => RetryState::Terminal(Err(cause.into_terminal(attempt))),
        }
    }
}

// ============ Client ============

/// Timeout- and retry-bounded client for the CMS query API.
///
/// Holds no mutable state, so a single instance can serve concurrent
/// requests; every call gets its own retry sequence.
pub struct UpstreamClient {
    cms: CmsConfig,
    policy: RetryPolicy,
    request_timeout: Duration,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl UpstreamClient {
    pub fn new(config: &ProviderConfig) -> GatewayResult<Self> {
        Ok(Self::with_parts(
            config,
            Arc::new(ReqwestTransport::new()?),
            Arc::new(TokioSleeper),
        ))
    }

    pub fn with_parts(
        config: &ProviderConfig,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            cms: config.cms.clone(),
            policy: RetryPolicy {
                max_retries: config.resilience.max_retries,
                retry_delay: config.resilience.retry_delay(),
            },
            request_timeout: config.resilience.request_timeout(),
            transport,
            sleeper,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `query` and returns the response's `result` payload.
    pub async fn fetch(&self, query: &str, params: &QueryParams) -> GatewayResult<Value> {
        let url = build_query_url(&self.cms, query, params)?;
        let bearer = self.cms.read_token();

        let mut state = RetryState::Attempting { attempt: 1 };
        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    let outcome = self.attempt(&url, bearer).await;
                    let classification = classify(&outcome);
                    if let Classification::Fail(err) = &classification {
                        log_failure(&outcome, err, attempt);
                    }
                    self.policy.after_attempt(attempt, classification)
                }
                RetryState::RetryScheduled { attempt, cause } => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.total_attempts(),
                        cause = ?cause,
                        delay_ms = self.policy.retry_delay.as_millis() as u64,
                        "retrying CMS query"
                    );
                    self.sleeper.sleep(self.policy.retry_delay).await;
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Terminal(result) => {
                    if let Err(err) = &result {
                        tracing::warn!(code = %err.code, status = err.status_code, "CMS query failed");
                    }
                    return result;
                }
            };
        }
    }

    async fn attempt(&self, url: &Url, bearer: Option<&str>) -> AttemptOutcome {
        tracing::debug!(path = url.path(), "CMS query attempt");
        match tokio::time::timeout(self.request_timeout, self.transport.get(url, bearer)).await {
            Err(_) => AttemptOutcome::Failed(TransportError::Timeout),
            Ok(Err(e)) => AttemptOutcome::Failed(e),
            Ok(Ok(resp)) => AttemptOutcome::Response(resp),
        }
    }
}

fn log_failure(outcome: &AttemptOutcome, err: &GatewayError, attempt: u32) {
    if let AttemptOutcome::Response(resp) = outcome {
        let body: String = resp.body.chars().take(LOG_BODY_LIMIT).collect();
        tracing::warn!(
            attempt,
            status = resp.status,
            code = %err.code,
            body = %body,
            "CMS query failed without retry"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn cms() -> CmsConfig {
        CmsConfig {
            project_id: Some("proj".into()),
            dataset: Some("production".into()),
            api_version: "2024-01-01".into(),
            token: None,
            use_cdn: true,
            api_host: None,
        }
    }

    fn response(status: u16, body: &str) -> AttemptOutcome {
        AttemptOutcome::Response(HttpResponse {
            status,
            body: body.to_string(),
        })
    }

    #[test]
    fn test_url_is_deterministic() {
        let mut params = QueryParams::new();
        params.insert("slug".into(), json!("hello"));
        params.insert("limit".into(), json!(10));
        let a = build_query_url(&cms(), "*[_type == $t]", &params).unwrap();
        let b = build_query_url(&cms(), "*[_type == $t]", &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.host_str(), Some("proj.apicdn.sanity.io"));
        assert_eq!(a.path(), "/v2024-01-01/data/query/production");

        let pairs: Vec<(String, String)> = a.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("query".into(), "*[_type == $t]".into()));
        assert_eq!(pairs[1], ("params".into(), r#"{"limit":10,"slug":"hello"}"#.into()));
        assert_eq!(pairs[2], ("perspective".into(), "published".into()));
    }

    #[test]
    fn test_url_live_host_and_override() {
        let mut config = cms();
        config.use_cdn = false;
        config.api_version = "v2023-05-03".into();
        let url = build_query_url(&config, "*", &QueryParams::new()).unwrap();
        assert_eq!(url.host_str(), Some("proj.api.sanity.io"));
        assert_eq!(url.path(), "/v2023-05-03/data/query/production");
        assert!(!url.query_pairs().any(|(k, _)| k == "params"));

        config.api_host = Some("http://127.0.0.1:9999/".into());
        let url = build_query_url(&config, "*", &QueryParams::new()).unwrap();
        assert_eq!(url.as_str().split('?').next(), Some("http://127.0.0.1:9999/v2023-05-03/data/query/production"));
    }

    #[test]
    fn test_url_requires_connection_ids() {
        let mut config = cms();
        config.dataset = None;
        let err = build_query_url(&config, "*", &QueryParams::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Misconfigured);
    }

    #[test]
    fn test_classify_retryable() {
        assert_eq!(
            classify(&AttemptOutcome::Failed(TransportError::Timeout)),
            Classification::Retry(RetryCause::Timeout)
        );
        assert_eq!(
            classify(&response(503, "")),
            Classification::Retry(RetryCause::Status(503))
        );
        assert_eq!(
            classify(&response(429, "")),
            Classification::Retry(RetryCause::Status(429))
        );
        assert!(matches!(
            classify(&AttemptOutcome::Failed(TransportError::Network("reset".into()))),
            Classification::Retry(RetryCause::Network(_))
        ));
    }

    #[test]
    fn test_classify_terminal() {
        let Classification::Fail(err) = classify(&response(404, "{}")) else {
            panic!("404 must not be retried");
        };
        assert_eq!(err.code, ErrorCode::UpstreamError);
        assert_eq!(err.status_code, 404);

        let Classification::Fail(err) =
            classify(&response(200, r#"{"error":{"description":"bad groq"}}"#))
        else {
            panic!("body error must not be retried");
        };
        assert_eq!(err.code, ErrorCode::UpstreamError);
        assert!(!err.message.contains("bad groq"));

        let Classification::Fail(err) = classify(&response(200, "<html>")) else {
            panic!("malformed body must fail");
        };
        assert_eq!(err.code, ErrorCode::ValidationError);

        let Classification::Fail(err) = classify(&response(200, r#"{"ms": 3}"#)) else {
            panic!("missing result must fail");
        };
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[test]
    fn test_classify_success_includes_null_result() {
        assert_eq!(
            classify(&response(200, r#"{"result": [1, 2]}"#)),
            Classification::Success(json!([1, 2]))
        );
        assert_eq!(
            classify(&response(200, r#"{"result": null, "error": null}"#)),
            Classification::Success(Value::Null)
        );
    }

    #[test]
    fn test_policy_transitions() {
        let policy = RetryPolicy {
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
        };
        assert_eq!(
            policy.after_attempt(1, Classification::Retry(RetryCause::Timeout)),
            RetryState::RetryScheduled {
                attempt: 1,
                cause: RetryCause::Timeout
            }
        );
        let RetryState::Terminal(Err(err)) =
            policy.after_attempt(2, Classification::Retry(RetryCause::Timeout))
        else {
            panic!("budget exhausted");
        };
        assert_eq!(err.code, ErrorCode::UpstreamTimeout);
        assert_eq!(err.status_code, 504);

        let RetryState::Terminal(Err(err)) =
            policy.after_attempt(2, Classification::Retry(RetryCause::Status(503)))
        else {
            panic!("budget exhausted");
        };
        assert_eq!(err.code, ErrorCode::UpstreamError);
        assert_eq!(err.status_code, 503);

        let zero = RetryPolicy {
            max_retries: 0,
            retry_delay: Duration::ZERO,
        };
        assert!(matches!(
            zero.after_attempt(1, Classification::Retry(RetryCause::Network("x".into()))),
            RetryState::Terminal(Err(_))
        ));
    }

    #[test]
    fn test_classify_oversized_body_fails_without_retry() {
        let outcome = AttemptOutcome::Failed(TransportError::BodyTooLarge { limit: 16 });
        let Classification::Fail(err) = classify(&outcome) else {
            panic!("oversized body must not be retried");
        };
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.status_code, 500);
    }
}
