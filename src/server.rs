//! HTTP gateway.
//!
//! Exposes the content service as a JSON API. Every response body is a
//! [`ResponseEnvelope`](crate::envelope::ResponseEnvelope).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/v1/content/articles` | All articles, newest first |
//! | `GET`  | `/v1/content/articles/{slug}` | One article |
//! | `GET`  | `/v1/content/pages` | All pages |
//! | `GET`  | `/v1/content/pages/{slug}` | One page |
//! | `GET`  | `/health` | Health check (version and active provider) |
//!
//! # Caching
//!
//! Responses carry revalidation tags in `x-cache-tags` for an external
//! tag-based invalidation mechanism. List routes are tagged `articles` /
//! `pages`; detail routes add `article:<slug>` / `page:<slug>` and a fixed
//! 60 second revalidation window. Error responses are `no-store`.
//!
//! # Correlation
//!
//! `x-correlation-id` and `x-request-id` are taken from the request or
//! generated, copied into every envelope's `meta`, and echoed back as
//! response headers.

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::envelope::{RequestContext, ResponseEnvelope};
use crate::error::{GatewayError, GatewayResult};
use crate::service::ContentService;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CACHE_TAGS_HEADER: &str = "x-cache-tags";

/// Revalidation window for detail routes.
pub const DETAIL_REVALIDATE_SECS: u64 = 60;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    service: Arc<ContentService>,
}

/// Builds the gateway router around an already-constructed service.
pub fn build_router(service: Arc<ContentService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/content/articles", get(handle_list_articles))
        .route("/v1/content/articles/{slug}", get(handle_get_article))
        .route("/v1/content/pages", get(handle_list_pages))
        .route("/v1/content/pages/{slug}", get(handle_get_page))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(middleware::from_fn(correlate))
        .layer(cors)
        .with_state(AppState { service })
}

/// Binds to `[server].bind` and serves until Ctrl+C / SIGTERM.
pub async fn run_server(config: &Config, service: Arc<ContentService>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let provider = service.provider_name().to_string();
    let app = build_router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, provider = %provider, "content gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("content gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ============ Correlation middleware ============

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Attaches a [`RequestContext`] to the request, echoes its ids on the
/// response, and logs the request.
async fn correlate(mut request: Request, next: Next) -> Response {
    let headers = request.headers();
    let correlation_id = header_value(headers, CORRELATION_HEADER)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request_id = header_value(headers, REQUEST_ID_HEADER)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let ctx = RequestContext::new(correlation_id, request_id);

    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;

    for (name, value) in [
        (CORRELATION_HEADER, &ctx.correlation_id),
        (REQUEST_ID_HEADER, &ctx.request_id),
    ] {
        if let Ok(value) = HeaderValue::from_str(value) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(name), value);
        }
    }

    tracing::info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        correlation_id = %ctx.correlation_id,
        request_id = %ctx.request_id,
        "request completed"
    );

    response
}

// ============ Envelope responses ============

/// Cache metadata attached to successful responses.
struct CachePolicy {
    tags: Vec<String>,
    revalidate_secs: Option<u64>,
}

impl CachePolicy {
    fn list(tag: &str) -> Self {
        Self {
            tags: vec![tag.to_string()],
            revalidate_secs: None,
        }
    }

    fn detail(collection: &str, item_prefix: &str, slug: &str) -> Self {
        Self {
            tags: vec![collection.to_string(), format!("{}:{}", item_prefix, slug)],
            revalidate_secs: Some(DETAIL_REVALIDATE_SECS),
        }
    }

    fn apply(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.tags.join(",")) {
            headers.insert(HeaderName::from_static(CACHE_TAGS_HEADER), value);
        }
        if let Some(secs) = self.revalidate_secs {
            let directive = format!("public, s-maxage={}, stale-while-revalidate={}", secs, secs);
            if let Ok(value) = HeaderValue::from_str(&directive) {
                headers.insert(header::CACHE_CONTROL, value);
            }
        }
    }
}

fn respond<T: Serialize>(result: GatewayResult<T>, ctx: &RequestContext, cache: CachePolicy) -> Response {
    match result {
        Ok(data) => {
            let mut response = Json(ResponseEnvelope::success(data, ctx)).into_response();
            cache.apply(response.headers_mut());
            response
        }
        Err(err) => error_response(&err, ctx),
    }
}

fn error_response(err: &GatewayError, ctx: &RequestContext) -> Response {
    let status = StatusCode::from_u16(err.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::warn!(
            code = %err.code,
            status = err.status_code,
            correlation_id = %ctx.correlation_id,
            message = %err.message,
            "request failed"
        );
    }
    let envelope: ResponseEnvelope<()> = ResponseEnvelope::failure(err, ctx);
    (
        status,
        [(header::CACHE_CONTROL, "no-store")],
        Json(envelope),
    )
        .into_response()
}

// ============ Handlers ============

async fn handle_list_articles(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let result = state.service.list_articles().await;
    respond(result, &ctx, CachePolicy::list("articles"))
}

async fn handle_get_article(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(slug): Path<String>,
) -> Response {
    let slug = slug.trim().to_string();
    let result = state.service.get_article(&slug).await.and_then(|article| {
        article.ok_or_else(|| GatewayError::not_found(format!("no article with slug '{}'", slug)))
    });
    respond(result, &ctx, CachePolicy::detail("articles", "article", &slug))
}

async fn handle_list_pages(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let result = state.service.list_pages().await;
    respond(result, &ctx, CachePolicy::list("pages"))
}

async fn handle_get_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(slug): Path<String>,
) -> Response {
    let slug = slug.trim().to_string();
    let result = state.service.get_page(&slug).await.and_then(|page| {
        page.ok_or_else(|| GatewayError::not_found(format!("no page with slug '{}'", slug)))
    });
    respond(result, &ctx, CachePolicy::detail("pages", "page", &slug))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.service.provider_name().to_string(),
    })
}

async fn handle_not_found(Extension(ctx): Extension<RequestContext>, request: Request) -> Response {
    let err = GatewayError::not_found(format!("no route for {}", request.uri().path()));
    error_response(&err, &ctx)
}
