//! Content providers and the backend selection policy.
//!
//! A [`ContentProvider`] serves articles and pages from one backend. Two
//! implementations ship with the gateway:
//!
//! - [`CmsProvider`](crate::cms::CmsProvider): the headless CMS query API.
//! - [`StaticProvider`](crate::static_source::StaticProvider): Markdown/MDX
//!   files on disk.
//!
//! # Selection
//!
//! [`select_backend`] decides which one serves requests:
//!
//! 1. `backend = "static"` → static.
//! 2. `backend = "cms"` with project id and dataset → CMS.
//! 3. `backend = "cms"` without them → fatal `MISCONFIGURED` in production,
//!    a logged fallback to static everywhere else.
//!
//! Whether the process runs in production is passed in, never read from
//! the environment here.

use async_trait::async_trait;
use std::sync::Arc;

use crate::cms::CmsProvider;
use crate::config::{Backend, Config, ProviderConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::models::{Article, Page};
use crate::static_source::StaticProvider;

/// A backend that serves normalized content.
///
/// List operations return documents that already passed normalization;
/// detail operations return `Ok(None)` when no document matches the slug.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Backend name (`"cms"` or `"static"`).
    fn name(&self) -> &str;

    async fn list_articles(&self) -> GatewayResult<Vec<Article>>;

    async fn get_article(&self, slug: &str) -> GatewayResult<Option<Article>>;

    async fn list_pages(&self) -> GatewayResult<Vec<Page>>;

    async fn get_page(&self, slug: &str) -> GatewayResult<Option<Page>>;
}

/// Outcome of the selection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub backend: Backend,
    /// Set when the CMS was requested but the static backend was chosen.
    pub fallback_reason: Option<String>,
}

/// Applies the selection policy to `config`.
pub fn select_backend(config: &ProviderConfig, is_production: bool) -> GatewayResult<Selection> {
    if config.backend == Backend::Static {
        return Ok(Selection {
            backend: Backend::Static,
            fallback_reason: None,
        });
    }

    if config.cms.connection_ids().is_some() {
        return Ok(Selection {
            backend: Backend::Cms,
            fallback_reason: None,
        });
    }

    let missing = missing_connection_fields(config).join(" and ");
    if is_production {
        return Err(GatewayError::misconfigured(format!(
            "CMS backend requested but {} not configured",
            missing
        )));
    }

    let reason = format!("CMS {} not configured", missing);
    tracing::warn!(reason = %reason, "falling back to static content provider");
    Ok(Selection {
        backend: Backend::Static,
        fallback_reason: Some(reason),
    })
}

fn missing_connection_fields(config: &ProviderConfig) -> Vec<&'static str> {
    let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
    let mut missing = Vec::new();
    if blank(&config.cms.project_id) {
        missing.push("project id");
    }
    if blank(&config.cms.dataset) {
        missing.push("dataset");
    }
    missing
}

/// The providers a running gateway needs: the selected one and the static
/// one used for static and merged source modes.
#[derive(Clone)]
pub struct Providers {
    pub selected: Arc<dyn ContentProvider>,
    pub static_content: Arc<dyn ContentProvider>,
    pub selection: Selection,
}

/// Runs selection and builds the providers. Called once at startup.
pub fn build_providers(config: &Config, is_production: bool) -> GatewayResult<Providers> {
    let provider_config = config.provider_config();
    let selection = select_backend(&provider_config, is_production)?;

    let static_content: Arc<dyn ContentProvider> =
        Arc::new(StaticProvider::load(&config.static_content)?);

    let selected: Arc<dyn ContentProvider> = match selection.backend {
        Backend::Cms => Arc::new(CmsProvider::from_config(&provider_config)?),
        Backend::Static => static_content.clone(),
    };

    tracing::info!(
        provider = selected.name(),
        fallback = selection.fallback_reason.is_some(),
        "content provider selected"
    );

    Ok(Providers {
        selected,
        static_content,
        selection,
    })
}
