//! Content service: routes list and detail requests to the right source(s).
//!
//! | Mode | Lists | Detail |
//! |------|-------|--------|
//! | `cms` | selected provider | selected provider |
//! | `static` | static provider | static provider |
//! | `merged` | selected ∪ static, selected wins | selected, then static |
//!
//! When the selected provider is already the static one (explicit static
//! backend or development fallback), `merged` behaves like `static`.

use std::sync::Arc;

use crate::config::Config;
use crate::error::GatewayResult;
use crate::merge::{merge_articles_by_slug, merge_pages_by_slug, resolve_from_settings, SourceMode};
use crate::models::{Article, Page};
use crate::provider::{build_providers, ContentProvider, Providers, Selection};

pub struct ContentService {
    selected: Arc<dyn ContentProvider>,
    static_content: Arc<dyn ContentProvider>,
    article_mode: SourceMode,
    page_mode: SourceMode,
    selection: Option<Selection>,
}

impl ContentService {
    pub fn new(
        selected: Arc<dyn ContentProvider>,
        static_content: Arc<dyn ContentProvider>,
        article_mode: SourceMode,
        page_mode: SourceMode,
    ) -> Self {
        Self {
            selected,
            static_content,
            article_mode,
            page_mode,
            selection: None,
        }
    }

    /// Builds providers and resolves source modes from `config`. Fails with
    /// `MISCONFIGURED` when selection rejects the configuration.
    pub fn from_config(config: &Config, is_production: bool) -> GatewayResult<Self> {
        let Providers {
            selected,
            static_content,
            selection,
        } = build_providers(config, is_production)?;

        let article_mode = resolve_from_settings(&config.sources.articles);
        let page_mode = resolve_from_settings(&config.sources.pages);
        tracing::info!(articles = %article_mode, pages = %page_mode, "source modes resolved");

        let mut service = Self::new(selected, static_content, article_mode, page_mode);
        service.selection = Some(selection);
        Ok(service)
    }

    pub fn provider_name(&self) -> &str {
        self.selected.name()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn article_mode(&self) -> SourceMode {
        self.article_mode
    }

    pub fn page_mode(&self) -> SourceMode {
        self.page_mode
    }

    fn selected_is_static(&self) -> bool {
        Arc::ptr_eq(&self.selected, &self.static_content) || self.selected.name() == "static"
    }

    fn effective(&self, mode: SourceMode) -> SourceMode {
        if mode == SourceMode::Merged && self.selected_is_static() {
            SourceMode::Static
        } else {
            mode
        }
    }

    pub async fn list_articles(&self) -> GatewayResult<Vec<Article>> {
        match self.effective(self.article_mode) {
            SourceMode::Cms => self.selected.list_articles().await,
            SourceMode::Static => self.static_content.list_articles().await,
            SourceMode::Merged => {
                let primary = self.selected.list_articles().await?;
                let secondary = self.static_content.list_articles().await?;
                Ok(merge_articles_by_slug(primary, secondary))
            }
        }
    }

    pub async fn get_article(&self, slug: &str) -> GatewayResult<Option<Article>> {
        match self.effective(self.article_mode) {
            SourceMode::Cms => self.selected.get_article(slug).await,
            SourceMode::Static => self.static_content.get_article(slug).await,
            SourceMode::Merged => match self.selected.get_article(slug).await? {
                Some(article) => Ok(Some(article)),
                None => self.static_content.get_article(slug).await,
            },
        }
    }

    pub async fn list_pages(&self) -> GatewayResult<Vec<Page>> {
        match self.effective(self.page_mode) {
            SourceMode::Cms => self.selected.list_pages().await,
            SourceMode::Static => self.static_content.list_pages().await,
            SourceMode::Merged => {
                let primary = self.selected.list_pages().await?;
                let secondary = self.static_content.list_pages().await?;
                Ok(merge_pages_by_slug(primary, secondary))
            }
        }
    }

    pub async fn get_page(&self, slug: &str) -> GatewayResult<Option<Page>> {
        match self.effective(self.page_mode) {
            SourceMode::Cms => self.selected.get_page(slug).await,
            SourceMode::Static => self.static_content.get_page(slug).await,
            SourceMode::Merged => match self.selected.get_page(slug).await? {
                Some(page) => Ok(Some(page)),
                None => self.static_content.get_page(slug).await,
            },
        }
    }
}
