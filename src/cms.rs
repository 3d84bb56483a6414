//! Headless CMS content provider.
//!
//! Issues GROQ queries through the [`UpstreamClient`] and hands every raw
//! result to the normalizer. Unusable documents are dropped there; only a
//! malformed response *shape* (a list query that does not return an array)
//! is reported as an error.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{Article, Page};
use crate::normalize::{normalize_article, normalize_articles, normalize_page, normalize_pages};
use crate::provider::ContentProvider;
use crate::upstream::{QueryParams, UpstreamClient};

const IMAGE_PROJECTION: &str = r#"{
    alt,
    "url": asset->url,
    "width": asset->metadata.dimensions.width,
    "height": asset->metadata.dimensions.height
  }"#;

const BODY_PROJECTION: &str = r#"body[]{
    ...,
    _type == "image" => {
      ...,
      "asset": asset->{url, "width": metadata.dimensions.width, "height": metadata.dimensions.height}
    }
  }"#;

fn article_projection() -> String {
    format!(
        r#"{{
  title,
  "slug": slug.current,
  subheading,
  excerpt,
  publishedAt,
  _updatedAt,
  "tags": coalesce(tags[]->{{title}}, tags),
  "coverImage": coverImage{image},
  seo,
  {body}
}}"#,
        image = IMAGE_PROJECTION,
        body = BODY_PROJECTION
    )
}

fn page_projection() -> String {
    format!(
        r#"{{
  title,
  "slug": slug.current,
  subheading,
  intro,
  _updatedAt,
  "coverImage": coverImage{image},
  seo,
  {body}
}}"#,
        image = IMAGE_PROJECTION,
        body = BODY_PROJECTION
    )
}

pub fn article_list_query() -> String {
    format!(
        r#"*[_type == "article" && defined(slug.current)] | order(publishedAt desc) {}"#,
        article_projection()
    )
}

pub fn article_detail_query() -> String {
    format!(
        r#"*[_type == "article" && slug.current == $slug][0] {}"#,
        article_projection()
    )
}

pub fn page_list_query() -> String {
    format!(
        r#"*[_type == "page" && defined(slug.current)] | order(title asc) {}"#,
        page_projection()
    )
}

pub fn page_detail_query() -> String {
    format!(
        r#"*[_type == "page" && slug.current == $slug][0] {}"#,
        page_projection()
    )
}

pub struct CmsProvider {
    client: UpstreamClient,
}

impl CmsProvider {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ProviderConfig) -> GatewayResult<Self> {
        Ok(Self::new(UpstreamClient::new(config)?))
    }

    async fn fetch_list(&self, query: &str, what: &str) -> GatewayResult<Vec<Value>> {
        match self.client.fetch(query, &QueryParams::new()).await? {
            Value::Array(items) => Ok(items),
            other => Err(GatewayError::validation(format!(
                "CMS returned {} instead of a list of {}",
                json_kind(&other),
                what
            ))),
        }
    }

    async fn fetch_one(&self, query: &str, slug: &str) -> GatewayResult<Option<Value>> {
        let mut params = QueryParams::new();
        params.insert("slug".to_string(), Value::String(slug.to_string()));
        match self.client.fetch(query, &params).await? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl ContentProvider for CmsProvider {
    fn name(&self) -> &str {
        "cms"
    }

    async fn list_articles(&self) -> GatewayResult<Vec<Article>> {
        let items = self.fetch_list(&article_list_query(), "articles").await?;
        Ok(normalize_articles(&items))
    }

    async fn get_article(&self, slug: &str) -> GatewayResult<Option<Article>> {
        let Some(raw) = self.fetch_one(&article_detail_query(), slug).await? else {
            return Ok(None);
        };
        let article = normalize_article(&raw);
        if article.is_none() {
            tracing::debug!(slug, "CMS article failed normalization");
        }
        Ok(article)
    }

    async fn list_pages(&self) -> GatewayResult<Vec<Page>> {
        let items = self.fetch_list(&page_list_query(), "pages").await?;
        Ok(normalize_pages(&items))
    }

    async fn get_page(&self, slug: &str) -> GatewayResult<Option<Page>> {
        let Some(raw) = self.fetch_one(&page_detail_query(), slug).await? else {
            return Ok(None);
        };
        let page = normalize_page(&raw);
        if page.is_none() {
            tracing::debug!(slug, "CMS page failed normalization");
        }
        Ok(page)
    }
}
