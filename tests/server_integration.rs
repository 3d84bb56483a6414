//! HTTP routes end to end: a real listener, in-memory providers, reqwest.

use async_trait::async_trait;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

use content_gateway::error::{GatewayError, GatewayResult};
use content_gateway::merge::SourceMode;
use content_gateway::models::{Article, Page};
use content_gateway::provider::ContentProvider;
use content_gateway::server::build_router;
use content_gateway::service::ContentService;
use content_gateway::static_source::StaticProvider;

fn article(slug: &str, date: &str, title: &str) -> Article {
    Article {
        slug: slug.to_string(),
        title: title.to_string(),
        subheading: None,
        excerpt: None,
        published_at: date.to_string(),
        updated_at: None,
        tags: Some(vec!["news".to_string()]),
        cover_image: None,
        seo: None,
        body: Vec::new(),
    }
}

fn page(slug: &str) -> Page {
    Page {
        slug: slug.to_string(),
        title: slug.to_uppercase(),
        subheading: None,
        intro: None,
        updated_at: None,
        cover_image: None,
        seo: None,
        body: Vec::new(),
    }
}

/// Stands in for the CMS: serves fixed articles, or fails every call.
struct FakeCms {
    articles: Vec<Article>,
    failure: Option<GatewayError>,
}

impl FakeCms {
    fn check(&self) -> GatewayResult<()> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContentProvider for FakeCms {
    fn name(&self) -> &str {
        "cms"
    }

    async fn list_articles(&self) -> GatewayResult<Vec<Article>> {
        self.check()?;
        Ok(self.articles.clone())
    }

    async fn get_article(&self, slug: &str) -> GatewayResult<Option<Article>> {
        self.check()?;
        Ok(self.articles.iter().find(|a| a.slug == slug).cloned())
    }

    async fn list_pages(&self) -> GatewayResult<Vec<Page>> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn get_page(&self, _slug: &str) -> GatewayResult<Option<Page>> {
        self.check()?;
        Ok(None)
    }
}

fn static_provider() -> Arc<dyn ContentProvider> {
    Arc::new(StaticProvider::from_documents(
        vec![
            article("a", "2024-05-01", "MDX"),
            article("b", "2025-03-01", "B"),
        ],
        vec![page("about")],
    ))
}

async fn start(service: ContentService) -> SocketAddr {
    let app = build_router(Arc::new(service));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

fn merged_service(failure: Option<GatewayError>) -> ContentService {
    let cms = Arc::new(FakeCms {
        articles: vec![article("a", "2025-01-15", "Sanity")],
        failure,
    });
    ContentService::new(cms, static_provider(), SourceMode::Merged, SourceMode::Static)
}

#[tokio::test]
async fn test_list_articles_merged_envelope() {
    let addr = start(merged_service(None)).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/v1/content/articles", addr))
        .header("x-correlation-id", "corr-42")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-correlation-id"], "corr-42");
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.headers()["x-cache-tags"], "articles");

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["meta"]["correlationId"], "corr-42");
    let data = body["data"].as_array().unwrap();
    let slugs: Vec<&str> = data.iter().map(|a| a["slug"].as_str().unwrap()).collect();
    assert_eq!(slugs, vec!["b", "a"]);
    assert_eq!(data[1]["title"], "Sanity");
    assert_eq!(data[1]["publishedAt"], "2025-01-15");
}

#[tokio::test]
async fn test_article_detail_headers() {
    let addr = start(merged_service(None)).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/v1/content/articles/b", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache-tags"], "articles,article:b");
    assert_eq!(
        resp.headers()["cache-control"],
        "public, s-maxage=60, stale-while-revalidate=60"
    );
    let generated = resp.headers()["x-correlation-id"].to_str().unwrap().to_string();
    assert!(!generated.is_empty());

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["title"], "B");
    assert_eq!(body["meta"]["correlationId"], generated.as_str());
}

#[tokio::test]
async fn test_missing_article_is_not_found() {
    let addr = start(merged_service(None)).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/v1/content/articles/nope", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    assert_eq!(resp.headers()["cache-control"], "no-store");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_upstream_timeout_maps_to_504() {
    let failure = GatewayError::upstream_timeout("CMS did not respond in time");
    let addr = start(merged_service(Some(failure))).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/v1/content/articles", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 504);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UPSTREAM_TIMEOUT");
    assert_eq!(body["error"]["message"], "CMS did not respond in time");
}

#[tokio::test]
async fn test_pages_follow_their_own_mode() {
    // Pages are static-only here, so a failing CMS does not affect them.
    let failure = GatewayError::upstream_error(502, "down");
    let addr = start(merged_service(Some(failure))).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/v1/content/pages/about", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache-tags"], "pages,page:about");

    let resp = client
        .get(format!("http://{}/v1/content/pages", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache-tags"], "pages");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["slug"], "about");
}

#[tokio::test]
async fn test_health_and_unknown_route() {
    let addr = start(merged_service(None)).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "cms");

    let resp = client
        .get(format!("http://{}/v2/unknown", addr))
        .header("x-request-id", "req-7")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["meta"]["requestId"], "req-7");
}
