//! Gateway configuration.
//!
//! Configuration is read once at startup from an optional TOML file, then
//! environment overrides are applied on top. The resulting [`Config`] is
//! immutable and shared by reference for the rest of the process lifetime.
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:4000"
//!
//! [runtime]
//! environment = "production"
//!
//! [provider]
//! backend = "cms"
//!
//! [cms]
//! project_id = "abc123"
//! dataset = "production"
//! api_version = "2024-01-01"
//! use_cdn = true
//!
//! [resilience]
//! request_timeout_ms = 5000
//! max_retries = 2
//! retry_delay_ms = 250
//!
//! [sources.articles]
//! mode = "merged"
//!
//! [static_content]
//! root = "./content"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub cms: CmsConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub static_content: StaticContentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

/// Which content backend the deployment asks for.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Static,
    #[default]
    #[serde(alias = "sanity")]
    Cms,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Static => "static",
            Backend::Cms => "cms",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Backend::Static),
            "cms" | "sanity" => Ok(Backend::Cms),
            other => bail!("Unknown content provider: '{}'. Must be static or cms.", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProviderSection {
    #[serde(default)]
    pub backend: Backend,
}

/// Connection parameters for the upstream CMS query API.
#[derive(Debug, Deserialize, Clone)]
pub struct CmsConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_use_cdn")]
    pub use_cdn: bool,
    /// Replaces the project-derived host, e.g. for a local mock.
    #[serde(default)]
    pub api_host: Option<String>,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset: None,
            api_version: default_api_version(),
            token: None,
            use_cdn: default_use_cdn(),
            api_host: None,
        }
    }
}

fn default_api_version() -> String {
    "2024-01-01".to_string()
}
fn default_use_cdn() -> bool {
    true
}

impl CmsConfig {
    /// Project and dataset, when both are present and non-blank.
    pub fn connection_ids(&self) -> Option<(&str, &str)> {
        let project = non_blank(self.project_id.as_deref())?;
        let dataset = non_blank(self.dataset.as_deref())?;
        Some((project, dataset))
    }

    pub fn read_token(&self) -> Option<&str> {
        non_blank(self.token.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    250
}

impl ResilienceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Source-mode settings for one content type.
///
/// `mode` is kept as the raw string so unrecognized values can fall through
/// to `cms_enabled` during resolution.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceSettings {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub cms_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub articles: SourceSettings,
    #[serde(default)]
    pub pages: SourceSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StaticContentConfig {
    #[serde(default = "default_static_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for StaticContentConfig {
    fn default() -> Self {
        Self {
            root: default_static_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_static_root() -> PathBuf {
    PathBuf::from("./content")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}

/// The resolved provider settings: requested backend, CMS connection, and
/// resilience tuning. Built once from [`Config`] and never mutated.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub backend: Backend,
    pub cms: CmsConfig,
    pub resilience: ResilienceConfig,
}

impl Config {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            backend: self.provider.backend,
            cms: self.cms.clone(),
            resilience: self.resilience.clone(),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self.runtime.environment.trim().to_ascii_lowercase().as_str(),
            "production" | "prod"
        )
    }
}

/// Loads the configuration file (when given), applies environment
/// overrides from the process environment, and validates the result.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            parse_config(&content)?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Applies environment overrides through `lookup`. Blank values are treated
/// as unset.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get("GATEWAY_BIND") {
        config.server.bind = v;
    }
    if let Some(v) = get("GATEWAY_LOG") {
        config.server.log_level = v;
    }
    if let Some(v) = get("GATEWAY_ENV") {
        config.runtime.environment = v;
    }
    if let Some(v) = get("CONTENT_PROVIDER") {
        config.provider.backend = v.parse()?;
    }

    if let Some(v) = get("CMS_PROJECT_ID") {
        config.cms.project_id = Some(v);
    }
    if let Some(v) = get("CMS_DATASET") {
        config.cms.dataset = Some(v);
    }
    if let Some(v) = get("CMS_API_VERSION") {
        config.cms.api_version = v;
    }
    if let Some(v) = get("CMS_READ_TOKEN") {
        config.cms.token = Some(v);
    }
    if let Some(v) = get("CMS_USE_CDN") {
        config.cms.use_cdn = parse_bool("CMS_USE_CDN", &v)?;
    }
    if let Some(v) = get("CMS_API_HOST") {
        config.cms.api_host = Some(v);
    }

    if let Some(v) = get("CMS_REQUEST_TIMEOUT_MS") {
        config.resilience.request_timeout_ms = parse_number("CMS_REQUEST_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = get("CMS_MAX_RETRIES") {
        config.resilience.max_retries = parse_number("CMS_MAX_RETRIES", &v)?;
    }
    if let Some(v) = get("CMS_RETRY_DELAY_MS") {
        config.resilience.retry_delay_ms = parse_number("CMS_RETRY_DELAY_MS", &v)?;
    }

    if let Some(v) = get("ARTICLES_SOURCE_MODE") {
        config.sources.articles.mode = Some(v);
    }
    if let Some(v) = get("ARTICLES_CMS_ENABLED") {
        config.sources.articles.cms_enabled = Some(parse_bool("ARTICLES_CMS_ENABLED", &v)?);
    }
    if let Some(v) = get("PAGES_SOURCE_MODE") {
        config.sources.pages.mode = Some(v);
    }
    if let Some(v) = get("PAGES_CMS_ENABLED") {
        config.sources.pages.cms_enabled = Some(parse_bool("PAGES_CMS_ENABLED", &v)?);
    }

    if let Some(v) = get("STATIC_CONTENT_ROOT") {
        config.static_content.root = PathBuf::from(v);
    }

    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{} must be a boolean, got '{}'", key, value),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got '{}'", key, value))
}

fn validate(config: &Config) -> Result<()> {
    if config.resilience.request_timeout_ms == 0 {
        bail!("resilience.request_timeout_ms must be > 0");
    }
    if config.cms.api_version.trim().is_empty() {
        bail!("cms.api_version must not be empty");
    }
    if config.server.bind.trim().is_empty() {
        bail!("server.bind must not be empty");
    }
    Ok(())
}
