//! # Content Gateway CLI (`content-gateway`)
//!
//! Starts the HTTP gateway or runs one-off content queries from the shell.
//!
//! ## Usage
//!
//! ```bash
//! content-gateway --config ./config/gateway.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `content-gateway serve` | Start the HTTP gateway |
//! | `content-gateway articles [SLUG]` | Print all articles, or one article |
//! | `content-gateway pages [SLUG]` | Print all pages, or one page |
//! | `content-gateway check` | Validate configuration and show provider selection |
//!
//! Query commands print the same JSON envelope the HTTP routes return.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use content_gateway::config::{self, Config};
use content_gateway::envelope::{RequestContext, ResponseEnvelope};
use content_gateway::error::{GatewayError, GatewayResult};
use content_gateway::server;
use content_gateway::service::ContentService;

/// Content Gateway: normalized CMS content behind a uniform JSON envelope.
///
/// Configuration is read from an optional TOML file and then overridden by
/// environment variables (`CMS_PROJECT_ID`, `CONTENT_PROVIDER`, ...).
#[derive(Parser)]
#[command(name = "content-gateway", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Defaults and environment
    /// variables are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print articles as a JSON envelope.
    Articles {
        /// Fetch a single article by slug.
        slug: Option<String>,
    },

    /// Print pages as a JSON envelope.
    Pages {
        /// Fetch a single page by slug.
        slug: Option<String>,
    },

    /// Validate configuration and report which provider would serve content.
    Check,
}

fn init_tracing(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.server.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_envelope<T: Serialize>(result: GatewayResult<T>) -> anyhow::Result<()> {
    let ctx = RequestContext::new(
        uuid::Uuid::new_v4().to_string(),
        uuid::Uuid::new_v4().to_string(),
    );
    let failed = result.as_ref().err().map(|e| e.to_string());
    let envelope = ResponseEnvelope::from_result(result, &ctx);
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    match failed {
        Some(message) => anyhow::bail!(message),
        None => Ok(()),
    }
}

fn require<T>(found: Option<T>, what: &str, slug: &str) -> GatewayResult<T> {
    found.ok_or_else(|| GatewayError::not_found(format!("no {} with slug '{}'", what, slug)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;
    init_tracing(&cfg);

    let is_production = cfg.is_production();
    let service = ContentService::from_config(&cfg, is_production)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg, Arc::new(service)).await?;
        }
        Commands::Articles { slug: None } => {
            print_envelope(service.list_articles().await)?;
        }
        Commands::Articles { slug: Some(slug) } => {
            let result = service.get_article(&slug).await;
            print_envelope(result.and_then(|found| require(found, "article", &slug)))?;
        }
        Commands::Pages { slug: None } => {
            print_envelope(service.list_pages().await)?;
        }
        Commands::Pages { slug: Some(slug) } => {
            let result = service.get_page(&slug).await;
            print_envelope(result.and_then(|found| require(found, "page", &slug)))?;
        }
        Commands::Check => {
            println!("environment: {}", cfg.runtime.environment);
            println!("requested backend: {}", cfg.provider.backend);
            println!("active provider: {}", service.provider_name());
            if let Some(reason) = service.selection().and_then(|s| s.fallback_reason.as_deref()) {
                println!("fallback: {}", reason);
            }
            println!("articles source: {}", service.article_mode());
            println!("pages source: {}", service.page_mode());
        }
    }

    Ok(())
}
