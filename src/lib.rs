//! # Content Gateway
//!
//! A read-only content gateway that sits between a headless CMS and web
//! frontends. It fetches articles and pages from the CMS (or from static
//! Markdown files), normalizes them into stable typed shapes, and serves them
//! over HTTP wrapped in a uniform success/error envelope.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │  CMS (HTTP) │──▶│   Upstream   │──▶│ Normalizer │──┐
//! └─────────────┘   │ timeout+retry│   └────────────┘  │   ┌─────────┐   ┌──────────┐
//!                   └──────────────┘                   ├──▶│ Service │──▶│   HTTP   │
//! ┌─────────────┐                                      │   │ (merge) │   │ envelope │
//! │ Static .md  │──────────────────────────────────────┘   └─────────┘   └──────────┘
//! └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! content-gateway --config ./config/gateway.toml check
//! content-gateway --config ./config/gateway.toml articles
//! content-gateway --config ./config/gateway.toml serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Error taxonomy (`GatewayError`, `ErrorCode`) |
//! | [`envelope`] | Success/error response envelope |
//! | [`models`] | Normalized article, page, and rich-text types |
//! | [`normalize`] | Raw document → normalized model |
//! | [`upstream`] | CMS query client with timeout and retry |
//! | [`provider`] | `ContentProvider` trait and backend selection |
//! | [`cms`] | CMS-backed provider |
//! | [`static_source`] | Markdown-backed provider |
//! | [`merge`] | Source modes and slug-keyed merging |
//! | [`service`] | Per-content-type source routing |
//! | [`server`] | HTTP routes |

pub mod cms;
pub mod config;
pub mod envelope;
pub mod error;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod provider;
pub mod server;
pub mod service;
pub mod static_source;
pub mod upstream;
