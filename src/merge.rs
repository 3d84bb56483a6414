//! Multi-source merge and source-mode resolution.
//!
//! When both the CMS and static files may supply the same logical documents,
//! [`merge_by_slug`] combines them: the primary list wins every slug
//! collision (first writer wins, no field-level merging) and the combined
//! list is re-sorted newest first.
//!
//! [`resolve_source_mode`] decides which of the two sources (or both) serve
//! a content type.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt;

use crate::config::SourceSettings;
use crate::models::{Article, Page};
use crate::normalize::parse_date;

/// Which backend(s) serve a content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Cms,
    Static,
    Merged,
}

impl SourceMode {
    /// Parses a recognized mode name; anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cms" => Some(SourceMode::Cms),
            "static" => Some(SourceMode::Static),
            "merged" => Some(SourceMode::Merged),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Cms => "cms",
            SourceMode::Static => "static",
            SourceMode::Merged => "merged",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution order: a recognized override, then the CMS-enabled flag,
/// then static.
pub fn resolve_source_mode(override_mode: Option<&str>, cms_enabled: Option<bool>) -> SourceMode {
    if let Some(mode) = override_mode.and_then(SourceMode::parse) {
        return mode;
    }
    if let Some(raw) = override_mode {
        tracing::warn!(value = raw, "ignoring unrecognized source mode override");
    }
    match cms_enabled {
        Some(true) => SourceMode::Cms,
        Some(false) | None => SourceMode::Static,
    }
}

pub fn resolve_from_settings(settings: &SourceSettings) -> SourceMode {
    resolve_source_mode(settings.mode.as_deref(), settings.cms_enabled)
}

/// A document that can be deduplicated by slug and ordered by date.
pub trait Mergeable {
    fn slug(&self) -> &str;
    /// Date used for newest-first ordering; `None` sorts last.
    fn sort_date(&self) -> Option<&str>;
}

impl Mergeable for Article {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn sort_date(&self) -> Option<&str> {
        Some(&self.published_at)
    }
}

impl Mergeable for Page {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn sort_date(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }
}

fn date_key<T: Mergeable>(item: &T) -> Option<DateTime<Utc>> {
    item.sort_date().and_then(parse_date)
}

/// Stable newest-first sort; undated entries keep their relative order at
/// the end.
pub fn sort_by_date_desc<T: Mergeable>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by_cached_key(|item| Reverse(date_key(item)));
    items
}

/// Combines `primary` and `secondary` keyed by slug. Primary entries win
/// collisions; secondary only fills slugs primary lacks.
pub fn merge_by_slug<T: Mergeable>(primary: Vec<T>, secondary: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(primary.len() + secondary.len());
    for item in primary.into_iter().chain(secondary) {
        if seen.insert(item.slug().to_string()) {
            merged.push(item);
        }
    }
    sort_by_date_desc(merged)
}

pub fn merge_articles_by_slug(primary: Vec<Article>, secondary: Vec<Article>) -> Vec<Article> {
    merge_by_slug(primary, secondary)
}

pub fn merge_pages_by_slug(primary: Vec<Page>, secondary: Vec<Page>) -> Vec<Page> {
    merge_by_slug(primary, secondary)
}
