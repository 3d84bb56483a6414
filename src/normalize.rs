//! Document normalizer.
//!
//! Turns untrusted, duck-typed CMS JSON into the canonical types in
//! [`crate::models`]. Every function here is total: malformed input degrades
//! to omission (`None`, a dropped block, an absent field), never to a panic
//! or an error.
//!
//! # Rules
//!
//! - Required fields (`title`, `slug`, and for articles a parseable
//!   `publishedAt`/`date`) must be non-blank after trimming, otherwise the
//!   whole document is rejected.
//! - Optional strings are trimmed; blank becomes absent.
//! - `tags` accepts strings or `{ "title": ... }` objects, trimmed and
//!   deduplicated; an empty result is omitted.
//! - Image dimensions must be finite and positive.
//! - Portable text is walked block by block; anything without a known
//!   `_type` or its required shape is dropped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::models::{
    Article, ContentDocument, ContentKind, CoverImage, ImageAsset, ImageBlock, MarkDef, Page,
    PortableTextBlock, Seo, Span, TextBlock,
};

type Object = Map<String, Value>;

// ============ Documents ============

pub fn normalize_article(raw: &Value) -> Option<Article> {
    let obj = raw.as_object()?;
    let title = trimmed(obj.get("title"))?;
    let slug = normalize_slug(obj.get("slug"))?;
    let published_at = first_trimmed(obj, &["publishedAt", "date"])?;
    parse_date(&published_at)?;

    Some(Article {
        slug,
        title,
        subheading: trimmed(obj.get("subheading")),
        excerpt: first_trimmed(obj, &["excerpt", "intro", "description"]),
        published_at,
        updated_at: first_trimmed(obj, &["updatedAt", "_updatedAt"]),
        tags: obj.get("tags").and_then(normalize_tags),
        cover_image: first_image(obj, &["coverImage", "mainImage", "image"]),
        seo: obj.get("seo").and_then(normalize_seo),
        body: obj
            .get("body")
            .map(normalize_portable_text)
            .unwrap_or_default(),
    })
}

pub fn normalize_page(raw: &Value) -> Option<Page> {
    let obj = raw.as_object()?;
    let title = trimmed(obj.get("title"))?;
    let slug = normalize_slug(obj.get("slug"))?;

    Some(Page {
        slug,
        title,
        subheading: trimmed(obj.get("subheading")),
        intro: first_trimmed(obj, &["intro", "excerpt", "description"]),
        updated_at: first_trimmed(obj, &["updatedAt", "_updatedAt"]),
        cover_image: first_image(obj, &["coverImage", "mainImage", "image"]),
        seo: obj.get("seo").and_then(normalize_seo),
        body: obj
            .get("body")
            .map(normalize_portable_text)
            .unwrap_or_default(),
    })
}

pub fn normalize_document(kind: ContentKind, raw: &Value) -> Option<ContentDocument> {
    match kind {
        ContentKind::Article => normalize_article(raw).map(ContentDocument::Article),
        ContentKind::Page => normalize_page(raw).map(ContentDocument::Page),
    }
}

/// Normalizes a list of raw articles, dropping unusable entries and
/// repeated slugs (first occurrence wins).
pub fn normalize_articles(raw: &[Value]) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for (index, item) in raw.iter().enumerate() {
        match normalize_article(item) {
            Some(article) if seen.insert(article.slug.clone()) => out.push(article),
            Some(article) => {
                tracing::debug!(slug = %article.slug, index, "dropping duplicate article slug");
            }
            None => {
                tracing::debug!(index, slug = ?raw_slug(item), "dropping unusable article");
            }
        }
    }
    out
}

pub fn normalize_pages(raw: &[Value]) -> Vec<Page> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for (index, item) in raw.iter().enumerate() {
        match normalize_page(item) {
            Some(page) if seen.insert(page.slug.clone()) => out.push(page),
            Some(page) => {
                tracing::debug!(slug = %page.slug, index, "dropping duplicate page slug");
            }
            None => {
                tracing::debug!(index, slug = ?raw_slug(item), "dropping unusable page");
            }
        }
    }
    out
}

fn raw_slug(raw: &Value) -> Option<String> {
    normalize_slug(raw.get("slug"))
}

// ============ Scalars ============

/// Accepts a plain string or a CMS slug object (`{ "current": "..." }`).
pub fn normalize_slug(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::Object(obj) => trimmed(obj.get("current")),
        other => trimmed(Some(other)),
    }
}

/// Tags from plain strings or `{ "title": ... }` objects.
///
/// Idempotent: feeding the output back in yields the same list.
pub fn normalize_tags(raw: &Value) -> Option<Vec<String>> {
    let items = raw.as_array()?;
    let mut seen = HashSet::new();
    let tags: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(_) => trimmed(Some(item)),
            Value::Object(obj) => trimmed(obj.get("title")),
            _ => None,
        })
        .filter(|tag| seen.insert(tag.clone()))
        .collect();

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// Parses the date formats CMS and front matter produce: RFC 3339,
/// `YYYY-MM-DDTHH:MM:SS[.fff]`, and `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn trimmed(raw: Option<&Value>) -> Option<String> {
    raw?.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_trimmed(obj: &Object, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| trimmed(obj.get(*key)))
}

/// Finite, positive dimension rounded to the nearest pixel.
fn dimension(raw: Option<&Value>) -> Option<u32> {
    let n = raw?.as_f64()?;
    if !n.is_finite() || n <= 0.0 {
        return None;
    }
    let rounded = n.round();
    if rounded < 1.0 || rounded > f64::from(u32::MAX) {
        return None;
    }
    Some(rounded as u32)
}

// ============ Images ============

pub fn normalize_image(raw: &Value) -> Option<CoverImage> {
    if raw.is_string() {
        return trimmed(Some(raw)).map(|url| CoverImage {
            url,
            width: None,
            height: None,
            alt: None,
        });
    }

    let obj = raw.as_object()?;
    let asset = obj.get("asset").and_then(Value::as_object);
    let url = trimmed(obj.get("url")).or_else(|| asset.and_then(|a| trimmed(a.get("url"))))?;
    let (width, height) = image_dimensions(obj, asset);

    Some(CoverImage {
        url,
        width,
        height,
        alt: trimmed(obj.get("alt")),
    })
}

fn first_image(obj: &Object, keys: &[&str]) -> Option<CoverImage> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(normalize_image))
}

/// Dimensions from the node itself, its asset, or the asset's
/// `metadata.dimensions`.
fn image_dimensions(obj: &Object, asset: Option<&Object>) -> (Option<u32>, Option<u32>) {
    let pick = |field: &str| {
        dimension(obj.get(field))
            .or_else(|| asset.and_then(|a| dimension(a.get(field))))
            .or_else(|| {
                asset
                    .and_then(|a| a.get("metadata"))
                    .and_then(|m| m.get("dimensions"))
                    .and_then(|d| dimension(d.get(field)))
            })
    };
    (pick("width"), pick("height"))
}

fn normalize_seo(raw: &Value) -> Option<Seo> {
    let obj = raw.as_object()?;
    let seo = Seo {
        title: first_trimmed(obj, &["title", "metaTitle"]),
        description: first_trimmed(obj, &["description", "metaDescription"]),
        image_url: trimmed(obj.get("imageUrl"))
            .or_else(|| obj.get("image").and_then(normalize_image).map(|i| i.url)),
        no_index: obj.get("noIndex").and_then(Value::as_bool),
    };
    if seo.is_empty() {
        None
    } else {
        Some(seo)
    }
}

// ============ Portable text ============

/// Normalizes a portable-text array, keeping valid blocks in their original
/// relative order. Non-array input yields an empty body.
pub fn normalize_portable_text(raw: &Value) -> Vec<PortableTextBlock> {
    match raw.as_array() {
        Some(items) => items.iter().filter_map(normalize_block).collect(),
        None => Vec::new(),
    }
}

fn normalize_block(raw: &Value) -> Option<PortableTextBlock> {
    let obj = raw.as_object()?;
    match obj.get("_type")?.as_str()? {
        "block" => normalize_text_block(obj).map(PortableTextBlock::Text),
        "image" => normalize_image_block(obj).map(PortableTextBlock::Image),
        _ => None,
    }
}

fn normalize_text_block(obj: &Object) -> Option<TextBlock> {
    let children: Vec<Span> = obj
        .get("children")?
        .as_array()?
        .iter()
        .filter_map(normalize_span)
        .collect();
    if children.is_empty() {
        return None;
    }

    let mark_defs = obj
        .get("markDefs")
        .and_then(Value::as_array)
        .map(|defs| defs.iter().filter_map(normalize_mark_def).collect())
        .unwrap_or_default();

    Some(TextBlock {
        key: trimmed(obj.get("_key")),
        style: trimmed(obj.get("style")),
        list_item: trimmed(obj.get("listItem")),
        level: obj
            .get("level")
            .and_then(Value::as_u64)
            .filter(|l| *l > 0)
            .and_then(|l| u32::try_from(l).ok()),
        children,
        mark_defs,
    })
}

fn normalize_span(raw: &Value) -> Option<Span> {
    let obj = raw.as_object()?;
    if obj.get("_type")?.as_str()? != "span" {
        return None;
    }
    let text = obj.get("text")?.as_str()?.to_string();
    let marks: Vec<String> = obj
        .get("marks")
        .and_then(Value::as_array)
        .map(|marks| marks.iter().filter_map(|m| trimmed(Some(m))).collect())
        .unwrap_or_default();

    Some(Span {
        key: trimmed(obj.get("_key")),
        text,
        marks: if marks.is_empty() { None } else { Some(marks) },
    })
}

fn normalize_mark_def(raw: &Value) -> Option<MarkDef> {
    let obj = raw.as_object()?;
    Some(MarkDef {
        key: trimmed(obj.get("_key"))?,
        mark_type: trimmed(obj.get("_type"))?,
        href: trimmed(obj.get("href")),
    })
}

fn normalize_image_block(obj: &Object) -> Option<ImageBlock> {
    let asset = obj.get("asset").and_then(Value::as_object);
    let url = asset
        .and_then(|a| trimmed(a.get("url")))
        .or_else(|| trimmed(obj.get("url")))?;
    let (width, height) = image_dimensions(obj, asset);

    Some(ImageBlock {
        key: trimmed(obj.get("_key")),
        asset: ImageAsset { url, width, height },
        alt: trimmed(obj.get("alt")),
    })
}
