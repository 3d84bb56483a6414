//! Static (Markdown/MDX) content provider.
//!
//! Reads authored files once at startup from two directories under the
//! configured root:
//!
//! ```text
//! content/
//! ├── articles/
//! │   ├── hello-world.md
//! │   └── deep-dive/index.mdx
//! └── pages/
//!     └── about.md
//! ```
//!
//! Each file may start with a YAML front matter block fenced by `---`.
//! Front matter fields use the same names as CMS documents (`title`,
//! `slug`, `date`/`publishedAt`, `tags`, `excerpt`, `coverImage`, `seo`),
//! so every file goes through the same normalizer as CMS content. When
//! `slug` is omitted it is derived from the file stem (or the parent
//! directory for `index.*` files). Files with `draft: true` are skipped.
//!
//! The Markdown body is parsed with `pulldown-cmark` and becomes portable
//! text:
//!
//! - headings (ATX or setext) → `h1`…`h6` blocks
//! - paragraphs → `normal` blocks, `blockquote` inside quotes
//! - list items → `listItem` (`bullet`/`number`) with a 1-based `level`
//! - fenced or indented code → a `code` block
//! - strong, emphasis, strikethrough and inline code → span `marks`
//! - links → a `link` entry in `markDefs` referenced from the span marks
//! - a paragraph holding only an image → an image block
//!
//! In `.mdx` files, top-level `import`/`export` statements are removed
//! before parsing. Raw HTML and JSX components are dropped.

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::StaticContentConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::merge::sort_by_date_desc;
use crate::models::{
    Article, ImageAsset, ImageBlock, MarkDef, Page, PortableTextBlock, Span, TextBlock,
};
use crate::normalize::{normalize_articles, normalize_pages};
use crate::provider::ContentProvider;

/// Content loaded from disk, immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    articles: Vec<Article>,
    pages: Vec<Page>,
}

impl StaticProvider {
    /// Scans `<root>/articles` and `<root>/pages`. Missing directories yield
    /// empty collections; invalid glob patterns are a configuration error.
    pub fn load(config: &StaticContentConfig) -> GatewayResult<Self> {
        let include = build_globset(&config.include_globs)?;
        let mut excludes = vec!["**/node_modules/**".to_string()];
        excludes.extend(config.exclude_globs.iter().cloned());
        let exclude = build_globset(&excludes)?;

        let raw_articles = scan_documents(&config.root.join("articles"), &include, &exclude);
        let raw_pages = scan_documents(&config.root.join("pages"), &include, &exclude);

        let provider = Self::from_documents(
            normalize_articles(&raw_articles),
            normalize_pages(&raw_pages),
        );
        tracing::info!(
            root = %config.root.display(),
            articles = provider.articles.len(),
            pages = provider.pages.len(),
            "static content loaded"
        );
        Ok(provider)
    }

    /// Builds a provider from already-normalized documents.
    pub fn from_documents(articles: Vec<Article>, pages: Vec<Page>) -> Self {
        Self {
            articles: sort_by_date_desc(articles),
            pages: sort_by_date_desc(pages),
        }
    }
}

#[async_trait]
impl ContentProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn list_articles(&self) -> GatewayResult<Vec<Article>> {
        Ok(self.articles.clone())
    }

    async fn get_article(&self, slug: &str) -> GatewayResult<Option<Article>> {
        Ok(self.articles.iter().find(|a| a.slug == slug).cloned())
    }

    async fn list_pages(&self) -> GatewayResult<Vec<Page>> {
        Ok(self.pages.clone())
    }

    async fn get_page(&self, slug: &str) -> GatewayResult<Option<Page>> {
        Ok(self.pages.iter().find(|p| p.slug == slug).cloned())
    }
}

fn build_globset(patterns: &[String]) -> GatewayResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            GatewayError::misconfigured(format!("invalid static content glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| GatewayError::misconfigured(format!("invalid static content globs: {}", e)))
}

/// Walks `dir` and turns every matching file into a raw document value.
/// Unreadable files are skipped with a warning.
fn scan_documents(dir: &Path, include: &GlobSet, exclude: &GlobSet) -> Vec<Value> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "static content directory not found");
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable static content entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let rel_str = rel.to_string_lossy().to_string();
        if exclude.is_match(&rel_str) || !include.is_match(&rel_str) {
            continue;
        }
        files.push(entry.path().to_path_buf());
    }

    // Sort for deterministic ordering
    files.sort();

    files
        .iter()
        .filter_map(|path| match std::fs::read_to_string(path) {
            Ok(content) => parse_document(path, &content),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read static content file");
                None
            }
        })
        .collect()
}

/// Parses one file into the raw document shape the normalizer expects.
/// Returns `None` for drafts and for front matter that is not a mapping.
pub fn parse_document(path: &Path, content: &str) -> Option<Value> {
    let (front_matter, body) = split_front_matter(content);

    let mut doc = match front_matter {
        Some(yaml) if !yaml.trim().is_empty() => match serde_yaml::from_str::<Value>(yaml) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %path.display(), "ignoring file with invalid front matter");
                return None;
            }
        },
        _ => serde_json::Map::new(),
    };

    if doc.get("draft").and_then(Value::as_bool) == Some(true) {
        tracing::debug!(path = %path.display(), "skipping draft");
        return None;
    }

    let has_slug = doc
        .get("slug")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !has_slug {
        if let Some(slug) = slug_from_path(path) {
            doc.insert("slug".to_string(), Value::String(slug));
        }
    }

    let is_mdx = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mdx"));
    let blocks = if is_mdx {
        markdown_to_portable_text(&strip_mdx_esm(body))
    } else {
        markdown_to_portable_text(body)
    };
    let body = serde_json::to_value(&blocks).unwrap_or(Value::Array(Vec::new()));
    doc.insert("body".to_string(), body);

    Some(Value::Object(doc))
}

fn slug_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy().to_string();
    if stem == "index" {
        return path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_string());
    }
    Some(stem)
}

/// Splits a leading `---` fenced front matter block from the body.
pub fn split_front_matter(content: &str) -> (Option<&str>, &str) {
    let content = content.trim_start_matches('\u{feff}');
    let mut lines = content.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {
            let start = first.len();
            let mut offset = start;
            for line in lines {
                if line.trim_end() == "---" {
                    return (Some(&content[start..offset]), &content[offset + line.len()..]);
                }
                offset += line.len();
            }
            (None, content)
        }
        _ => (None, content),
    }
}

/// Converts a Markdown body into portable-text blocks.
pub fn markdown_to_portable_text(markdown: &str) -> Vec<PortableTextBlock> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

    let mut writer = PortableTextWriter::default();
    for event in Parser::new_ext(markdown, options) {
        writer.event(event);
    }
    writer.finish()
}

/// Removes top-level MDX `import`/`export` statements so they never reach
/// the Markdown parser. Fenced code is left untouched, and a statement runs
/// until the next blank line.
pub fn strip_mdx_esm(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut fence: Option<&str> = None;
    let mut in_statement = false;

    for line in source.split_inclusive('\n') {
        let content = line.trim_end_matches(['\r', '\n']);
        if in_statement {
            if content.trim().is_empty() {
                in_statement = false;
                out.push_str(line);
            }
            continue;
        }

        let opener = ["```", "~~~"]
            .into_iter()
            .find(|marker| content.trim_start().starts_with(marker));
        match (fence, opener) {
            (Some(open), Some(marker)) if open == marker => fence = None,
            (None, Some(marker)) => fence = Some(marker),
            (None, None) if is_esm_statement(content) => {
                in_statement = true;
                continue;
            }
            _ => {}
        }
        out.push_str(line);
    }
    out
}

fn is_esm_statement(line: &str) -> bool {
    if let Some(rest) = line.strip_prefix("import ") {
        let rest = rest.trim_start();
        return rest.starts_with('"') || rest.starts_with('\'') || rest.contains(" from ");
    }
    if let Some(rest) = line.strip_prefix("export ") {
        let rest = rest.trim_start();
        return ["const ", "let ", "var ", "function ", "async ", "class ", "default ", "{", "*"]
            .iter()
            .any(|keyword| rest.starts_with(keyword));
    }
    false
}

/// A block still receiving inline content.
#[derive(Default)]
struct PendingBlock {
    style: String,
    list_item: Option<String>,
    level: Option<u32>,
    spans: Vec<Span>,
    mark_defs: Vec<MarkDef>,
    images: Vec<ImageBlock>,
}

/// Folds pulldown-cmark events into portable-text blocks.
#[derive(Default)]
struct PortableTextWriter {
    blocks: Vec<PortableTextBlock>,
    current: Option<PendingBlock>,
    /// Active decorator marks and link keys, innermost last.
    marks: Vec<String>,
    /// `bullet` / `number` per open list.
    lists: Vec<&'static str>,
    quote_depth: usize,
    code: Option<String>,
    /// Destination and alt text of the image being read.
    image: Option<(String, String)>,
    links: usize,
}

impl PortableTextWriter {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Paragraph) => {
                if self.current.is_none() {
                    self.open_paragraph();
                }
            }
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush();
                self.current = Some(PendingBlock {
                    style: format!("h{}", level as u8),
                    ..PendingBlock::default()
                });
            }
            Event::Start(Tag::BlockQuote(_)) => {
                self.flush();
                self.quote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            Event::Start(Tag::CodeBlock(_)) => {
                self.flush();
                self.code = Some(String::new());
            }
            Event::End(TagEnd::CodeBlock) => self.finish_code(),
            Event::Start(Tag::List(start)) => {
                self.flush();
                self.lists.push(if start.is_some() { "number" } else { "bullet" });
            }
            Event::End(TagEnd::List(_)) => {
                self.flush();
                self.lists.pop();
            }
            Event::Start(Tag::Item) => self.open_paragraph(),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => self.flush(),
            Event::Start(Tag::Emphasis) => self.marks.push("em".to_string()),
            Event::Start(Tag::Strong) => self.marks.push("strong".to_string()),
            Event::Start(Tag::Strikethrough) => self.marks.push("strike-through".to_string()),
            Event::Start(Tag::Link { dest_url, .. }) => {
                self.links += 1;
                let key = format!("link{}", self.links);
                self.block_mut().mark_defs.push(MarkDef {
                    key: key.clone(),
                    mark_type: "link".to_string(),
                    href: Some(dest_url.to_string()),
                });
                self.marks.push(key);
            }
            Event::End(TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link) => {
                self.marks.pop();
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                self.image = Some((dest_url.to_string(), String::new()));
            }
            Event::End(TagEnd::Image) => {
                if let Some((url, alt)) = self.image.take() {
                    let alt = alt.trim();
                    let image = ImageBlock {
                        key: None,
                        asset: ImageAsset {
                            url,
                            width: None,
                            height: None,
                        },
                        alt: if alt.is_empty() { None } else { Some(alt.to_string()) },
                    };
                    self.block_mut().images.push(image);
                }
            }
            Event::Text(text) => self.push_text(&text, None),
            Event::Code(code) => self.push_text(&code, Some("code")),
            Event::SoftBreak => self.push_text(" ", None),
            Event::HardBreak => self.push_text("\n", None),
            // Raw HTML and MDX components have no portable-text equivalent.
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<PortableTextBlock> {
        self.flush();
        if self.code.is_some() {
            self.finish_code();
        }
        self.blocks
    }

    fn paragraph_style(&self) -> &'static str {
        if self.quote_depth > 0 {
            "blockquote"
        } else {
            "normal"
        }
    }

    fn open_paragraph(&mut self) {
        self.flush();
        let mut block = PendingBlock {
            style: self.paragraph_style().to_string(),
            ..PendingBlock::default()
        };
        if let Some(kind) = self.lists.last() {
            block.list_item = Some(kind.to_string());
            block.level = u32::try_from(self.lists.len()).ok();
        }
        self.current = Some(block);
    }

    fn block_mut(&mut self) -> &mut PendingBlock {
        if self.current.is_none() {
            self.open_paragraph();
        }
        self.current.get_or_insert_with(PendingBlock::default)
    }

    fn push_text(&mut self, text: &str, extra_mark: Option<&str>) {
        if let Some(code) = self.code.as_mut() {
            code.push_str(text);
            return;
        }
        if let Some((_, alt)) = self.image.as_mut() {
            alt.push_str(text);
            return;
        }

        let mut marks = self.marks.clone();
        marks.extend(extra_mark.map(str::to_string));
        let block = self.block_mut();
        match block.spans.last_mut() {
            Some(last) if last.marks.as_deref().unwrap_or_default() == marks.as_slice() => {
                last.text.push_str(text);
            }
            _ => block.spans.push(Span {
                key: None,
                text: text.to_string(),
                marks: if marks.is_empty() { None } else { Some(marks) },
            }),
        }
    }

    fn next_key(&self) -> String {
        format!("md{}", self.blocks.len())
    }

    fn flush(&mut self) {
        let Some(block) = self.current.take() else {
            return;
        };

        let mut spans = block.spans;
        if let Some(first) = spans.first_mut() {
            first.text = first.text.trim_start().to_string();
        }
        if let Some(last) = spans.last_mut() {
            last.text = last.text.trim_end().to_string();
        }
        spans.retain(|span| !span.text.is_empty());

        if !spans.is_empty() {
            let key = self.next_key();
            for (index, span) in spans.iter_mut().enumerate() {
                span.key = Some(format!("{}s{}", key, index));
            }
            self.blocks.push(PortableTextBlock::Text(TextBlock {
                key: Some(key),
                style: Some(block.style),
                list_item: block.list_item,
                level: block.level,
                children: spans,
                mark_defs: block.mark_defs,
            }));
        }

        for mut image in block.images {
            image.key = Some(self.next_key());
            self.blocks.push(PortableTextBlock::Image(image));
        }
    }

    fn finish_code(&mut self) {
        let Some(code) = self.code.take() else {
            return;
        };
        let text = code.trim_end_matches('\n');
        if text.trim().is_empty() {
            return;
        }
        let key = self.next_key();
        self.blocks.push(PortableTextBlock::Text(TextBlock {
            key: Some(key.clone()),
            style: Some("code".to_string()),
            list_item: None,
            level: None,
            children: vec![Span {
                key: Some(format!("{}s0", key)),
                text: text.to_string(),
                marks: None,
            }],
            mark_defs: Vec::new(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_front_matter() {
        let (fm, body) = split_front_matter("---\ntitle: Hi\n---\nBody text\n");
        assert_eq!(fm, Some("title: Hi\n"));
        assert_eq!(body, "Body text\n");

        let (fm, body) = split_front_matter("No front matter");
        assert_eq!(fm, None);
        assert_eq!(body, "No front matter");

        let (fm, _) = split_front_matter("---\nunterminated: true\n");
        assert_eq!(fm, None);
    }

    fn text_block(block: &PortableTextBlock) -> &TextBlock {
        match block {
            PortableTextBlock::Text(text) => text,
            other => panic!("text block expected, got {:?}", other),
        }
    }

    fn span_summary(block: &TextBlock) -> Vec<(&str, Vec<&str>)> {
        block
            .children
            .iter()
            .map(|span| {
                let marks = span
                    .marks
                    .iter()
                    .flatten()
                    .map(String::as_str)
                    .collect();
                (span.text.as_str(), marks)
            })
            .collect()
    }

    #[test]
    fn test_markdown_blocks() {
        let md = "# Title\n\nFirst line\nsecond line\n\n![A cat](https://img/cat.png)\n\n```rust\nfn main() {}\n\nlet x = 1;\n```\n";
        let blocks = markdown_to_portable_text(md);
        assert_eq!(blocks.len(), 4);

        let h = text_block(&blocks[0]);
        assert_eq!(h.style.as_deref(), Some("h1"));
        assert_eq!(h.children[0].text, "Title");
        assert_eq!(h.key.as_deref(), Some("md0"));

        let p = text_block(&blocks[1]);
        assert_eq!(p.style.as_deref(), Some("normal"));
        assert_eq!(p.children[0].text, "First line second line");

        let PortableTextBlock::Image(img) = &blocks[2] else {
            panic!("image expected");
        };
        assert_eq!(img.asset.url, "https://img/cat.png");
        assert_eq!(img.alt.as_deref(), Some("A cat"));

        let code = text_block(&blocks[3]);
        assert_eq!(code.style.as_deref(), Some("code"));
        assert_eq!(code.children[0].text, "fn main() {}\n\nlet x = 1;");
    }

    #[test]
    fn test_inline_marks_and_links() {
        let blocks =
            markdown_to_portable_text("Some **bold** and [a link](https://x.dev), *em* `code`.\n");
        assert_eq!(blocks.len(), 1);

        let p = text_block(&blocks[0]);
        assert_eq!(
            span_summary(p),
            vec![
                ("Some ", vec![]),
                ("bold", vec!["strong"]),
                (" and ", vec![]),
                ("a link", vec!["link1"]),
                (", ", vec![]),
                ("em", vec!["em"]),
                (" ", vec![]),
                ("code", vec!["code"]),
                (".", vec![]),
            ]
        );
        assert_eq!(p.mark_defs.len(), 1);
        assert_eq!(p.mark_defs[0].key, "link1");
        assert_eq!(p.mark_defs[0].mark_type, "link");
        assert_eq!(p.mark_defs[0].href.as_deref(), Some("https://x.dev"));
        assert_eq!(p.children[1].key.as_deref(), Some("md0s1"));
    }

    #[test]
    fn test_nested_marks() {
        let blocks = markdown_to_portable_text("**bold [linked](/a) text**\n");
        let p = text_block(&blocks[0]);
        assert_eq!(
            span_summary(p),
            vec![
                ("bold ", vec!["strong"]),
                ("linked", vec!["strong", "link1"]),
                (" text", vec!["strong"]),
            ]
        );
    }

    #[test]
    fn test_lists() {
        let blocks = markdown_to_portable_text("- one\n- two\n  1. nested\n\nAfter\n");
        let summary: Vec<(&str, Option<&str>, Option<u32>)> = blocks
            .iter()
            .map(text_block)
            .map(|b| (b.children[0].text.as_str(), b.list_item.as_deref(), b.level))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("one", Some("bullet"), Some(1)),
                ("two", Some("bullet"), Some(1)),
                ("nested", Some("number"), Some(2)),
                ("After", None, None),
            ]
        );
    }

    #[test]
    fn test_setext_heading_indented_code_and_quote() {
        let blocks =
            markdown_to_portable_text("Setext\n======\n\n    indented code\n\n> quoted\n\n#hashtag\n");
        let styles: Vec<(&str, &str)> = blocks
            .iter()
            .map(text_block)
            .map(|b| (b.style.as_deref().unwrap_or_default(), b.children[0].text.as_str()))
            .collect();
        assert_eq!(
            styles,
            vec![
                ("h1", "Setext"),
                ("code", "indented code"),
                ("blockquote", "quoted"),
                ("normal", "#hashtag"),
            ]
        );
    }

    #[test]
    fn test_prose_starting_with_import_is_kept() {
        let blocks = markdown_to_portable_text("import duties rose sharply.\n");
        assert_eq!(text_block(&blocks[0]).children[0].text, "import duties rose sharply.");
    }

    #[test]
    fn test_strip_mdx_esm() {
        let source = "import Chart from './chart'\nexport const meta = {\n  a: 1,\n}\n\nimport duties rose.\n\n```js\nimport x from 'y'\n```\n";
        let stripped = strip_mdx_esm(source);
        assert_eq!(
            stripped,
            "\nimport duties rose.\n\n```js\nimport x from 'y'\n```\n"
        );

        let doc = parse_document(
            Path::new("content/articles/chart.mdx"),
            "---\ntitle: Chart\n---\nimport Chart from './chart'\n\n<Chart />\n\nText\n",
        )
        .unwrap();
        let body = doc["body"].as_array().unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0]["children"][0]["text"], "Text");
    }

    #[test]
    fn test_parse_document_defaults_slug() {
        let doc = parse_document(
            Path::new("content/articles/my-post.md"),
            "---\ntitle: My Post\ndate: 2024-05-01\n---\nHello\n",
        )
        .unwrap();
        assert_eq!(doc["slug"], "my-post");
        assert_eq!(doc["date"], "2024-05-01");
        assert_eq!(doc["body"][0]["children"][0]["text"], "Hello");

        let doc = parse_document(
            Path::new("content/articles/deep-dive/index.mdx"),
            "---\ntitle: Deep\nslug: custom\n---\n",
        )
        .unwrap();
        assert_eq!(doc["slug"], "custom");

        let doc = parse_document(Path::new("content/pages/deep/index.md"), "Body").unwrap();
        assert_eq!(doc["slug"], "deep");
    }

    #[test]
    fn test_parse_document_skips_drafts_and_bad_yaml() {
        assert!(parse_document(Path::new("a.md"), "---\ndraft: true\ntitle: x\n---\n").is_none());
        assert!(parse_document(Path::new("a.md"), "---\n- just\n- a list\n---\n").is_none());
    }
}
