//! Screen text extraction from the accessibility element tree.
//!
//! Walks the on-screen element tree depth-first, keeps visible text inside
//! the content viewport, filters junk, and orders items top-to-bottom then
//! left-to-right to approximate reading order. A second pass looks for a
//! URL-shaped string to report as the primary link.

use crate::config::ExtractionConfig;
use crate::types::{Rect, TextItem};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Element kinds that carry main content
const CONTENT_KINDS: &[&str] = &[
    "TextView",
    "EditText",
    "WebView",
    "RecyclerView",
    "ListView",
    "ScrollView",
];

/// Built-in junk labels, extended by the configured keyword file
const DEFAULT_JUNK_KEYWORDS: &[&str] = &[
    "ok", "cancel", "back", "menu", "search", "settings", "home", "close", "done", "next", "skip",
    "send", "share", "like", "reply", "more", "edit", "delete",
];

lazy_static! {
    // Dotted-domain heuristic: no whitespace, at least one dot, last
    // segment of length >= 2. Intentionally lossy.
    static ref DOMAIN_LIKE: Regex = Regex::new(r"^\S+\.[^\s.]{2,}$").unwrap();
}

/// A node of the on-screen element tree.
///
/// Implementations wrap an OS node reference and must release it in their
/// `Drop`, so traversal cannot leak references on any exit path.
pub trait ElementNode {
    fn is_visible(&self) -> bool;
    fn bounds(&self) -> Rect;
    fn text(&self) -> Option<String>;
    /// Fully qualified element kind, e.g. "android.widget.TextView"
    fn kind(&self) -> String;
    fn child_count(&self) -> usize;
    fn child(&self, index: usize) -> Option<Box<dyn ElementNode>>;
}

/// Access to the current screen's element tree. Implemented by the
/// platform layer; absent trees are a normal condition.
pub trait ElementTreeSource: Send + Sync {
    fn root(&self) -> Option<Box<dyn ElementNode>>;
    /// Screen dimensions in pixels (width, height)
    fn screen_size(&self) -> (i32, i32);
}

/// Best-effort screen text scanner
pub struct TextExtractor {
    config: ExtractionConfig,
    junk_keywords: HashSet<String>,
}

impl TextExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        let mut junk_keywords: HashSet<String> = DEFAULT_JUNK_KEYWORDS
            .iter()
            .map(|k| k.to_string())
            .collect();

        if let Some(path) = &config.junk_keywords_path {
            match load_junk_keywords(path) {
                Ok(extra) => {
                    debug!("Loaded {} junk keywords from {:?}", extra.len(), path);
                    junk_keywords.extend(extra);
                }
                Err(e) => warn!("Failed to load junk keywords from {:?}: {}", path, e),
            }
        }

        Self {
            config: config.clone(),
            junk_keywords,
        }
    }

    /// Fresh tree walk returning ordered text. When a URL is found, a
    /// distinguished "main link" entry is prepended.
    pub fn scan(&self, tree: &dyn ElementTreeSource) -> Vec<String> {
        let (items, url) = self.scan_items(tree);
        let mut out: Vec<String> = Vec::with_capacity(items.len() + 1);
        if let Some(url) = &url {
            out.push(format!("main link: {url}"));
        }
        out.extend(items.into_iter().map(|item| item.text));
        out
    }

    /// Single string for the analyzer: "main link: <url> | <items joined>"
    pub fn scan_joined(&self, tree: &dyn ElementTreeSource) -> String {
        let (items, url) = self.scan_items(tree);
        let body = items
            .iter()
            .map(|item| item.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        match url {
            Some(url) => format!("main link: {url} | {body}"),
            None => body,
        }
    }

    fn scan_items(&self, tree: &dyn ElementTreeSource) -> (Vec<TextItem>, Option<String>) {
        let root = match tree.root() {
            Some(root) => root,
            None => {
                warn!("⚠️ No root node available for scanning");
                return (Vec::new(), None);
            }
        };

        let viewport = self.viewport(tree.screen_size());
        let mut items = Vec::new();
        self.collect_text(root.as_ref(), &viewport, &mut items);
        let url = find_url(root.as_ref());

        // Reading order: top to bottom, then left to right
        items.sort_by_key(|item| (item.bounds.top, item.bounds.left));

        debug!(
            "📝 Screen content: {} items, url: {:?}",
            items.len(),
            url
        );
        (items, url)
    }

    /// Content viewport excluding fixed chrome (status bar, nav bar, margins)
    fn viewport(&self, screen: (i32, i32)) -> Rect {
        let (width, height) = screen;
        Rect::new(
            self.config.viewport_side_inset,
            self.config.viewport_top_inset,
            width - self.config.viewport_side_inset,
            height - self.config.viewport_bottom_inset,
        )
    }

    fn collect_text(&self, node: &dyn ElementNode, viewport: &Rect, items: &mut Vec<TextItem>) {
        if !node.is_visible() {
            return;
        }

        let bounds = node.bounds();
        if bounds.intersects(viewport) {
            if let Some(text) = node.text() {
                let trimmed = text.trim();
                let kind = node.kind();
                if !trimmed.is_empty() && self.should_include(trimmed, &kind) {
                    items.push(TextItem {
                        text: trimmed.to_string(),
                        bounds,
                        element_kind: simple_kind(&kind).to_string(),
                    });
                }
            }
        }

        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.collect_text(child.as_ref(), viewport, items);
                // child dropped here, releasing its node reference
            }
        }
    }

    fn should_include(&self, text: &str, kind: &str) -> bool {
        if text.chars().count() < self.config.min_text_len {
            return false;
        }
        if self.is_junk(text) {
            return false;
        }
        is_content_kind(kind)
    }

    fn is_junk(&self, text: &str) -> bool {
        if self.junk_keywords.contains(&text.to_lowercase()) {
            return true;
        }
        // Short all-digit runs are noise, not phone numbers
        if text.chars().all(|c| c.is_ascii_digit()) && text.chars().count() < 8 {
            return true;
        }
        if text.chars().all(|c| !c.is_alphanumeric()) {
            return true;
        }
        false
    }
}

fn is_content_kind(kind: &str) -> bool {
    CONTENT_KINDS.iter().any(|k| kind.contains(k))
}

fn simple_kind(kind: &str) -> &str {
    kind.rsplit('.').next().unwrap_or(kind)
}

/// Depth-first search for the first URL-shaped text, stopping early
fn find_url(node: &dyn ElementNode) -> Option<String> {
    if !node.is_visible() {
        return None;
    }

    if let Some(text) = node.text() {
        if is_url_text(&text) {
            return Some(text);
        }
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if let Some(url) = find_url(child.as_ref()) {
                return Some(url);
            }
        }
    }
    None
}

/// URL heuristic: scheme prefix, "www." prefix, or a dotted domain shape
fn is_url_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www.") {
        return true;
    }
    DOMAIN_LIKE.is_match(text)
}

fn load_junk_keywords(path: &std::path::Path) -> Result<Vec<String>, std::io::Error> {
    let contents = std::fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let keywords = parsed["junkKeywords"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_lowercase())
                .collect()
        })
        .unwrap_or_default();
    Ok(keywords)
}
