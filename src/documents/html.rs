/*!
 * XHTML to translatable text.
 *
 * The document is parsed with html5ever into an `RcDom`. Images become
 * placeholder tokens (through an `ImageSink`), headings become `#` lines,
 * boilerplate elements are dropped and the remaining text nodes are stripped
 * and joined line by line.
 */

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use super::{FoundImage, ImageSink};
use crate::errors::DocumentError;
use crate::placeholder;

/// Elements whose whole subtree is dropped before text extraction
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "head", "meta", "link", "applet", "embed", "object", "form",
    "iframe", "map", "area", "header", "footer", "nav", "aside", "figure", "figcaption",
];

/// Titles that say nothing about the content
const GENERIC_TITLES: &[&str] = &[
    "untitled",
    "unknown",
    "navigation",
    "toc",
    "table of contents",
    "index",
    "contents",
    "оглавление",
    "содержание",
    "индекс",
    "cover",
    "title page",
    "copyright",
    "chapter",
];

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank line pattern"));

/// Parse markup into a DOM
pub fn parse(markup: &str) -> Result<RcDom, DocumentError> {
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut markup.as_bytes())
        .map_err(|e| DocumentError::Markup(e.to_string()))
}

/// Whether a title is boilerplate
pub fn is_generic_title(title: &str) -> bool {
    let lowered = title.trim().to_lowercase();
    lowered.chars().count() <= 1 || GENERIC_TITLES.contains(&lowered.as_str())
}

fn tag_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

fn heading_level(tag: &str) -> Option<usize> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Attributes keyed by their qualified name (`xlink:href`, `src`, ...)
pub fn attributes_of(node: &Handle) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let NodeData::Element { attrs, .. } = &node.data {
        for attr in attrs.borrow().iter() {
            let key = match &attr.name.prefix {
                Some(prefix) => format!("{}:{}", prefix, attr.name.local),
                None => attr.name.local.to_string(),
            };
            map.insert(key, attr.value.to_string());
        }
    }
    map
}

/// Stripped text pieces of a subtree, in document order
fn text_pieces(node: &Handle, out: &mut Vec<String>) {
    match &node.data {
        NodeData::Text { contents } => {
            let text = contents.borrow();
            let text = text.trim();
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }
        _ => {
            for child in node.children.borrow().iter() {
                text_pieces(child, out);
            }
        }
    }
}

/// Whitespace-joined text of a subtree
pub fn inner_text(node: &Handle) -> String {
    let mut pieces = Vec::new();
    text_pieces(node, &mut pieces);
    pieces.join(" ")
}

fn find_first<F>(node: &Handle, predicate: &F) -> Option<Handle>
where
    F: Fn(&str) -> bool,
{
    if let Some(tag) = tag_name(node) {
        if predicate(&tag) {
            return Some(node.clone());
        }
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_first(child, predicate))
}

struct Extractor<'a> {
    sink: &'a mut dyn ImageSink,
    pieces: Vec<String>,
}

impl Extractor<'_> {
    fn walk_children(&mut self, node: &Handle) {
        for child in node.children.borrow().iter() {
            self.walk(child);
        }
    }

    fn push_image(&mut self, found: FoundImage) {
        if let Some(id) = self.sink.register(found) {
            self.pieces.push(placeholder::encode(&id));
        }
    }

    fn walk(&mut self, node: &Handle) {
        match &node.data {
            NodeData::Document => self.walk_children(node),
            NodeData::Text { contents } => {
                let text = contents.borrow();
                let text = text.trim();
                if !text.is_empty() {
                    self.pieces.push(text.to_string());
                }
            }
            NodeData::Element { .. } => {
                let tag = tag_name(node).unwrap_or_default();
                if DROPPED_TAGS.contains(&tag.as_str()) {
                    return;
                }
                if tag == "img" {
                    let attributes = attributes_of(node);
                    let src = attributes.get("src").cloned().unwrap_or_default();
                    self.push_image(FoundImage {
                        tag_name: tag,
                        src,
                        attributes,
                        is_svg_image_child: false,
                    });
                } else if tag == "svg" {
                    let image = node
                        .children
                        .borrow()
                        .iter()
                        .find(|child| tag_name(child).as_deref() == Some("image"))
                        .cloned();
                    if let Some(image) = image {
                        let attributes = attributes_of(&image);
                        let src = attributes
                            .get("xlink:href")
                            .or_else(|| attributes.get("href"))
                            .cloned()
                            .unwrap_or_default();
                        self.push_image(FoundImage {
                            tag_name: "image".to_string(),
                            src,
                            attributes,
                            is_svg_image_child: true,
                        });
                    }
                } else if let Some(level) = heading_level(&tag) {
                    let start = self.pieces.len();
                    self.walk_children(node);
                    let text = self.pieces.split_off(start).join(" ");
                    if !text.is_empty() {
                        self.pieces.push(format!("{} {}", "#".repeat(level), text));
                    }
                } else {
                    self.walk_children(node);
                }
            }
            _ => {}
        }
    }
}

/// Convert an XHTML document into text with placeholders
pub fn extract_text(markup: &str, sink: &mut dyn ImageSink) -> Result<String, DocumentError> {
    let dom = parse(markup)?;
    let title = title_of(&dom.document).filter(|t| !is_generic_title(t) && t.chars().count() > 2);

    let mut extractor = Extractor {
        sink,
        pieces: Vec::new(),
    };
    let root = find_first(&dom.document, &|tag| tag == "body").unwrap_or_else(|| dom.document.clone());
    extractor.walk(&root);
    let body = extractor.pieces.join("\n");

    let text = match title {
        Some(title) => {
            let first_line = body.trim_start().lines().next().unwrap_or_default();
            let starts_with_title = first_line
                .strip_prefix("# ")
                .map(|heading| heading.trim().to_lowercase() == title.to_lowercase())
                .unwrap_or(false);
            if starts_with_title {
                body
            } else {
                format!("# {}\n\n{}", title, body)
            }
        }
        None => body,
    };

    Ok(BLANK_RUNS.replace_all(&text, "\n\n").trim().to_string())
}

fn title_of(document: &Handle) -> Option<String> {
    find_first(document, &|tag| tag == "title")
        .map(|node| inner_text(&node))
        .filter(|t| !t.is_empty())
}

/// The `<title>` of a document, if present and not boilerplate
pub fn document_title(markup: &str) -> Option<String> {
    let dom = parse(markup).ok()?;
    title_of(&dom.document).filter(|t| !is_generic_title(t))
}

/// Text of the first heading with level <= `max_level`, in document order
pub fn first_heading(markup: &str, max_level: usize) -> Option<String> {
    let dom = parse(markup).ok()?;
    let node = find_first(&dom.document, &|tag| {
        heading_level(tag).is_some_and(|level| level <= max_level)
    })?;
    let text = inner_text(&node);
    (!text.is_empty()).then_some(text)
}
