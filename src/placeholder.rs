/*!
 * Inline image placeholders.
 *
 * An embedded image travels through translation as a fixed textual token,
 * `<||img_placeholder_<32 lowercase hex>||>`, keyed by a unique identifier.
 * The codec is pure; the image bookkeeping (`ImageRecord`, `ImageMap`) lives
 * here too because readers, the chunk loop and the EPUB reassembler all share it.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Literal token prefix, including the opening delimiter
pub const TOKEN_OPEN: &str = "<||img_placeholder_";

/// Literal token suffix
pub const TOKEN_CLOSE: &str = "||>";

/// Total length of a well-formed token in bytes
pub const TOKEN_LEN: usize = TOKEN_OPEN.len() + 32 + TOKEN_CLOSE.len();

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\|\|img_placeholder_([a-f0-9]{32})\|\|>").expect("placeholder pattern"));

/// A token found in text, with its byte span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMatch {
    pub token: String,
    pub id: String,
    pub start: usize,
    pub end: usize,
}

/// Produce the token for an image id
pub fn encode(id: &str) -> String {
    format!("{}{}{}", TOKEN_OPEN, id, TOKEN_CLOSE)
}

/// A fresh 32-hex identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// All well-formed tokens, left to right
pub fn find_all(text: &str) -> Vec<PlaceholderMatch> {
    TOKEN_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(1)?;
            Some(PlaceholderMatch {
                token: whole.as_str().to_string(),
                id: id.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// The set of ids present in `text`
pub fn id_set(text: &str) -> BTreeSet<String> {
    find_all(text).into_iter().map(|m| m.id).collect()
}

/// Whether `pos` lies strictly inside a token span
pub fn is_inside_token(text: &str, pos: usize) -> bool {
    find_all(text)
        .iter()
        .any(|m| pos > m.start && pos < m.end)
}

/// Replace every token via `f(id)`, leaving other text untouched
pub fn replace_with<F>(text: &str, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in find_all(text) {
        out.push_str(&text[last..m.start]);
        out.push_str(&f(&m.id));
        last = m.end;
    }
    out.push_str(&text[last..]);
    out
}

/// How an image is carried until output time
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRecord {
    /// Bytes already extracted to disk (docx and non-rebuild paths)
    Saved {
        saved_path: PathBuf,
        original_filename: String,
        content_type: String,
        width: Option<u32>,
        height: Option<u32>,
    },
    /// EPUB rebuild: keep the original reference, copy nothing
    Source {
        original_src: String,
        original_tag_name: String,
        is_svg_image_child: bool,
        attributes: BTreeMap<String, String>,
    },
}

impl ImageRecord {
    /// Filename shown by plain-text renderers
    pub fn display_name(&self) -> String {
        match self {
            Self::Saved { original_filename, .. } => original_filename.clone(),
            Self::Source { original_src, .. } => original_src
                .rsplit('/')
                .next()
                .unwrap_or(original_src)
                .to_string(),
        }
    }
}

/// Placeholder id to image record
pub type ImageMap = BTreeMap<String, ImageRecord>;
