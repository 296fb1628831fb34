/*!
 * Navigation documents: the EPUB3 NAV and the legacy NCX.
 *
 * Existing documents are rewritten in a single streaming pass that copies
 * every event through unchanged except link targets and link labels. When a
 * book has no navigation at all, minimal documents are generated from the
 * spine.
 */

use log::debug;
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::package::attribute;
use super::paths;
use crate::errors::EpubError;

/// A table of contents entry resolved to an archive path
#[derive(Debug, Clone, PartialEq)]
pub struct TocEntry {
    pub path: String,
    pub fragment: Option<String>,
    pub title: String,
}

static UNSAFE_ID_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-]+").expect("id pattern"));

fn xml_error(file: &str, error: impl std::fmt::Display) -> EpubError {
    EpubError::Xml {
        file: file.to_string(),
        message: error.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_toc_nav(element: &BytesStart) -> bool {
    element.local_name().as_ref() == b"nav"
        && attribute(element, b"type").is_some_and(|kind| kind.split_whitespace().any(|k| k == "toc"))
}

/// Whether the document has a `<nav epub:type="toc">`
fn has_toc_nav(xml: &str, file: &str) -> Result<bool, EpubError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(|e| xml_error(file, e))? {
            Event::Start(e) if is_toc_nav(&e) => return Ok(true),
            Event::Eof => return Ok(false),
            _ => {}
        }
    }
}

/// Text content of the element whose start tag was just read
fn read_inner_text(reader: &mut Reader<&[u8]>, file: &str) -> Result<String, EpubError> {
    let mut depth = 1usize;
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(|e| xml_error(file, e))? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(collapse_whitespace(&text));
                }
            }
            Event::Text(t) => {
                text.push_str(&t.unescape().map_err(|e| xml_error(file, e))?);
                text.push(' ');
            }
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::Eof => return Err(xml_error(file, "unexpected end of document")),
            _ => {}
        }
    }
}

/// Tracks whether the cursor is inside the table of contents `<nav>`
struct TocScope {
    whole_document: bool,
    depth: usize,
}

impl TocScope {
    fn new(xml: &str, file: &str) -> Result<Self, EpubError> {
        Ok(Self {
            whole_document: !has_toc_nav(xml, file)?,
            depth: 0,
        })
    }

    fn enter(&mut self, element: &BytesStart) {
        if element.local_name().as_ref() == b"nav" && (self.depth > 0 || is_toc_nav(element)) {
            self.depth += 1;
        }
    }

    fn leave(&mut self, element: &BytesEnd) {
        if element.local_name().as_ref() == b"nav" && self.depth > 0 {
            self.depth -= 1;
        }
    }

    fn active(&self) -> bool {
        self.whole_document || self.depth > 0
    }
}

/// Links of a NAV document's table of contents, in order
pub fn nav_entries(xml: &str, nav_path: &str) -> Result<Vec<TocEntry>, EpubError> {
    let base_dir = paths::parent_dir(nav_path);
    let mut scope = TocScope::new(xml, nav_path)?;
    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();

    loop {
        match reader.read_event().map_err(|e| xml_error(nav_path, e))? {
            Event::Start(e) if e.local_name().as_ref() == b"a" && scope.active() => {
                let href = attribute(&e, b"href");
                let title = read_inner_text(&mut reader, nav_path)?;
                if let Some(href) = href.filter(|h| !paths::is_external_or_local(h)) {
                    if !title.is_empty() {
                        let (path, fragment) = paths::resolve_href(&base_dir, &href);
                        entries.push(TocEntry { path, fragment, title });
                    }
                }
            }
            Event::Start(e) => scope.enter(&e),
            Event::End(e) => scope.leave(&e),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

/// Element names from the root down to the current element
#[derive(Default)]
struct ElementPath {
    names: Vec<Vec<u8>>,
    nav_points: Vec<usize>,
    seen_points: usize,
}

impl ElementPath {
    fn push(&mut self, element: &BytesStart) {
        let local = element.local_name().as_ref().to_vec();
        if local == b"navPoint" {
            self.nav_points.push(self.seen_points);
            self.seen_points += 1;
        }
        self.names.push(local);
    }

    fn pop(&mut self) {
        if self.names.pop().as_deref() == Some(b"navPoint".as_slice()) {
            self.nav_points.pop();
        }
    }

    fn parent_is(&self, name: &[u8]) -> bool {
        self.names.last().is_some_and(|n| n == name)
    }

    /// Directly inside `navPoint/navLabel`
    fn in_label(&self) -> bool {
        let len = self.names.len();
        len >= 2 && self.names[len - 1] == b"navLabel" && self.names[len - 2] == b"navPoint"
    }

    fn current_point(&self) -> Option<usize> {
        self.nav_points.last().copied()
    }
}

/// Labels and targets of every navPoint, indexed by document order
fn scan_nav_points(xml: &str, ncx_path: &str) -> Result<Vec<(Option<String>, Option<String>)>, EpubError> {
    let mut reader = Reader::from_str(xml);
    let mut path = ElementPath::default();
    let mut points: Vec<(Option<String>, Option<String>)> = Vec::new();

    loop {
        match reader.read_event().map_err(|e| xml_error(ncx_path, e))? {
            Event::Start(e) => {
                if path.in_label() && e.local_name().as_ref() == b"text" {
                    let label = read_inner_text(&mut reader, ncx_path)?;
                    if let Some(index) = path.current_point() {
                        points[index].0.get_or_insert(label);
                    }
                    continue;
                }
                if path.parent_is(b"navPoint") && e.local_name().as_ref() == b"content" {
                    if let Some(index) = path.current_point() {
                        points[index].1 = attribute(&e, b"src");
                    }
                }
                path.push(&e);
                if e.local_name().as_ref() == b"navPoint" {
                    points.push((None, None));
                }
            }
            Event::Empty(e) => {
                if path.parent_is(b"navPoint") && e.local_name().as_ref() == b"content" {
                    if let Some(index) = path.current_point() {
                        points[index].1 = attribute(&e, b"src");
                    }
                }
            }
            Event::End(_) => path.pop(),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(points)
}

/// navPoints of an NCX document, in order
pub fn ncx_entries(xml: &str, ncx_path: &str) -> Result<Vec<TocEntry>, EpubError> {
    let base_dir = paths::parent_dir(ncx_path);
    let entries = scan_nav_points(xml, ncx_path)?
        .into_iter()
        .filter_map(|(label, src)| {
            let title = label.filter(|l| !l.is_empty())?;
            let src = src.filter(|s| !paths::is_external_or_local(s))?;
            let (path, fragment) = paths::resolve_href(&base_dir, &src);
            Some(TocEntry { path, fragment, title })
        })
        .collect();
    Ok(entries)
}

/// Title per archive path, first entry wins
pub fn titles_by_path(entries: &[TocEntry]) -> HashMap<String, String> {
    let mut titles = HashMap::new();
    for entry in entries {
        titles.entry(entry.path.clone()).or_insert_with(|| entry.title.clone());
    }
    titles
}

/// How links are rewritten: old archive path to new, and the title per old path
pub struct LinkRewrite<'a> {
    pub filename_map: &'a HashMap<String, String>,
    pub titles: &'a HashMap<String, String>,
}

impl LinkRewrite<'_> {
    /// New href for `href` seen from `base_dir`, or `None` to keep it as is
    fn href(&self, base_dir: &str, href: &str) -> Option<String> {
        if paths::is_external_or_local(href) {
            return None;
        }
        let (target, fragment) = paths::resolve_href(base_dir, href);
        let renamed = self.filename_map.get(&target).filter(|new| **new != target)?;
        Some(paths::to_href(&paths::relative(renamed, base_dir), fragment.as_deref()))
    }

    fn title_for(&self, base_dir: &str, href: &str) -> Option<&String> {
        if paths::is_external_or_local(href) {
            return None;
        }
        let (target, _) = paths::resolve_href(base_dir, href);
        self.titles.get(&target)
    }
}

/// Copy of `element` with attribute `key` replaced by `value`
fn with_attribute(element: &BytesStart, key: &[u8], value: &str) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let key_name = String::from_utf8_lossy(key).into_owned();
    let mut out = BytesStart::new(name);
    for attr in element.attributes().flatten() {
        if attr.key.as_ref() == key {
            out.push_attribute((key_name.as_str(), value));
        } else {
            out.push_attribute(attr);
        }
    }
    out
}

struct Rewriter<'x> {
    reader: Reader<&'x [u8]>,
    writer: Writer<Vec<u8>>,
    file: String,
}

impl<'x> Rewriter<'x> {
    fn new(xml: &'x str, file: &str) -> Self {
        Self {
            reader: Reader::from_str(xml),
            writer: Writer::new(Vec::new()),
            file: file.to_string(),
        }
    }

    fn next(&mut self) -> Result<Event<'x>, EpubError> {
        self.reader.read_event().map_err(|e| xml_error(&self.file, e))
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), EpubError> {
        self.writer.write_event(event).map_err(|e| xml_error(&self.file, e))
    }

    /// Write `start`, then `text` in place of the original content, then the end tag
    fn replace_content(&mut self, start: BytesStart<'_>, text: &str) -> Result<(), EpubError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        self.reader
            .read_to_end(start.name())
            .map_err(|e| xml_error(&self.file, e))?;
        self.write(Event::Start(start))?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn finish(self) -> String {
        String::from_utf8_lossy(&self.writer.into_inner()).into_owned()
    }
}

/// Rewrite the table of contents links of a NAV document
pub fn rewrite_nav(xml: &str, nav_path: &str, rewrite: &LinkRewrite) -> Result<String, EpubError> {
    let base_dir = paths::parent_dir(nav_path);
    let mut scope = TocScope::new(xml, nav_path)?;
    let mut rw = Rewriter::new(xml, nav_path);
    let mut rewritten = 0usize;

    loop {
        match rw.next()? {
            Event::Start(e) if e.local_name().as_ref() == b"a" && scope.active() => {
                let href = attribute(&e, b"href").unwrap_or_default();
                let start = match rewrite.href(&base_dir, &href) {
                    Some(new_href) => {
                        rewritten += 1;
                        with_attribute(&e, b"href", &new_href)
                    }
                    None => e.into_owned(),
                };
                match rewrite.title_for(&base_dir, &href).cloned() {
                    Some(title) => rw.replace_content(start, &title)?,
                    None => rw.write(Event::Start(start))?,
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"a" && scope.active() => {
                let href = attribute(&e, b"href").unwrap_or_default();
                match rewrite.href(&base_dir, &href) {
                    Some(new_href) => {
                        rewritten += 1;
                        rw.write(Event::Empty(with_attribute(&e, b"href", &new_href)))?
                    }
                    None => rw.write(Event::Empty(e))?,
                }
            }
            Event::Start(e) => {
                scope.enter(&e);
                rw.write(Event::Start(e))?;
            }
            Event::End(e) => {
                scope.leave(&e);
                rw.write(Event::End(e))?;
            }
            Event::Eof => break,
            other => rw.write(other)?,
        }
    }
    debug!("NAV {}: {} links retargeted", nav_path, rewritten);
    Ok(rw.finish())
}

/// Rewrite the navPoint targets and labels of an NCX document
pub fn rewrite_ncx(xml: &str, ncx_path: &str, rewrite: &LinkRewrite) -> Result<String, EpubError> {
    let base_dir = paths::parent_dir(ncx_path);
    let points = scan_nav_points(xml, ncx_path)?;
    let mut rw = Rewriter::new(xml, ncx_path);
    let mut path = ElementPath::default();

    let src_of = |index: Option<usize>| -> Option<String> {
        index.and_then(|i| points.get(i)).and_then(|(_, src)| src.clone())
    };

    loop {
        match rw.next()? {
            Event::Start(e) => {
                if path.in_label() && e.local_name().as_ref() == b"text" {
                    let title = src_of(path.current_point())
                        .and_then(|src| rewrite.title_for(&base_dir, &src).cloned());
                    if let Some(title) = title {
                        rw.replace_content(e.into_owned(), &title)?;
                        continue;
                    }
                }
                let element = if path.parent_is(b"navPoint") && e.local_name().as_ref() == b"content" {
                    retarget_content(&e, &base_dir, rewrite)
                } else {
                    e.into_owned()
                };
                path.push(&element);
                rw.write(Event::Start(element))?;
            }
            Event::Empty(e) => {
                let element = if path.parent_is(b"navPoint") && e.local_name().as_ref() == b"content" {
                    retarget_content(&e, &base_dir, rewrite)
                } else {
                    e.into_owned()
                };
                rw.write(Event::Empty(element))?;
            }
            Event::End(e) => {
                path.pop();
                rw.write(Event::End(e))?;
            }
            Event::Eof => break,
            other => rw.write(other)?,
        }
    }
    Ok(rw.finish())
}

fn retarget_content(element: &BytesStart, base_dir: &str, rewrite: &LinkRewrite) -> BytesStart<'static> {
    let src = attribute(element, b"src").unwrap_or_default();
    match rewrite.href(base_dir, &src) {
        Some(new_src) => with_attribute(element, b"src", &new_src),
        None => element.clone().into_owned(),
    }
}

fn entry_href(entry: &TocEntry, base_dir: &str) -> String {
    paths::to_href(&paths::relative(&entry.path, base_dir), entry.fragment.as_deref())
}

/// Minimal NAV document listing `entries`
pub fn generate_nav(entries: &[TocEntry], nav_path: &str, book_title: &str, language: &str) -> String {
    let base_dir = paths::parent_dir(nav_path);
    let language = escape(language);
    let mut lines = vec![
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>".to_string(),
        "<!DOCTYPE html>".to_string(),
        format!(
            "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{0}\" xml:lang=\"{0}\">",
            language
        ),
        "<head>".to_string(),
        "  <meta charset=\"utf-8\"/>".to_string(),
        format!("  <title>{}</title>", escape(book_title)),
        "</head>".to_string(),
        "<body>".to_string(),
        "  <nav epub:type=\"toc\" id=\"toc\">".to_string(),
        "    <ol>".to_string(),
    ];
    for entry in entries {
        let title = entry.title.trim();
        let title = if title.is_empty() { "Untitled Entry" } else { title };
        lines.push(format!(
            "      <li><a href=\"{}\">{}</a></li>",
            escape(&entry_href(entry, &base_dir)),
            escape(title)
        ));
    }
    lines.extend(
        ["    </ol>", "  </nav>", "</body>", "</html>"]
            .iter()
            .map(|l| l.to_string()),
    );
    lines.join("\n")
}

/// Minimal NCX document listing `entries`
pub fn generate_ncx(entries: &[TocEntry], ncx_path: &str, book_id: &str, book_title: &str) -> String {
    let base_dir = paths::parent_dir(ncx_path);
    let mut lines = vec![
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>".to_string(),
        "<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">".to_string(),
        "  <head>".to_string(),
        format!("    <meta content=\"{}\" name=\"dtb:uid\"/>", escape(book_id)),
        "    <meta content=\"1\" name=\"dtb:depth\"/>".to_string(),
        "    <meta content=\"0\" name=\"dtb:totalPageCount\"/>".to_string(),
        "    <meta content=\"0\" name=\"dtb:maxPageNumber\"/>".to_string(),
        "  </head>".to_string(),
        format!("  <docTitle>\n    <text>{}</text>\n  </docTitle>", escape(book_title)),
        "  <docAuthor>\n    <text>Translator</text>\n  </docAuthor>".to_string(),
        "  <navMap>".to_string(),
    ];
    for (index, entry) in entries.iter().enumerate() {
        let order = index + 1;
        let stem = std::path::Path::new(paths::file_name(&entry.path))
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = format!("navpoint_{}_{}", UNSAFE_ID_CHARS.replace_all(&stem, "_"), order);
        lines.push(format!("    <navPoint id=\"{}\" playOrder=\"{}\">", escape(&id), order));
        lines.push(format!(
            "      <navLabel>\n        <text>{}</text>\n      </navLabel>",
            escape(&entry.title)
        ));
        lines.push(format!(
            "      <content src=\"{}\"/>",
            escape(&entry_href(entry, &base_dir))
        ));
        lines.push("    </navPoint>".to_string());
    }
    lines.push("  </navMap>".to_string());
    lines.push("</ncx>".to_string());
    lines.join("\n")
}
