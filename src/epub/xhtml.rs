/*!
 * Translated text back to an XHTML content document.
 *
 * The translated text is markdown-like: `#` headings, `---` rules, `*`/`-`
 * and `1.` lists, fenced code and blank-line separated paragraphs. Image
 * placeholders become `<img>` tags rebuilt from their `ImageRecord`.
 */

use once_cell::sync::Lazy;
use quick_xml::escape::{escape, partial_escape};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;

use super::paths;
use crate::placeholder::{self, ImageMap, ImageRecord};

static BREAK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("br pattern"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank line pattern"));
static INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*|\*(.+?)\*|`(.+?)`").expect("inline markup pattern"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(#{1,6})\s+(.*)$").expect("heading pattern"));
static RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^---$").expect("rule pattern"));
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[*\-]\s+(.*)$").expect("bullet pattern"));
static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\.\s+(.*)$").expect("numbered pattern"));
static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(.*)$").expect("fence pattern"));
static LEADING_NUMBERING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d_\-]+").expect("numbering pattern"));

/// Where the document lives and what it is called
#[derive(Debug, Clone)]
pub struct Page<'a> {
    pub title: &'a str,
    pub language: &'a str,
    /// Archive path of the document
    pub path: &'a str,
    pub opf_dir: &'a str,
}

/// Images available to the document
pub struct ImageLinks<'a> {
    pub records: &'a ImageMap,
    /// Placeholder id to the archive path of an image added to the book
    pub added: &'a HashMap<String, String>,
}

impl ImageLinks<'_> {
    fn tag(&self, id: &str, doc_dir: &str) -> String {
        let Some(record) = self.records.get(id) else {
            return format!("<!-- missing image {} -->", id);
        };

        let mut attributes: Vec<(String, String)> = Vec::new();
        let (src, alt) = match record {
            ImageRecord::Source {
                original_src,
                attributes: original,
                is_svg_image_child,
                ..
            } => {
                for (key, value) in original {
                    let dropped = matches!(key.as_str(), "src" | "alt" | "xlink:href")
                        || (*is_svg_image_child && key == "href")
                        || (key.contains(':') && !key.starts_with("epub:"));
                    if !dropped {
                        attributes.push((key.clone(), value.clone()));
                    }
                }
                let alt = original
                    .get("alt")
                    .filter(|alt| !alt.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| record.display_name());
                (original_src.clone(), alt)
            }
            ImageRecord::Saved {
                original_filename,
                width,
                height,
                ..
            } => {
                let Some(added) = self.added.get(id) else {
                    return format!("<!-- missing image {} -->", id);
                };
                if let Some(width) = width {
                    attributes.push(("width".into(), width.to_string()));
                }
                if let Some(height) = height {
                    attributes.push(("height".into(), height.to_string()));
                }
                (
                    paths::to_href(&paths::relative(added, doc_dir), None),
                    original_filename.clone(),
                )
            }
        };
        let alt = if alt.is_empty() {
            format!("Image {}", &id[..id.len().min(7)])
        } else {
            alt
        };

        let width = attributes.iter().find(|(k, _)| k == "width").map(|(_, v)| v.clone());
        let has_height = attributes.iter().any(|(k, _)| k == "height");
        let mut style = Vec::new();
        if width.as_deref().is_none_or(|w| w.contains('%')) {
            style.push("max-width: 100%;");
        }
        if !has_height {
            style.push("height: auto;");
        }
        if !style.is_empty() {
            match attributes.iter_mut().find(|(k, _)| k == "style") {
                Some((_, existing)) => {
                    *existing = format!("{} {}", existing.trim_end(), style.join(" "));
                }
                None => attributes.push(("style".into(), style.join(" "))),
            }
        }

        let mut tag = format!("<img src=\"{}\" alt=\"{}\"", escape(&src), escape(&alt));
        for (key, value) in &attributes {
            tag.push_str(&format!(" {}=\"{}\"", key, escape(value)));
        }
        tag.push_str("/>");
        tag
    }
}

/// Escape text and apply `**strong**`, `*em*` and `` `code` ``
fn inline_markup(text: &str) -> String {
    let escaped = partial_escape(text);
    INLINE
        .replace_all(&escaped, |caps: &Captures| {
            if let Some(strong) = caps.get(1) {
                format!("<strong>{}</strong>", strong.as_str())
            } else if let Some(em) = caps.get(2) {
                format!("<em>{}</em>", em.as_str())
            } else {
                format!("<code>{}</code>", caps.get(3).map(|m| m.as_str()).unwrap_or_default())
            }
        })
        .into_owned()
}

struct BodyBuilder<'a> {
    images: &'a ImageLinks<'a>,
    doc_dir: String,
    out: Vec<String>,
    paragraph: Vec<String>,
    list: Option<&'static str>,
    code: Option<Vec<String>>,
}

impl<'a> BodyBuilder<'a> {
    fn inline(&self, text: &str) -> String {
        let mut out = String::new();
        let mut last = 0;
        for found in placeholder::find_all(text) {
            out.push_str(&inline_markup(&text[last..found.start]));
            out.push_str(&self.images.tag(&found.id, &self.doc_dir));
            last = found.end;
        }
        out.push_str(&inline_markup(&text[last..]));
        out
    }

    fn close_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let lines: Vec<String> = self.paragraph.iter().map(|line| self.inline(line)).collect();
            self.out.push(format!("<p>{}</p>", lines.join("<br />")));
            self.paragraph.clear();
        }
    }

    fn close_list(&mut self) {
        if let Some(tag) = self.list.take() {
            self.out.push(format!("</{}>", tag));
        }
    }

    fn close_code(&mut self) {
        if let Some(lines) = self.code.take() {
            self.out.push(format!("{}</code></pre>", partial_escape(&lines.join("\n"))));
        }
    }

    fn list_item(&mut self, tag: &'static str, content: &str) {
        if self.list != Some(tag) {
            self.close_list();
            self.out.push(format!("<{}>", tag));
            self.list = Some(tag);
        }
        let item = self.inline(content.trim());
        self.out.push(format!("<li>{}</li>", item));
    }

    fn line(&mut self, line: &str) {
        let stripped = line.trim();

        if let Some(lines) = self.code.as_mut() {
            if FENCE.is_match(stripped) {
                self.close_code();
            } else {
                lines.push(line.to_string());
            }
            return;
        }

        let tokens = placeholder::find_all(stripped);
        if tokens.len() == 1 && tokens[0].start == 0 && tokens[0].end == stripped.len() {
            self.close_paragraph();
            self.close_list();
            let tag = self.images.tag(&tokens[0].id, &self.doc_dir);
            self.out.push(tag);
            return;
        }

        if let Some(caps) = FENCE.captures(stripped) {
            self.close_paragraph();
            self.close_list();
            let lang = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            if lang.is_empty() {
                self.out.push("<pre><code>".to_string());
            } else {
                self.out.push(format!("<pre><code class=\"language-{}\">", escape(lang)));
            }
            self.code = Some(Vec::new());
            return;
        }

        if stripped.is_empty() {
            self.close_paragraph();
            self.close_list();
            return;
        }

        if let Some(caps) = HEADING.captures(line) {
            self.close_paragraph();
            self.close_list();
            let level = caps[1].len();
            let text = self.inline(caps[2].trim());
            self.out.push(format!("<h{0}>{1}</h{0}>", level, text));
        } else if RULE.is_match(stripped) {
            self.close_paragraph();
            self.close_list();
            self.out.push("<hr />".to_string());
        } else if let Some(caps) = BULLET.captures(line) {
            self.close_paragraph();
            self.list_item("ul", &caps[1]);
        } else if let Some(caps) = NUMBERED.captures(line) {
            self.close_paragraph();
            self.list_item("ol", &caps[1]);
        } else {
            self.close_list();
            self.paragraph.push(line.to_string());
        }
    }

    fn finish(mut self) -> String {
        self.close_paragraph();
        self.close_list();
        self.close_code();
        self.out.join("\n")
    }
}

/// Body markup for translated text
pub fn render_body(text: &str, images: &ImageLinks, doc_path: &str) -> String {
    let text = BREAK_TAG.replace_all(text, "\n");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    let mut builder = BodyBuilder {
        images,
        doc_dir: paths::parent_dir(doc_path),
        out: Vec::new(),
        paragraph: Vec::new(),
        list: None,
        code: None,
    };
    for line in text.lines() {
        builder.line(line);
    }
    builder.finish()
}

/// Complete XHTML document for translated text
pub fn render_document(text: &str, images: &ImageLinks, page: &Page) -> String {
    let body = render_body(text, images, page.path);
    let stylesheet = paths::relative(
        &paths::join(page.opf_dir, "Styles/stylesheet.css"),
        &paths::parent_dir(page.path),
    );
    let title = page.title.trim();
    let title = if title.is_empty() { "Untitled Document" } else { title };
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <!DOCTYPE html>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{lang}\" xml:lang=\"{lang}\">\n\
         <head>\n\
         <meta charset=\"utf-8\" />\n\
         <title>{title}</title>\n\
         <link rel=\"stylesheet\" type=\"text/css\" href=\"{css}\"/>\n\
         </head>\n\
         <body>\n\
         {body}\n\
         </body>\n\
         </html>",
        lang = escape(page.language),
        title = partial_escape(title),
        css = escape(&stylesheet),
        body = body,
    )
}

/// Title derived from a file name: `02_the-end_translated.xhtml` gives "The end"
pub fn title_from_stem(path: &str) -> String {
    let stem = Path::new(paths::file_name(path))
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.replace("_translated", "");
    let stem = LEADING_NUMBERING.replace(&stem, "");
    let words = stem.replace(['_', '-'], " ");
    let words = words.trim();
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
