/*!
 * Word document reader.
 *
 * Streams `word/document.xml` with quick-xml. Paragraph text is collected
 * from `w:t` runs, heading styles become `#` lines, embedded pictures are
 * resolved through the document relationships and saved to the temp
 * directory, and tables are replaced by a marker line.
 */

use log::{debug, info, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

use super::{Extracted, content_type_for, save_image, sniff_image_extension};
use crate::errors::DocumentError;
use crate::placeholder::{self, ImageMap, ImageRecord};

const DOCUMENT_XML: &str = "word/document.xml";
const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";

/// Line emitted in place of a table
pub const TABLE_MARKER: &str = "[--- TABLE (not processed) ---]";

/// English Metric Units per pixel at 96 dpi
const EMU_PER_PIXEL: u64 = 9525;

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Heading(usize, String),
    ListItem(String),
    Paragraph { text: String, is_image_only: bool },
    Table,
    Blank,
}

impl Line {
    fn render(&self) -> String {
        match self {
            Self::Heading(level, text) => format!("{} {}", "#".repeat(*level), text),
            Self::ListItem(text) => format!("* {}", text),
            Self::Paragraph { text, .. } => text.clone(),
            Self::Table => TABLE_MARKER.to_string(),
            Self::Blank => String::new(),
        }
    }

    /// Whether a blank line should follow when another content line comes next
    fn wants_gap_before(&self, next: &Line) -> bool {
        match (self, next) {
            (Self::Blank, _) | (_, Self::Blank) => false,
            (Self::Heading(..), _) | (Self::ListItem(_), _) => false,
            (Self::Table, _) | (_, Self::Table) => false,
            (
                Self::Paragraph { is_image_only: true, .. },
                Self::Paragraph { is_image_only: true, .. },
            ) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Default)]
struct ParagraphState {
    text: String,
    style: Option<String>,
    numbered: bool,
    has_image: bool,
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>, DocumentError> {
    let mut file = archive.by_name(name)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Relationship id to archive path, for image relationships only
fn read_image_rels(xml: &[u8]) -> Result<HashMap<String, String>, DocumentError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Relationship" => {
                let id = attr_value(&e, b"Id");
                let target = attr_value(&e, b"Target");
                let kind = attr_value(&e, b"Type").unwrap_or_default();
                if let (Some(id), Some(target)) = (id, target) {
                    if kind.ends_with("/image") || target.contains("media/") {
                        let path = match target.strip_prefix('/') {
                            Some(absolute) => absolute.to_string(),
                            None => format!("word/{}", target),
                        };
                        rels.insert(id, path);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DocumentError::Markup(format!("{}: {}", DOCUMENT_RELS, e))),
        }
        buf.clear();
    }
    Ok(rels)
}

fn heading_level(style: &str) -> Option<usize> {
    let compact: String = style.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    match compact.as_str() {
        "heading1" | "title" => Some(1),
        "heading2" => Some(2),
        "heading3" => Some(3),
        _ => None,
    }
}

struct ImageSaver<'a, R: Read + Seek> {
    archive: &'a mut ZipArchive<R>,
    rels: HashMap<String, String>,
    temp_dir: &'a Path,
    by_rel: HashMap<String, String>,
    images: ImageMap,
    warnings: Vec<String>,
}

impl<R: Read + Seek> ImageSaver<'_, R> {
    /// Placeholder id for a relationship, saving the image the first time it is seen
    fn placeholder_for(&mut self, rel_id: &str, extent: Option<(u64, u64)>) -> Option<String> {
        if let Some(id) = self.by_rel.get(rel_id) {
            return Some(id.clone());
        }
        let path = self.rels.get(rel_id)?.clone();
        let bytes = match read_entry(self.archive, &path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.warn(format!("Image {} ({}) unreadable: {}", rel_id, path, e));
                return None;
            }
        };
        let original_filename = path.rsplit('/').next().unwrap_or(&path).to_string();
        let declared = Path::new(&original_filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "png".to_string());
        let ext = sniff_image_extension(&bytes).unwrap_or(declared.as_str()).to_string();
        if ext == "emf" || ext == "wmf" {
            self.warn(format!("Skipping vector metafile image {}", original_filename));
            return None;
        }

        let id = placeholder::new_id();
        let saved_path = match save_image(self.temp_dir, &id, &ext, &bytes) {
            Ok(path) => path,
            Err(e) => {
                self.warn(format!("Failed to save image {}: {}", original_filename, e));
                return None;
            }
        };
        self.images.insert(
            id.clone(),
            ImageRecord::Saved {
                saved_path,
                original_filename,
                content_type: content_type_for(&ext).to_string(),
                width: extent.map(|(cx, _)| (cx / EMU_PER_PIXEL) as u32),
                height: extent.map(|(_, cy)| (cy / EMU_PER_PIXEL) as u32),
            },
        );
        self.by_rel.insert(rel_id.to_string(), id.clone());
        Some(id)
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Read a `.docx` file into text with placeholders; images go to `temp_dir`
pub fn read_docx(path: &Path, temp_dir: &Path) -> Result<Extracted, DocumentError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let document = read_entry(&mut archive, DOCUMENT_XML)?;
    let rels = match read_entry(&mut archive, DOCUMENT_RELS) {
        Ok(xml) => read_image_rels(&xml)?,
        Err(e) => {
            debug!("No document relationships in {}: {}", path.display(), e);
            HashMap::new()
        }
    };

    let mut saver = ImageSaver {
        archive: &mut archive,
        rels,
        temp_dir,
        by_rel: HashMap::new(),
        images: ImageMap::new(),
        warnings: Vec::new(),
    };

    let mut reader = Reader::from_reader(document.as_slice());
    let mut buf = Vec::new();
    let mut lines: Vec<Line> = Vec::new();
    let mut paragraph: Option<ParagraphState> = None;
    let mut in_text = false;
    let mut table_depth = 0usize;
    let mut extent: Option<(u64, u64)> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| DocumentError::Markup(format!("{}: {}", DOCUMENT_XML, e)))?;
        let is_start = matches!(event, Event::Start(_));
        match event {
            Event::Start(e) | Event::Empty(e) => {
                match e.name().as_ref() {
                    b"w:tbl" => {
                        if table_depth == 0 {
                            if !matches!(lines.last(), None | Some(Line::Blank)) {
                                lines.push(Line::Blank);
                            }
                            lines.push(Line::Table);
                            lines.push(Line::Blank);
                        }
                        table_depth += 1;
                    }
                    b"w:p" if table_depth == 0 => {
                        if is_start {
                            paragraph = Some(ParagraphState::default());
                        } else {
                            push_paragraph(&mut lines, ParagraphState::default());
                        }
                    }
                    b"w:pStyle" => {
                        if let Some(p) = paragraph.as_mut() {
                            p.style = attr_value(&e, b"w:val");
                        }
                    }
                    b"w:numPr" => {
                        if let Some(p) = paragraph.as_mut() {
                            p.numbered = true;
                        }
                    }
                    b"w:t" => in_text = is_start,
                    b"w:tab" => {
                        if let Some(p) = paragraph.as_mut() {
                            p.text.push('\t');
                        }
                    }
                    b"w:br" => {
                        if let Some(p) = paragraph.as_mut() {
                            p.text.push('\n');
                        }
                    }
                    b"wp:extent" => {
                        let cx = attr_value(&e, b"cx").and_then(|v| v.parse().ok());
                        let cy = attr_value(&e, b"cy").and_then(|v| v.parse().ok());
                        extent = cx.zip(cy);
                    }
                    b"a:blip" => {
                        if let (Some(p), Some(rel_id)) = (paragraph.as_mut(), attr_value(&e, b"r:embed")) {
                            if let Some(id) = saver.placeholder_for(&rel_id, extent) {
                                p.text.push_str(&placeholder::encode(&id));
                                p.has_image = true;
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) if in_text => {
                if let Some(p) = paragraph.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| DocumentError::Markup(format!("{}: {}", DOCUMENT_XML, err)))?;
                    p.text.push_str(&text);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                b"w:drawing" => extent = None,
                b"w:p" if table_depth == 0 => {
                    if let Some(p) = paragraph.take() {
                        push_paragraph(&mut lines, p);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let text = join_lines(&lines);
    info!(
        "DOCX {}: {} lines, {} images",
        path.display(),
        lines.len(),
        saver.images.len()
    );
    Ok(Extracted {
        text,
        images: saver.images,
        warnings: saver.warnings,
    })
}

fn push_paragraph(lines: &mut Vec<Line>, p: ParagraphState) {
    let text = p.text.trim().to_string();
    if let Some(level) = p.style.as_deref().and_then(heading_level) {
        if !text.is_empty() {
            lines.push(Line::Heading(level, text));
            return;
        }
    }
    if text.is_empty() && !p.has_image {
        if !matches!(lines.last(), None | Some(Line::Blank)) {
            lines.push(Line::Blank);
        }
        return;
    }
    let is_list = p.numbered
        || p
            .style
            .as_deref()
            .is_some_and(|s| s.to_lowercase().replace(' ', "").starts_with("listparagraph"));
    if is_list && !p.has_image {
        lines.push(Line::ListItem(text));
    } else {
        let is_image_only = p.has_image && placeholder::replace_with(&text, |_| String::new()).trim().is_empty();
        lines.push(Line::Paragraph { text, is_image_only });
    }
}

fn join_lines(lines: &[Line]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&line.render());
        if let Some(next) = lines.get(i + 1) {
            out.push('\n');
            if line.wants_gap_before(next) {
                out.push('\n');
            }
        }
    }
    out.trim().to_string()
}
