/*!
 * Input readers.
 *
 * Every reader turns a source document into translatable text in which each
 * embedded image has been replaced by a placeholder token, plus the image map
 * describing those tokens.
 *
 * - `text`: plain text files with encoding fallback
 * - `html`: XHTML fragments (standalone or inside an EPUB)
 * - `docx`: Word documents
 */

use log::warn;
use percent_encoding::percent_decode_str;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::epub::paths;
use crate::errors::DocumentError;
use crate::placeholder::{self, ImageMap, ImageRecord};

pub mod docx;
pub mod html;
pub mod text;

/// Text ready for translation
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub text: String,
    pub images: ImageMap,
    /// Non-fatal issues met while reading
    pub warnings: Vec<String>,
}

/// An image reference found in markup
#[derive(Debug, Clone, PartialEq)]
pub struct FoundImage {
    pub tag_name: String,
    pub src: String,
    pub attributes: BTreeMap<String, String>,
    pub is_svg_image_child: bool,
}

/// Receives the images met by a reader
pub trait ImageSink {
    /// Record the image and return its placeholder id, or `None` to drop the tag
    fn register(&mut self, found: FoundImage) -> Option<String>;
}

/// EPUB rebuild: remember the original reference, copy nothing
#[derive(Debug, Default)]
pub struct SourceImageSink {
    pub images: ImageMap,
}

impl ImageSink for SourceImageSink {
    fn register(&mut self, found: FoundImage) -> Option<String> {
        if found.src.is_empty() || found.src.starts_with("data:") {
            return None;
        }
        let id = placeholder::new_id();
        self.images.insert(
            id.clone(),
            ImageRecord::Source {
                original_src: found.src,
                original_tag_name: found.tag_name,
                is_svg_image_child: found.is_svg_image_child,
                attributes: found.attributes,
            },
        );
        Some(id)
    }
}

type ImageLoader<'a> = Box<dyn FnMut(&str) -> Option<Vec<u8>> + 'a>;

/// Non-rebuild outputs: load the image bytes and save them under `temp_dir`
pub struct SavingImageSink<'a> {
    temp_dir: PathBuf,
    loader: ImageLoader<'a>,
    pub images: ImageMap,
    pub warnings: Vec<String>,
}

impl<'a> SavingImageSink<'a> {
    /// `loader` receives the percent-decoded `src` and returns the bytes, if found
    pub fn new<F>(temp_dir: impl Into<PathBuf>, loader: F) -> Self
    where
        F: FnMut(&str) -> Option<Vec<u8>> + 'a,
    {
        Self {
            temp_dir: temp_dir.into(),
            loader: Box::new(loader),
            images: ImageMap::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

impl ImageSink for SavingImageSink<'_> {
    fn register(&mut self, found: FoundImage) -> Option<String> {
        if found.src.is_empty() || found.src.starts_with("data:") {
            return None;
        }
        let decoded = percent_decode_str(&found.src).decode_utf8_lossy().to_string();
        let Some(bytes) = (self.loader)(&decoded) else {
            self.warn(format!("Image not found: {}", found.src));
            return None;
        };

        let original_filename = image_filename(&decoded);
        let fallback = Path::new(&original_filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "jpg".to_string());
        let ext = sniff_image_extension(&bytes).unwrap_or(fallback.as_str()).to_string();
        if ext == "emf" || ext == "wmf" {
            self.warn(format!("Skipping vector metafile image {}", original_filename));
            return None;
        }

        let id = placeholder::new_id();
        match save_image(&self.temp_dir, &id, &ext, &bytes) {
            Ok(saved_path) => {
                self.images.insert(
                    id.clone(),
                    ImageRecord::Saved {
                        saved_path,
                        original_filename,
                        content_type: content_type_for(&ext).to_string(),
                        width: None,
                        height: None,
                    },
                );
                Some(id)
            }
            Err(e) => {
                self.warn(format!("Failed to save image {}: {}", found.src, e));
                None
            }
        }
    }
}

/// Last path segment of an image reference, without query
fn image_filename(src: &str) -> String {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "image.png".to_string(),
    }
}

/// Detect the image format from its magic bytes
pub fn sniff_image_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        Some("tiff")
    } else if bytes.len() >= 44 && bytes[0..4] == [0x01, 0, 0, 0] && &bytes[40..44] == b" EMF" {
        Some("emf")
    } else {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]).to_lowercase();
        (head.contains("<svg") || (head.starts_with("<?xml") && head.contains("svg"))).then_some("svg")
    }
}

/// Media type for an image extension
pub fn content_type_for(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Write image bytes as `<temp_dir>/<id>.<ext>`
pub fn save_image(temp_dir: &Path, id: &str, ext: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    fs::create_dir_all(temp_dir)?;
    let path = temp_dir.join(format!("{}.{}", id, ext));
    fs::write(&path, bytes)?;
    Ok(path)
}

/// Read one entry of a zip archive by its full path
pub fn read_archive_entry(archive_path: &Path, entry: &str) -> Result<Vec<u8>, DocumentError> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    let mut file = archive.by_name(entry)?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// How images of an EPUB fragment are carried
#[derive(Debug, Clone)]
pub enum ImageMode {
    /// Keep original references for the rebuild
    Rebuild,
    /// Extract bytes into the given directory
    Save(PathBuf),
}

/// Read one XHTML document of an EPUB and extract its text
///
/// Returns the extraction together with the fragment's raw bytes.
pub fn read_epub_fragment(
    book_path: &Path,
    fragment_path: &str,
    mode: &ImageMode,
) -> Result<(Extracted, Vec<u8>), DocumentError> {
    let mut archive = ZipArchive::new(File::open(book_path)?)?;
    let raw = {
        let mut file = archive.by_name(fragment_path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        bytes
    };
    let (markup, decode_warning) = text::decode_bytes(&raw);
    let mut extracted = match mode {
        ImageMode::Rebuild => {
            let mut sink = SourceImageSink::default();
            let text = html::extract_text(&markup, &mut sink)?;
            Extracted {
                text,
                images: sink.images,
                warnings: Vec::new(),
            }
        }
        ImageMode::Save(temp_dir) => {
            let base = paths::parent_dir(fragment_path);
            let mut sink = SavingImageSink::new(temp_dir.clone(), |src: &str| {
                let candidates = [
                    paths::join(&base, src),
                    paths::normalize(src.trim_start_matches('/')),
                ];
                candidates.iter().find_map(|candidate| {
                    let mut file = archive.by_name(candidate).ok()?;
                    let mut bytes = Vec::new();
                    file.read_to_end(&mut bytes).ok()?;
                    Some(bytes)
                })
            });
            let text = html::extract_text(&markup, &mut sink)?;
            Extracted {
                text,
                images: std::mem::take(&mut sink.images),
                warnings: std::mem::take(&mut sink.warnings),
            }
        }
    };
    if let Some(warning) = decode_warning {
        extracted.warnings.insert(0, warning);
    }
    Ok((extracted, raw))
}

/// Read a standalone input file according to its extension
pub fn read_file(path: &Path, temp_dir: &Path) -> Result<Extracted, DocumentError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "md" => {
            let (text, warning) = text::read_text_file(path)?;
            Ok(Extracted {
                text,
                images: ImageMap::new(),
                warnings: warning.into_iter().collect(),
            })
        }
        "docx" => docx::read_docx(path, temp_dir),
        "html" | "htm" | "xhtml" => {
            let (markup, warning) = text::read_text_file(path)?;
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let mut sink = SavingImageSink::new(temp_dir, |src: &str| {
                fs::read(base.join(src.trim_start_matches('/'))).ok()
            });
            let text = html::extract_text(&markup, &mut sink)?;
            let mut warnings: Vec<String> = warning.into_iter().collect();
            warnings.append(&mut sink.warnings);
            Ok(Extracted {
                text,
                images: std::mem::take(&mut sink.images),
                warnings,
            })
        }
        other => Err(DocumentError::Unsupported(format!(
            "{} (extension '{}')",
            path.display(),
            other
        ))),
    }
}
