/*!
 * Package descriptor (OPF) discovery and parsing.
 *
 * The descriptor is located through `META-INF/container.xml`, falling back to
 * the first `*.opf` entry of the archive. Parsing is streaming with quick-xml
 * and only keeps what a rebuild needs: metadata, manifest and spine.
 */

use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

use super::BuildMetadata;
use super::paths;
use crate::errors::EpubError;

pub const CONTAINER_PATH: &str = "META-INF/container.xml";
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// One `<item>` of the manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    pub id: String,
    /// The href exactly as written in the descriptor
    pub href: String,
    /// Decoded archive path
    pub full_path: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    /// Whether the item is an (X)HTML content document
    pub fn is_document(&self) -> bool {
        self.media_type == XHTML_MEDIA_TYPE || self.media_type == "text/html"
    }
}

/// Dublin Core fields carried into the rebuilt package
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageMetadata {
    pub title: Option<String>,
    pub language: Option<String>,
    pub creator: Option<String>,
    pub identifier: Option<String>,
}

/// Parsed package descriptor
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub opf_path: String,
    pub opf_dir: String,
    pub metadata: PackageMetadata,
    pub manifest: Vec<ManifestItem>,
    /// Spine idrefs in reading order
    pub spine: Vec<String>,
    /// The spine's `toc` attribute
    pub spine_toc: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MetaField {
    Title,
    Language,
    Creator,
    Identifier,
}

impl MetaField {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"language" => Some(Self::Language),
            b"creator" => Some(Self::Creator),
            b"identifier" => Some(Self::Identifier),
            _ => None,
        }
    }
}

fn xml_error(file: &str, error: impl std::fmt::Display) -> EpubError {
    EpubError::Xml {
        file: file.to_string(),
        message: error.to_string(),
    }
}

/// Value of the attribute whose local name is `name`
pub(crate) fn attribute(element: &BytesStart, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

impl Package {
    /// Open an EPUB file and parse its package descriptor
    pub fn open(book_path: &Path) -> Result<Self, EpubError> {
        let mut archive = ZipArchive::new(File::open(book_path)?)?;
        Self::from_archive(&mut archive)
    }

    pub fn from_archive<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Self, EpubError> {
        let opf_path = locate_opf(archive)?;
        let bytes = read_entry(archive, &opf_path)?;
        let xml = String::from_utf8_lossy(&bytes);
        Self::parse(&opf_path, &xml)
    }

    /// Parse descriptor XML found at `opf_path`
    pub fn parse(opf_path: &str, xml: &str) -> Result<Self, EpubError> {
        let opf_dir = paths::parent_dir(opf_path);
        let mut package = Package {
            opf_path: paths::normalize(opf_path),
            opf_dir: opf_dir.clone(),
            ..Default::default()
        };

        let mut reader = Reader::from_str(xml);
        let mut unique_identifier: Option<String> = None;
        let mut identifiers: Vec<(Option<String>, String)> = Vec::new();
        let mut capture: Option<(MetaField, Option<String>, String)> = None;
        let mut in_metadata = false;

        loop {
            match reader.read_event().map_err(|e| xml_error(opf_path, e))? {
                Event::Start(e) => {
                    let local = e.local_name();
                    match local.as_ref() {
                        b"metadata" => in_metadata = true,
                        name if in_metadata => {
                            if let Some(field) = MetaField::from_local_name(name) {
                                capture = Some((field, attribute(&e, b"id"), String::new()));
                            }
                        }
                        _ => package.visit(&e, &mut unique_identifier),
                    }
                }
                Event::Empty(e) => package.visit(&e, &mut unique_identifier),
                Event::Text(t) => {
                    if let Some((_, _, text)) = capture.as_mut() {
                        let value = t.unescape().map_err(|e| xml_error(opf_path, e))?;
                        text.push_str(&value);
                    }
                }
                Event::CData(c) => {
                    if let Some((_, _, text)) = capture.as_mut() {
                        text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::End(e) => {
                    let local = e.local_name();
                    if local.as_ref() == b"metadata" {
                        in_metadata = false;
                    } else if let Some((field, id, text)) = capture.take() {
                        let value = text.trim().to_string();
                        if !value.is_empty() {
                            package.store(field, id, value, &mut identifiers);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let identifier = identifiers
            .iter()
            .find(|(id, _)| id.is_some() && *id == unique_identifier)
            .or_else(|| identifiers.first())
            .map(|(_, value)| value.clone());
        package.metadata.identifier = identifier;

        if package.manifest.is_empty() {
            warn!("Package descriptor {} has an empty manifest", opf_path);
        }
        debug!(
            "Parsed {}: {} manifest items, {} spine entries",
            opf_path,
            package.manifest.len(),
            package.spine.len()
        );
        Ok(package)
    }

    fn visit(&mut self, element: &BytesStart, unique_identifier: &mut Option<String>) {
        match element.local_name().as_ref() {
            b"package" => *unique_identifier = attribute(element, b"unique-identifier"),
            b"item" => {
                let (Some(id), Some(href)) = (attribute(element, b"id"), attribute(element, b"href")) else {
                    return;
                };
                let (decoded, _) = paths::split_href(&href);
                self.manifest.push(ManifestItem {
                    id,
                    full_path: paths::join(&self.opf_dir, &decoded),
                    href,
                    media_type: attribute(element, b"media-type").unwrap_or_default(),
                    properties: attribute(element, b"properties")
                        .map(|p| p.split_whitespace().map(str::to_string).collect())
                        .unwrap_or_default(),
                });
            }
            b"spine" => self.spine_toc = attribute(element, b"toc"),
            b"itemref" => {
                if let Some(idref) = attribute(element, b"idref") {
                    self.spine.push(idref);
                }
            }
            _ => {}
        }
    }

    fn store(
        &mut self,
        field: MetaField,
        id: Option<String>,
        value: String,
        identifiers: &mut Vec<(Option<String>, String)>,
    ) {
        let slot = match field {
            MetaField::Title => &mut self.metadata.title,
            MetaField::Language => &mut self.metadata.language,
            MetaField::Creator => &mut self.metadata.creator,
            MetaField::Identifier => {
                identifiers.push((id, value));
                return;
            }
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    pub fn item_by_id(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Manifest item for an archive path, ignoring case as a fallback
    pub fn item_by_path(&self, path: &str) -> Option<&ManifestItem> {
        let wanted = paths::normalize(path);
        self.manifest
            .iter()
            .find(|item| item.full_path == wanted)
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.full_path.eq_ignore_ascii_case(&wanted))
            })
    }

    /// The EPUB3 navigation document
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.has_property("nav"))
    }

    /// The legacy NCX table of contents
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.media_type == NCX_MEDIA_TYPE)
            .or_else(|| self.spine_toc.as_deref().and_then(|id| self.item_by_id(id)))
    }

    /// Navigation files and item ids needed by the reassembler
    pub fn build_metadata(&self) -> BuildMetadata {
        let nav = self.nav_item();
        let ncx = self.ncx_item();
        BuildMetadata {
            nav_path: nav.map(|item| item.full_path.clone()),
            ncx_path: ncx.map(|item| item.full_path.clone()),
            opf_dir: self.opf_dir.clone(),
            nav_item_id: nav.map(|item| item.id.clone()),
            ncx_item_id: ncx.map(|item| item.id.clone()),
        }
    }

    /// Archive paths of the spine's content documents, navigation excluded
    pub fn spine_documents(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.spine
            .iter()
            .filter_map(|idref| self.item_by_id(idref))
            .filter(|item| item.is_document() && !item.has_property("nav"))
            .filter(|item| seen.insert(item.full_path.clone()))
            .map(|item| item.full_path.clone())
            .collect()
    }
}

/// Actual entry name for an archive path, matching case-insensitively as a fallback
pub fn find_entry_name<R: Read + Seek>(archive: &ZipArchive<R>, path: &str) -> Option<String> {
    let wanted = paths::normalize(path);
    if archive.index_for_name(&wanted).is_some() {
        return Some(wanted);
    }
    archive
        .file_names()
        .find(|name| paths::normalize(name).eq_ignore_ascii_case(&wanted))
        .map(str::to_string)
}

/// Read one archive entry fully
pub fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>, EpubError> {
    let name = find_entry_name(archive, path)
        .ok_or_else(|| EpubError::Archive(format!("missing entry {}", path)))?;
    let mut file = archive.by_name(&name)?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Archive path of the package descriptor
pub fn locate_opf<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, EpubError> {
    if find_entry_name(archive, CONTAINER_PATH).is_some() {
        let bytes = read_entry(archive, CONTAINER_PATH)?;
        let xml = String::from_utf8_lossy(&bytes);
        match rootfile_path(&xml) {
            Ok(Some(path)) if find_entry_name(archive, &path).is_some() => return Ok(path),
            Ok(Some(path)) => warn!("container.xml points to missing {}", path),
            Ok(None) => warn!("container.xml lists no rootfile"),
            Err(e) => warn!("Unreadable container.xml: {}", e),
        }
    }

    archive
        .file_names()
        .find(|name| name.to_lowercase().ends_with(".opf"))
        .map(paths::normalize)
        .ok_or_else(|| EpubError::MissingPackage("no container rootfile and no .opf entry".into()))
}

fn rootfile_path(xml: &str) -> Result<Option<String>, EpubError> {
    let mut reader = Reader::from_str(xml);
    let mut first: Option<String> = None;
    loop {
        match reader.read_event().map_err(|e| xml_error(CONTAINER_PATH, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                let Some(path) = attribute(&e, b"full-path") else {
                    continue;
                };
                let path = paths::normalize(&path);
                if attribute(&e, b"media-type").as_deref() == Some("application/oebps-package+xml") {
                    return Ok(Some(path));
                }
                first.get_or_insert(path);
            }
            Event::Eof => return Ok(first),
            _ => {}
        }
    }
}
