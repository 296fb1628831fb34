/*!
 * EPUB reassembly.
 *
 * Once every fragment of a book has a result, `EpubReassembler::rebuild`
 * writes a new archive: translated fragments are rendered to XHTML under a
 * suffixed name, untranslated ones keep their bytes and path, every other
 * entry is copied raw, and the package descriptor plus the navigation
 * documents are rewritten to match.
 */

use chrono::Utc;
use log::{debug, info, warn};
use quick_xml::escape::escape;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::documents::{html, text};
use crate::errors::EpubError;
use crate::file_utils::add_translated_suffix;
use crate::placeholder::{ImageMap, ImageRecord};

pub mod navigation;
pub mod package;
pub mod paths;
pub mod xhtml;

use navigation::{LinkRewrite, TocEntry};
use package::{ManifestItem, NCX_MEDIA_TYPE, Package, XHTML_MEDIA_TYPE, find_entry_name, read_entry};

const MIMETYPE: &[u8] = b"application/epub+zip";
const STYLESHEET_HREF: &str = "Styles/stylesheet.css";
const DEFAULT_STYLESHEET: &str = "body { margin: 0 5%; line-height: 1.5; }\nimg { max-width: 100%; height: auto; }\n";

/// Navigation files located before translation starts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildMetadata {
    pub nav_path: Option<String>,
    pub ncx_path: Option<String>,
    pub opf_dir: String,
    pub nav_item_id: Option<String>,
    pub ncx_item_id: Option<String>,
}

/// What a fragment task produced
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentContent {
    /// Translated text with image placeholders
    Translated(String),
    /// The fragment's original bytes
    Original(Vec<u8>),
}

/// Outcome of one EPUB fragment
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentResult {
    /// Archive path of the source document
    pub original_path: String,
    /// `None` keeps the source entry unchanged
    pub content: Option<FragmentContent>,
    pub images: ImageMap,
    pub warning: Option<String>,
}

impl FragmentResult {
    pub fn translated(original_path: impl Into<String>, text: String, images: ImageMap) -> Self {
        Self {
            original_path: original_path.into(),
            content: Some(FragmentContent::Translated(text)),
            images,
            warning: None,
        }
    }

    pub fn original(original_path: impl Into<String>, bytes: Vec<u8>, warning: Option<String>) -> Self {
        Self {
            original_path: original_path.into(),
            content: Some(FragmentContent::Original(bytes)),
            images: ImageMap::new(),
            warning,
        }
    }

    pub fn with_warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }

    pub fn is_original_content(&self) -> bool {
        matches!(self.content, Some(FragmentContent::Original(_)))
    }
}

/// Caller-provided metadata replacing what the source book declares
#[derive(Debug, Clone, Default)]
pub struct MetadataOverrides {
    pub title: Option<String>,
    pub language: Option<String>,
}

enum OutputData {
    Bytes(Vec<u8>),
    /// Name of a source entry copied without recompression
    RawCopy(String),
}

struct Output {
    path: String,
    data: OutputData,
}

/// A manifest item of the rebuilt package
#[derive(Debug, Clone)]
struct NewItem {
    id: String,
    href: String,
    full_path: String,
    media_type: String,
    properties: Vec<String>,
}

impl NewItem {
    fn kept(item: &ManifestItem) -> Self {
        Self {
            id: item.id.clone(),
            href: item.href.clone(),
            full_path: item.full_path.clone(),
            media_type: item.media_type.clone(),
            properties: item.properties.iter().filter(|p| *p != "nav").cloned().collect(),
        }
    }

    fn added(id: String, full_path: &str, opf_dir: &str, media_type: &str) -> Self {
        Self {
            id,
            href: paths::to_href(&paths::relative(full_path, opf_dir), None),
            full_path: full_path.to_string(),
            media_type: media_type.to_string(),
            properties: Vec::new(),
        }
    }
}

/// Hands out manifest ids that are not taken yet
struct IdAllocator {
    used: HashSet<String>,
}

impl IdAllocator {
    fn claim(&mut self, wanted: &str) -> String {
        let mut candidate = wanted.to_string();
        let mut n = 1;
        while self.used.contains(&candidate) {
            candidate = format!("{}_{}", wanted, n);
            n += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Everything the new archive will contain
struct Assembly {
    opf_dir: String,
    outputs: Vec<Output>,
    written: HashSet<String>,
    items: Vec<NewItem>,
    /// Original archive path to new archive path
    filename_map: HashMap<String, String>,
    /// Title per original archive path
    titles: HashMap<String, String>,
}

impl Assembly {
    fn push(&mut self, path: String, data: OutputData) -> bool {
        if !self.written.insert(path.clone()) {
            warn!("Duplicate archive entry {} skipped", path);
            return false;
        }
        self.outputs.push(Output { path, data });
        true
    }

    fn id_for_path(&self, path: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.full_path == path)
            .map(|item| item.id.as_str())
    }
}

/// Rebuilds a book from its fragment results
#[derive(Debug, Clone, Default)]
pub struct EpubReassembler {
    overrides: MetadataOverrides,
}

impl EpubReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: MetadataOverrides) -> Self {
        Self { overrides }
    }

    /// Produce the bytes of the rebuilt archive
    pub fn rebuild(
        &self,
        original_archive_path: &Path,
        results: &[FragmentResult],
        metadata: &BuildMetadata,
    ) -> Result<Vec<u8>, EpubError> {
        let mut archive = ZipArchive::new(File::open(original_archive_path)?)?;
        let package = Package::from_archive(&mut archive)?;
        if package.opf_dir != metadata.opf_dir {
            debug!(
                "Package directory is '{}' but the plan said '{}'",
                package.opf_dir, metadata.opf_dir
            );
        }
        let opf_dir = package.opf_dir.clone();

        let nav_source = load_document(&mut archive, metadata.nav_path.as_deref());
        let ncx_source = load_document(&mut archive, metadata.ncx_path.as_deref());
        let canonical = canonical_titles(nav_source.as_ref(), ncx_source.as_ref());

        let navigation_paths: HashSet<String> = [&nav_source, &ncx_source]
            .into_iter()
            .flatten()
            .map(|(path, _)| path.clone())
            .collect();
        let mut ids = IdAllocator {
            used: package
                .manifest
                .iter()
                .filter(|item| !navigation_paths.contains(&item.full_path) && !item.has_property("nav"))
                .map(|item| item.id.clone())
                .collect(),
        };

        let mut assembly = Assembly {
            opf_dir: opf_dir.clone(),
            outputs: Vec::new(),
            written: HashSet::from([
                "mimetype".to_string(),
                package.opf_path.clone(),
            ]),
            items: Vec::new(),
            filename_map: HashMap::new(),
            titles: HashMap::new(),
        };

        let added_images = add_new_images(&mut assembly, &mut ids, results);
        let language = self
            .overrides
            .language
            .clone()
            .or_else(|| package.metadata.language.clone())
            .unwrap_or_else(|| "en".to_string());

        let processed = place_fragments(&mut assembly, &package, results, &canonical, &added_images, &language);
        if processed.translated > 0 && package.item_by_path(&paths::join(&opf_dir, STYLESHEET_HREF)).is_none() {
            let path = paths::join(&opf_dir, STYLESHEET_HREF);
            if assembly.push(path.clone(), OutputData::Bytes(DEFAULT_STYLESHEET.as_bytes().to_vec())) {
                let id = ids.claim("stylesheet");
                assembly.items.push(NewItem::added(id, &path, &opf_dir, "text/css"));
            }
        }

        copy_remaining(&mut assembly, &archive, &package, &processed.paths, &navigation_paths);

        let book_title = self
            .overrides
            .title
            .clone()
            .or_else(|| package.metadata.title.clone())
            .unwrap_or_else(|| {
                original_archive_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Untitled".to_string())
            });
        let identifier = package
            .metadata
            .identifier
            .clone()
            .unwrap_or_else(|| format!("urn:uuid:{}", uuid::Uuid::new_v4()));

        let toc_list = spine_toc_list(&assembly, &package, &canonical);
        let nav = write_nav(
            &mut assembly,
            &mut ids,
            nav_source.as_ref(),
            metadata,
            &toc_list,
            &book_title,
            &language,
        );
        let ncx_id = write_ncx(
            &mut assembly,
            &mut ids,
            ncx_source.as_ref(),
            metadata,
            &package,
            nav.as_ref(),
            &toc_list,
            &identifier,
            &book_title,
        );

        let spine = rebuild_spine(&assembly, &package, &toc_list, nav.as_ref().map(|(path, _)| path.as_str()));
        if spine.is_empty() {
            warn!("{}: rebuilt book has an empty spine", original_archive_path.display());
        }

        let opf = package_document(
            &assembly.items,
            &spine,
            ncx_id.as_deref(),
            &PackageFields {
                identifier: &identifier,
                title: &book_title,
                language: &language,
                creator: package.metadata.creator.as_deref().unwrap_or("Translator"),
            },
        );
        assembly.outputs.push(Output {
            path: package.opf_path.clone(),
            data: OutputData::Bytes(opf.into_bytes()),
        });

        copy_unlisted_entries(&mut assembly, &archive, &package, &processed.paths, &navigation_paths);

        let bytes = write_archive(&mut archive, assembly.outputs)?;
        info!(
            "Rebuilt {}: {} translated, {} original, {} manifest items",
            original_archive_path.display(),
            processed.translated,
            processed.original,
            assembly.items.len()
        );
        Ok(bytes)
    }
}

/// Decoded navigation document, if the book has it
fn load_document(archive: &mut ZipArchive<File>, path: Option<&str>) -> Option<(String, String)> {
    let path = paths::normalize(path?);
    find_entry_name(archive, &path)?;
    match read_entry(archive, &path) {
        Ok(bytes) => Some((path, text::decode_bytes(&bytes).0)),
        Err(e) => {
            warn!("Could not read {}: {}", path, e);
            None
        }
    }
}

/// Titles the original navigation gives to each document
fn canonical_titles(nav: Option<&(String, String)>, ncx: Option<&(String, String)>) -> HashMap<String, String> {
    let from_nav = nav.map(|(path, xml)| navigation::nav_entries(xml, path));
    let entries = match from_nav {
        Some(Ok(entries)) if !entries.is_empty() => entries,
        other => {
            if let Some(Err(e)) = other {
                warn!("Unreadable navigation document: {}", e);
            }
            match ncx.map(|(path, xml)| navigation::ncx_entries(xml, path)) {
                Some(Ok(entries)) => entries,
                Some(Err(e)) => {
                    warn!("Unreadable NCX document: {}", e);
                    Vec::new()
                }
                None => Vec::new(),
            }
        }
    };
    navigation::titles_by_path(&entries)
}

/// Saved images become new manifest items under `Images/`
fn add_new_images(assembly: &mut Assembly, ids: &mut IdAllocator, results: &[FragmentResult]) -> HashMap<String, String> {
    let mut added = HashMap::new();
    let mut n = 0;
    for (id, record) in results.iter().flat_map(|r| r.images.iter()) {
        let ImageRecord::Saved {
            saved_path,
            content_type,
            ..
        } = record
        else {
            continue;
        };
        if added.contains_key(id) {
            continue;
        }
        let bytes = match fs::read(saved_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Image {} is gone ({}): {}", id, saved_path.display(), e);
                continue;
            }
        };
        let ext = saved_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "img".to_string());
        let full_path = paths::join(&assembly.opf_dir, &format!("Images/{}.{}", id, ext));
        if !assembly.push(full_path.clone(), OutputData::Bytes(bytes)) {
            continue;
        }
        n += 1;
        let item_id = ids.claim(&format!("new_img_{}_{}", &id[..id.len().min(6)], n));
        let item = NewItem::added(item_id, &full_path, &assembly.opf_dir, content_type);
        assembly.items.push(item);
        added.insert(id.clone(), full_path);
    }
    added
}

struct Placed {
    paths: HashSet<String>,
    translated: usize,
    original: usize,
}

fn first_usable_title(candidates: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
}

/// Fragment results become documents, renamed when translated
fn place_fragments(
    assembly: &mut Assembly,
    package: &Package,
    results: &[FragmentResult],
    canonical: &HashMap<String, String>,
    added_images: &HashMap<String, String>,
    language: &str,
) -> Placed {
    let mut placed = Placed {
        paths: HashSet::new(),
        translated: 0,
        original: 0,
    };

    for result in results {
        let Some(item) = package.item_by_path(&result.original_path) else {
            warn!("{} is not in the manifest, dropped", result.original_path);
            continue;
        };
        let Some(content) = &result.content else {
            warn!("{} has no result, keeping the source document", item.full_path);
            continue;
        };
        placed.paths.insert(item.full_path.clone());
        if let Some(warning) = &result.warning {
            debug!("{}: {}", item.full_path, warning);
        }
        let canonical_title = canonical.get(&item.full_path).cloned();

        let (new_item, bytes, title) = match content {
            FragmentContent::Original(bytes) => {
                let (markup, _) = text::decode_bytes(bytes);
                let title = first_usable_title([
                    canonical_title,
                    html::first_heading(&markup, 6),
                    html::document_title(&markup),
                    Some(xhtml::title_from_stem(&item.full_path)),
                ])
                .unwrap_or_else(|| format!("Document {}", item.id));
                placed.original += 1;
                (NewItem::kept(item), bytes.clone(), title)
            }
            FragmentContent::Translated(translated) => {
                let href = add_translated_suffix(&item.href);
                let full_path = paths::join(&assembly.opf_dir, &paths::split_href(&href).0);
                let provisional = first_usable_title([
                    canonical_title.clone(),
                    Some(xhtml::title_from_stem(&full_path)),
                ])
                .unwrap_or_else(|| format!("Document {}", item.id));

                let links = xhtml::ImageLinks {
                    records: &result.images,
                    added: added_images,
                };
                let mut page = xhtml::Page {
                    title: &provisional,
                    language,
                    path: &full_path,
                    opf_dir: &assembly.opf_dir,
                };
                let mut document = xhtml::render_document(translated, &links, &page);
                let heading = html::first_heading(&document, 1).filter(|h| !html::is_generic_title(h));
                let title = match heading {
                    Some(heading) if heading != provisional => {
                        page.title = &heading;
                        document = xhtml::render_document(translated, &links, &page);
                        heading
                    }
                    _ => provisional.clone(),
                };
                placed.translated += 1;
                let new_item = NewItem {
                    id: item.id.clone(),
                    href,
                    full_path,
                    media_type: XHTML_MEDIA_TYPE.to_string(),
                    properties: Vec::new(),
                };
                (new_item, document.into_bytes(), title)
            }
        };

        if !assembly.push(new_item.full_path.clone(), OutputData::Bytes(bytes)) {
            continue;
        }
        assembly.filename_map.insert(item.full_path.clone(), new_item.full_path.clone());
        assembly.titles.insert(item.full_path.clone(), title);
        assembly.items.push(new_item);
    }
    placed
}

fn is_navigation(item: &ManifestItem, navigation_paths: &HashSet<String>) -> bool {
    item.has_property("nav") || item.media_type == NCX_MEDIA_TYPE || navigation_paths.contains(&item.full_path)
}

/// Every other manifest item is copied unchanged
fn copy_remaining(
    assembly: &mut Assembly,
    archive: &ZipArchive<File>,
    package: &Package,
    processed: &HashSet<String>,
    navigation_paths: &HashSet<String>,
) {
    for item in &package.manifest {
        if processed.contains(&item.full_path) || is_navigation(item, navigation_paths) {
            continue;
        }
        if assembly.written.contains(&item.full_path) {
            continue;
        }
        let Some(entry) = find_entry_name(archive, &item.full_path) else {
            warn!("Manifest item {} has no archive entry, dropped", item.full_path);
            continue;
        };
        if assembly.push(item.full_path.clone(), OutputData::RawCopy(entry)) {
            assembly
                .filename_map
                .insert(item.full_path.clone(), item.full_path.clone());
            assembly.items.push(NewItem::kept(item));
        }
    }
}

/// Entries outside the manifest (META-INF and the like) are copied unchanged
fn copy_unlisted_entries(
    assembly: &mut Assembly,
    archive: &ZipArchive<File>,
    package: &Package,
    processed: &HashSet<String>,
    navigation_paths: &HashSet<String>,
) {
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    for name in names {
        let path = paths::normalize(&name);
        if name.ends_with('/')
            || path.is_empty()
            || processed.contains(&path)
            || navigation_paths.contains(&path)
            || package.item_by_path(&path).is_some()
            || assembly.written.contains(&path)
        {
            continue;
        }
        assembly.push(path, OutputData::RawCopy(name));
    }
}

/// Spine documents with their titles, in reading order
fn spine_toc_list(assembly: &Assembly, package: &Package, canonical: &HashMap<String, String>) -> Vec<TocEntry> {
    let mut seen = HashSet::new();
    let mut list = Vec::new();
    for idref in &package.spine {
        let Some(item) = package.item_by_id(idref) else {
            continue;
        };
        if item.has_property("nav") || !item.is_document() {
            continue;
        }
        let Some(new_path) = assembly.filename_map.get(&item.full_path) else {
            continue;
        };
        if !seen.insert(new_path.clone()) {
            continue;
        }
        let title = first_usable_title([
            assembly.titles.get(&item.full_path).cloned(),
            canonical.get(&item.full_path).cloned(),
            Some(xhtml::title_from_stem(new_path)),
        ])
        .unwrap_or_else(|| format!("Document {}", item.id));
        list.push(TocEntry {
            path: new_path.clone(),
            fragment: None,
            title,
        });
    }
    list
}

/// Rewritten or generated NAV: its archive path and markup
fn write_nav(
    assembly: &mut Assembly,
    ids: &mut IdAllocator,
    source: Option<&(String, String)>,
    metadata: &BuildMetadata,
    toc_list: &[TocEntry],
    book_title: &str,
    language: &str,
) -> Option<(String, String)> {
    let rewritten = source.and_then(|(path, xml)| {
        let rewrite = LinkRewrite {
            filename_map: &assembly.filename_map,
            titles: &assembly.titles,
        };
        match navigation::rewrite_nav(xml, path, &rewrite) {
            Ok(markup) => Some((path.clone(), markup)),
            Err(e) => {
                warn!("Navigation document rewrite failed, generating a new one: {}", e);
                None
            }
        }
    });

    let (path, markup) = match rewritten {
        Some(found) => found,
        None if !toc_list.is_empty() => {
            let path = source
                .map(|(path, _)| path.clone())
                .unwrap_or_else(|| paths::join(&assembly.opf_dir, "nav.xhtml"));
            let markup = navigation::generate_nav(toc_list, &path, book_title, language);
            (path, markup)
        }
        None => return None,
    };

    if !assembly.push(path.clone(), OutputData::Bytes(markup.clone().into_bytes())) {
        return None;
    }
    let id = ids.claim(metadata.nav_item_id.as_deref().unwrap_or("nav"));
    let mut item = NewItem::added(id, &path, &assembly.opf_dir, XHTML_MEDIA_TYPE);
    item.properties.push("nav".to_string());
    assembly.items.push(item);
    Some((path, markup))
}

/// Rewritten or generated NCX; returns its manifest id
#[allow(clippy::too_many_arguments)]
fn write_ncx(
    assembly: &mut Assembly,
    ids: &mut IdAllocator,
    source: Option<&(String, String)>,
    metadata: &BuildMetadata,
    package: &Package,
    nav: Option<&(String, String)>,
    toc_list: &[TocEntry],
    identifier: &str,
    book_title: &str,
) -> Option<String> {
    let rewritten = source.and_then(|(path, xml)| {
        let rewrite = LinkRewrite {
            filename_map: &assembly.filename_map,
            titles: &assembly.titles,
        };
        match navigation::rewrite_ncx(xml, path, &rewrite) {
            Ok(markup) => Some((path.clone(), markup)),
            Err(e) => {
                warn!("NCX rewrite failed, generating a new one: {}", e);
                None
            }
        }
    });

    let (path, markup) = match rewritten {
        Some(found) => found,
        None => {
            let entries = nav
                .and_then(|(path, markup)| navigation::nav_entries(markup, path).ok())
                .filter(|entries| !entries.is_empty())
                .unwrap_or_else(|| toc_list.to_vec());
            if entries.is_empty() {
                return None;
            }
            let path = source
                .map(|(path, _)| path.clone())
                .unwrap_or_else(|| paths::join(&assembly.opf_dir, "toc.ncx"));
            let markup = navigation::generate_ncx(&entries, &path, identifier, book_title);
            (path, markup)
        }
    };

    if !assembly.push(path.clone(), OutputData::Bytes(markup.into_bytes())) {
        return None;
    }
    let wanted = metadata
        .ncx_item_id
        .clone()
        .or_else(|| package.spine_toc.clone())
        .unwrap_or_else(|| "ncx".to_string());
    let id = ids.claim(&wanted);
    assembly
        .items
        .push(NewItem::added(id.clone(), &path, &assembly.opf_dir, NCX_MEDIA_TYPE));
    Some(id)
}

/// Spine idrefs of the rebuilt book, in original order
fn rebuild_spine(assembly: &Assembly, package: &Package, toc_list: &[TocEntry], nav_path: Option<&str>) -> Vec<String> {
    let mut spine = Vec::new();
    for idref in &package.spine {
        let Some(item) = package.item_by_id(idref) else {
            continue;
        };
        let new_path = if item.has_property("nav") {
            nav_path.map(str::to_string)
        } else {
            assembly.filename_map.get(&item.full_path).cloned()
        };
        if let Some(id) = new_path.as_deref().and_then(|p| assembly.id_for_path(p)) {
            spine.push(id.to_string());
        }
    }

    if spine.is_empty() {
        spine = toc_list
            .iter()
            .filter_map(|entry| assembly.id_for_path(&entry.path))
            .map(str::to_string)
            .collect();
    }
    if spine.is_empty() {
        if let Some(item) = assembly
            .items
            .iter()
            .find(|item| item.media_type == XHTML_MEDIA_TYPE && !item.properties.iter().any(|p| p == "nav"))
        {
            spine.push(item.id.clone());
        }
    }
    spine
}

struct PackageFields<'a> {
    identifier: &'a str,
    title: &'a str,
    language: &'a str,
    creator: &'a str,
}

/// The rebuilt package descriptor
fn package_document(items: &[NewItem], spine: &[String], ncx_id: Option<&str>, fields: &PackageFields) -> String {
    let modified = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let mut lines = vec![
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>".to_string(),
        format!(
            "<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"bookid\" xml:lang=\"{}\">",
            escape(fields.language)
        ),
        "  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">".to_string(),
        format!("    <dc:identifier id=\"bookid\">{}</dc:identifier>", escape(fields.identifier)),
        format!("    <dc:title>{}</dc:title>", escape(fields.title)),
        format!("    <dc:language>{}</dc:language>", escape(fields.language)),
        format!("    <dc:creator>{}</dc:creator>", escape(fields.creator)),
        format!("    <meta property=\"dcterms:modified\">{}</meta>", modified),
        "  </metadata>".to_string(),
        "  <manifest>".to_string(),
    ];
    for item in items {
        let properties = if item.properties.is_empty() {
            String::new()
        } else {
            format!(" properties=\"{}\"", escape(&item.properties.join(" ")))
        };
        lines.push(format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{}/>",
            escape(&item.id),
            escape(&item.href),
            escape(&item.media_type),
            properties
        ));
    }
    lines.push("  </manifest>".to_string());
    match ncx_id {
        Some(id) => lines.push(format!("  <spine toc=\"{}\">", escape(id))),
        None => lines.push("  <spine>".to_string()),
    }
    for idref in spine {
        lines.push(format!("    <itemref idref=\"{}\"/>", escape(idref)));
    }
    lines.push("  </spine>".to_string());
    lines.push("</package>".to_string());
    lines.join("\n")
}

/// Write `mimetype` first and uncompressed, then every output in order
fn write_archive(archive: &mut ZipArchive<File>, outputs: Vec<Output>) -> Result<Vec<u8>, EpubError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file("mimetype", stored)?;
    writer.write_all(MIMETYPE)?;

    for output in outputs {
        match output.data {
            OutputData::Bytes(bytes) => {
                writer.start_file(output.path.as_str(), deflated)?;
                writer.write_all(&bytes)?;
            }
            OutputData::RawCopy(name) => {
                let index = archive
                    .index_for_name(&name)
                    .ok_or_else(|| EpubError::Archive(format!("missing entry {}", name)))?;
                let file = archive.by_index_raw(index)?;
                writer.raw_copy_file_rename(file, output.path.as_str())?;
            }
        }
    }

    Ok(writer.finish()?.into_inner())
}
