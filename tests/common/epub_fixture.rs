/*!
 * In-memory EPUB fixtures
 */

use anyhow::Result;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// One XHTML chapter of a fixture book
#[derive(Debug, Clone)]
pub struct Chapter {
    /// Path relative to `OEBPS/`
    pub href: String,
    pub nav_title: String,
    pub body: String,
}

/// Builds a small EPUB 3 book under `OEBPS/`
#[derive(Debug, Clone)]
pub struct EpubBuilder {
    title: String,
    language: String,
    chapters: Vec<Chapter>,
    with_nav: bool,
    with_ncx: bool,
    images: Vec<(String, Vec<u8>)>,
}

pub const IDENTIFIER: &str = "urn:uuid:11111111-2222-3333-4444-555555555555";

impl EpubBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            language: "en".to_string(),
            chapters: Vec::new(),
            with_nav: true,
            with_ncx: false,
            images: Vec::new(),
        }
    }

    pub fn chapter(mut self, href: &str, nav_title: &str, body: &str) -> Self {
        self.chapters.push(Chapter {
            href: href.to_string(),
            nav_title: nav_title.to_string(),
            body: body.to_string(),
        });
        self
    }

    pub fn without_nav(mut self) -> Self {
        self.with_nav = false;
        self
    }

    pub fn with_ncx(mut self) -> Self {
        self.with_ncx = true;
        self
    }

    /// Image under `OEBPS/`, e.g. `Images/cover.png`
    pub fn image(mut self, href: &str, bytes: &[u8]) -> Self {
        self.images.push((href.to_string(), bytes.to_vec()));
        self
    }

    pub fn chapter_xhtml(chapter: &Chapter) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head><title>{}</title></head>\n<body>\n{}\n</body>\n</html>\n",
            chapter.nav_title, chapter.body
        )
    }

    fn nav_xhtml(&self) -> String {
        let items: String = self
            .chapters
            .iter()
            .map(|c| format!("      <li><a href=\"{}\">{}</a></li>\n", c.href, c.nav_title))
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\n<head><title>Contents</title></head>\n<body>\n  <nav epub:type=\"toc\" id=\"toc\">\n    <ol>\n{}    </ol>\n  </nav>\n</body>\n</html>\n",
            items
        )
    }

    fn ncx(&self) -> String {
        let points: String = self
            .chapters
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "    <navPoint id=\"np{n}\" playOrder=\"{n}\"><navLabel><text>{}</text></navLabel><content src=\"{}\"/></navPoint>\n",
                    c.nav_title,
                    c.href,
                    n = i + 1
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n  <head><meta name=\"dtb:uid\" content=\"{}\"/></head>\n  <docTitle><text>{}</text></docTitle>\n  <navMap>\n{}  </navMap>\n</ncx>\n",
            IDENTIFIER, self.title, points
        )
    }

    fn opf(&self) -> String {
        let mut manifest = String::new();
        let mut spine = String::new();
        if self.with_nav {
            manifest.push_str("    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n");
        }
        if self.with_ncx {
            manifest.push_str("    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n");
        }
        for (i, chapter) in self.chapters.iter().enumerate() {
            manifest.push_str(&format!(
                "    <item id=\"ch{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                i + 1,
                chapter.href
            ));
            spine.push_str(&format!("    <itemref idref=\"ch{}\"/>\n", i + 1));
        }
        for (i, (href, _)) in self.images.iter().enumerate() {
            manifest.push_str(&format!(
                "    <item id=\"img{}\" href=\"{}\" media-type=\"image/png\"/>\n",
                i + 1,
                href
            ));
        }
        let toc = if self.with_ncx { " toc=\"ncx\"" } else { "" };
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"bookid\">\n  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n    <dc:identifier id=\"bookid\">{}</dc:identifier>\n    <dc:title>{}</dc:title>\n    <dc:language>{}</dc:language>\n    <dc:creator>Test Author</dc:creator>\n  </metadata>\n  <manifest>\n{}  </manifest>\n  <spine{}>\n{}  </spine>\n</package>\n",
            IDENTIFIER, self.title, self.language, manifest, toc, spine
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;
        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(
            b"<?xml version=\"1.0\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>\n",
        )?;
        zip.start_file("OEBPS/content.opf", deflated)?;
        zip.write_all(self.opf().as_bytes())?;
        if self.with_nav {
            zip.start_file("OEBPS/nav.xhtml", deflated)?;
            zip.write_all(self.nav_xhtml().as_bytes())?;
        }
        if self.with_ncx {
            zip.start_file("OEBPS/toc.ncx", deflated)?;
            zip.write_all(self.ncx().as_bytes())?;
        }
        for chapter in &self.chapters {
            zip.start_file(format!("OEBPS/{}", chapter.href), deflated)?;
            zip.write_all(Self::chapter_xhtml(chapter).as_bytes())?;
        }
        for (href, bytes) in &self.images {
            zip.start_file(format!("OEBPS/{}", href), stored)?;
            zip.write_all(bytes)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    /// Write the book to `dir/name`
    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, self.to_bytes()?)?;
        Ok(path)
    }
}

/// Three chapters, each with a heading and two paragraphs
pub fn three_chapter_book() -> EpubBuilder {
    EpubBuilder::new("Weather Book")
        .chapter(
            "Text/chapter1.xhtml",
            "Chapter One",
            "<h1>Chapter One</h1>\n<p>The sky was grey.</p>\n<p>It rained all day.</p>",
        )
        .chapter(
            "Text/chapter2.xhtml",
            "Chapter Two",
            "<h1>Chapter Two</h1>\n<p>The sun came out.</p>\n<p>Everyone went outside.</p>",
        )
        .chapter(
            "Text/chapter3.xhtml",
            "Chapter Three",
            "<h1>Chapter Three</h1>\n<p>Snow fell at night.</p>",
        )
}

/// Read one entry of an archive held in memory
pub fn entry_bytes(archive: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).ok()?;
    let mut file = zip.by_name(name).ok()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).ok()?;
    Some(bytes)
}

pub fn entry_text(archive: &[u8], name: &str) -> Option<String> {
    entry_bytes(archive, name).map(|b| String::from_utf8_lossy(&b).into_owned())
}

/// Entry names in archive order
pub fn entry_names(archive: &[u8]) -> Vec<String> {
    let Ok(mut zip) = ZipArchive::new(Cursor::new(archive)) else {
        return Vec::new();
    };
    (0..zip.len())
        .filter_map(|i| zip.by_index(i).ok().map(|f| f.name().to_string()))
        .collect()
}
