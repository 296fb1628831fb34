/*!
 * Tests for the input readers
 */

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use yadtwai::documents::docx::TABLE_MARKER;
use yadtwai::documents::{self, ImageMode};
use yadtwai::errors::DocumentError;
use yadtwai::placeholder::{self, ImageRecord};

use crate::common::epub_fixture::EpubBuilder;
use crate::common::{create_temp_dir, create_test_file};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

fn docx_bytes() -> Vec<u8> {
    let document = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
    xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
    xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
    xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <w:body>
    <w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Storm Report</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Winds </w:t></w:r><w:r><w:t>were strong.</w:t></w:r></w:p>
    <w:p><w:r><w:drawing><wp:inline><wp:extent cx="952500" cy="476250"/><a:graphic><a:graphicData><a:blip r:embed="rId5"/></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>
    <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
    <w:p><w:r><w:t>After the table.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
    let rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
</Relationships>"#;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(document.as_bytes()).unwrap();
    zip.start_file("word/_rels/document.xml.rels", options).unwrap();
    zip.write_all(rels.as_bytes()).unwrap();
    zip.start_file("word/media/image1.png", options).unwrap();
    zip.write_all(PNG_BYTES).unwrap();
    zip.finish().unwrap().into_inner()
}

#[test]
fn test_readFile_docx_shouldExtractHeadingsImagesAndTables() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("report.docx");
    std::fs::write(&path, docx_bytes()).unwrap();
    let temp = dir.path().join("images");

    let extracted = documents::read_file(&path, &temp).unwrap();
    assert_eq!(extracted.images.len(), 1);
    let (id, record) = extracted.images.iter().next().unwrap();
    match record {
        ImageRecord::Saved { saved_path, original_filename, width, height, .. } => {
            assert!(saved_path.exists());
            assert_eq!(original_filename, "image1.png");
            assert_eq!(*width, Some(100));
            assert_eq!(*height, Some(50));
        }
        other => panic!("unexpected record: {:?}", other),
    }

    let lines: Vec<&str> = extracted.text.lines().collect();
    assert_eq!(lines[0], "# Storm Report");
    assert!(extracted.text.contains("Winds were strong."));
    assert!(extracted.text.contains(&placeholder::encode(id)));
    assert!(extracted.text.contains(TABLE_MARKER));
    assert!(!extracted.text.contains("cell"));
    assert!(extracted.text.ends_with("After the table."));
}

#[test]
fn test_readFile_html_shouldSaveLocalImages() {
    let dir = create_temp_dir().unwrap();
    std::fs::create_dir_all(dir.path().join("img")).unwrap();
    std::fs::write(dir.path().join("img/map.png"), PNG_BYTES).unwrap();
    let path = create_test_file(
        dir.path(),
        "page.html",
        r#"<html><body><h1>Forecast</h1><script>var x = 1;</script><p>Rain later.</p>
           <img src="img/map.png"/><img src="img/missing.png"/></body></html>"#,
    )
    .unwrap();

    let extracted = documents::read_file(&path, &dir.path().join("tmp")).unwrap();
    assert_eq!(extracted.images.len(), 1);
    assert!(extracted.text.starts_with("# Forecast\nRain later."));
    assert!(!extracted.text.contains("var x"));
    assert!(extracted.warnings.iter().any(|w| w.contains("missing.png")));
}

#[test]
fn test_readFile_legacyEncoding_shouldDecodeWithWarning() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("cyrillic.txt");
    // "Привет" in windows-1251
    std::fs::write(&path, [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2]).unwrap();

    let extracted = documents::read_file(&path, dir.path()).unwrap();
    assert_eq!(extracted.text, "Привет");
    assert_eq!(extracted.warnings.len(), 1);
}

#[test]
fn test_readFile_unknownExtension_shouldBeUnsupported() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(dir.path(), "notes.pdf", "%PDF").unwrap();
    let err = documents::read_file(&path, dir.path()).unwrap_err();
    assert!(matches!(err, DocumentError::Unsupported(_)));
}

#[test]
fn test_readEpubFragment_rebuildMode_shouldKeepSourceReferences() {
    let dir = create_temp_dir().unwrap();
    let book = EpubBuilder::new("Pictures")
        .chapter(
            "Text/chapter1.xhtml",
            "Chapter One",
            "<h1>Chapter One</h1>\n<p>Look:</p>\n<img src=\"../Images/pic.png\" alt=\"pic\"/>",
        )
        .image("Images/pic.png", PNG_BYTES)
        .write(dir.path(), "pictures.epub")
        .unwrap();

    let (extracted, raw) =
        documents::read_epub_fragment(&book, "OEBPS/Text/chapter1.xhtml", &ImageMode::Rebuild).unwrap();
    assert!(String::from_utf8_lossy(&raw).contains("<h1>Chapter One</h1>"));
    assert_eq!(extracted.images.len(), 1);
    match extracted.images.values().next().unwrap() {
        ImageRecord::Source { original_src, original_tag_name, .. } => {
            assert_eq!(original_src, "../Images/pic.png");
            assert_eq!(original_tag_name, "img");
        }
        other => panic!("unexpected record: {:?}", other),
    }
    assert!(extracted.text.starts_with("# Chapter One"));
}

#[test]
fn test_readEpubFragment_saveMode_shouldExtractImageBytes() {
    let dir = create_temp_dir().unwrap();
    let book = EpubBuilder::new("Pictures")
        .chapter("Text/c.xhtml", "Chapter", "<p>Pic</p><img src=\"../Images/pic.png\"/>")
        .image("Images/pic.png", PNG_BYTES)
        .write(dir.path(), "pictures.epub")
        .unwrap();
    let temp = dir.path().join("extracted");

    let (extracted, _) =
        documents::read_epub_fragment(&book, "OEBPS/Text/c.xhtml", &ImageMode::Save(temp.clone())).unwrap();
    match extracted.images.values().next().unwrap() {
        ImageRecord::Saved { saved_path, .. } => {
            assert!(saved_path.starts_with(&temp));
            assert_eq!(std::fs::read(saved_path).unwrap(), PNG_BYTES);
        }
        other => panic!("unexpected record: {:?}", other),
    }
}
