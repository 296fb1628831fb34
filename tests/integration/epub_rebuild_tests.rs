/*!
 * Rebuild of EPUB books from fragment results
 */

use yadtwai::epub::package::Package;
use yadtwai::epub::{EpubReassembler, FragmentResult, MetadataOverrides};
use yadtwai::placeholder::ImageMap;

use crate::common::create_temp_dir;
use crate::common::epub_fixture::{EpubBuilder, entry_bytes, entry_names, entry_text, three_chapter_book};

#[test]
fn test_rebuild_mixedResults_shouldRenameTranslatedAndKeepOriginal() {
    let dir = create_temp_dir().unwrap();
    let builder = three_chapter_book();
    let book = builder.write(dir.path(), "weather.epub").unwrap();
    let package = Package::open(&book).unwrap();
    let metadata = package.build_metadata();
    let fragments = package.spine_documents();
    assert_eq!(fragments.len(), 3);

    let original_third = entry_bytes(&builder.to_bytes().unwrap(), "OEBPS/Text/chapter3.xhtml").unwrap();
    let results = vec![
        FragmentResult::translated(
            fragments[0].clone(),
            "# Глава первая\n\nНебо было серым.\n\nВесь день шёл дождь.".to_string(),
            ImageMap::new(),
        ),
        FragmentResult::translated(
            fragments[1].clone(),
            "# Глава вторая\n\nВышло солнце.".to_string(),
            ImageMap::new(),
        ),
        FragmentResult::original(fragments[2].clone(), original_third.clone(), None),
    ];

    let bytes = EpubReassembler::new().rebuild(&book, &results, &metadata).unwrap();
    let names = entry_names(&bytes);

    assert_eq!(names.first().map(String::as_str), Some("mimetype"));
    assert_eq!(entry_text(&bytes, "mimetype").unwrap(), "application/epub+zip");
    assert!(names.contains(&"OEBPS/Text/chapter1_translated.xhtml".to_string()));
    assert!(names.contains(&"OEBPS/Text/chapter2_translated.xhtml".to_string()));
    assert!(!names.contains(&"OEBPS/Text/chapter1.xhtml".to_string()));
    assert_eq!(entry_bytes(&bytes, "OEBPS/Text/chapter3.xhtml").unwrap(), original_third);

    let chapter1 = entry_text(&bytes, "OEBPS/Text/chapter1_translated.xhtml").unwrap();
    assert!(chapter1.contains("Глава первая"));
    assert!(chapter1.contains("Небо было серым."));

    let nav = entry_text(&bytes, "OEBPS/nav.xhtml").unwrap();
    assert!(nav.contains("href=\"Text/chapter1_translated.xhtml\""));
    assert!(nav.contains(">Глава первая<"));
    assert!(nav.contains(">Глава вторая<"));
    assert!(nav.contains("href=\"Text/chapter3.xhtml\""));
    assert!(nav.contains(">Chapter Three<"));

    let opf = entry_text(&bytes, "OEBPS/content.opf").unwrap();
    assert!(opf.contains("Text/chapter1_translated.xhtml"));
    assert!(opf.contains("Text/chapter3.xhtml"));
    assert!(opf.contains("properties=\"nav\""));
    assert!(opf.contains("Styles/stylesheet.css"));
}

#[test]
fn test_rebuild_ncxOnlyBook_shouldGenerateNav() {
    let dir = create_temp_dir().unwrap();
    let book = three_chapter_book()
        .without_nav()
        .with_ncx()
        .write(dir.path(), "legacy.epub")
        .unwrap();
    let package = Package::open(&book).unwrap();
    let metadata = package.build_metadata();
    assert!(metadata.nav_path.is_none());
    assert!(metadata.ncx_path.is_some());

    let results: Vec<FragmentResult> = package
        .spine_documents()
        .into_iter()
        .map(|path| FragmentResult::translated(path, "# Перевод\n\nТекст.".to_string(), ImageMap::new()))
        .collect();
    let bytes = EpubReassembler::new().rebuild(&book, &results, &metadata).unwrap();

    let nav = entry_text(&bytes, "OEBPS/nav.xhtml").expect("a NAV document must be generated");
    assert!(nav.contains("chapter2_translated.xhtml"));
    let ncx = entry_text(&bytes, "OEBPS/toc.ncx").unwrap();
    assert!(ncx.contains("Text/chapter3_translated.xhtml"));
    assert!(!ncx.contains("src=\"Text/chapter3.xhtml\""));
}

#[test]
fn test_rebuild_missingResult_shouldKeepSourceDocument() {
    let dir = create_temp_dir().unwrap();
    let book = three_chapter_book().write(dir.path(), "partial.epub").unwrap();
    let package = Package::open(&book).unwrap();
    let fragments = package.spine_documents();

    let mut unreadable = FragmentResult::original(fragments[1].clone(), Vec::new(), None);
    unreadable.content = None;
    let results = vec![
        FragmentResult::translated(fragments[0].clone(), "# Один\n\nТекст.".to_string(), ImageMap::new()),
        unreadable,
    ];
    let bytes = EpubReassembler::new()
        .rebuild(&book, &results, &package.build_metadata())
        .unwrap();
    let names = entry_names(&bytes);

    assert!(names.contains(&"OEBPS/Text/chapter2.xhtml".to_string()));
    assert!(names.contains(&"OEBPS/Text/chapter3.xhtml".to_string()));
    assert!(entry_text(&bytes, "OEBPS/Text/chapter2.xhtml").unwrap().contains("The sun came out."));
}

#[test]
fn test_rebuild_withOverrides_shouldRewriteMetadata() {
    let dir = create_temp_dir().unwrap();
    let book = EpubBuilder::new("Original Title")
        .chapter("Text/one.xhtml", "One", "<h1>One</h1><p>Text.</p>")
        .write(dir.path(), "meta.epub")
        .unwrap();
    let package = Package::open(&book).unwrap();
    let results = vec![FragmentResult::translated(
        "OEBPS/Text/one.xhtml",
        "# Eins\n\nText.".to_string(),
        ImageMap::new(),
    )];
    let reassembler = EpubReassembler::with_overrides(MetadataOverrides {
        title: Some("Neuer Titel".to_string()),
        language: Some("de".to_string()),
    });

    let bytes = reassembler.rebuild(&book, &results, &package.build_metadata()).unwrap();
    let opf = entry_text(&bytes, "OEBPS/content.opf").unwrap();
    assert!(opf.contains("Neuer Titel"));
    assert!(opf.contains(">de<"));
    assert!(opf.contains("Test Author"));
    assert!(entry_text(&bytes, "META-INF/container.xml").is_some());
}

#[test]
fn test_rebuild_corruptArchive_shouldFail() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("broken.epub");
    std::fs::write(&path, b"not a zip archive").unwrap();
    let result = EpubReassembler::new().rebuild(&path, &[], &Default::default());
    assert!(result.is_err());
}
