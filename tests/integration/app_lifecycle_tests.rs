/*!
 * Full application lifecycle through the controller
 */

use std::sync::Arc;

use yadtwai::app_config::OutputFormat;
use yadtwai::coordinator::Outcome;
use yadtwai::Controller;

use crate::common::epub_fixture::{entry_names, three_chapter_book};
use crate::common::{create_temp_dir, create_test_file, init_test_logging, test_config, translating_mock};

#[tokio::test(start_paused = true)]
async fn test_controller_directoryInput_shouldTranslateEverySupportedFile() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    create_test_file(input.path(), "a.txt", "Alpha text.").unwrap();
    create_test_file(input.path(), "b.md", "# Beta\n\nBeta text.").unwrap();
    create_test_file(input.path(), "ignored.pdf", "%PDF").unwrap();
    let out_dir = output.path().join("translated");

    let controller = Controller::with_provider(test_config(OutputFormat::Txt), &out_dir, Arc::new(translating_mock()));
    let summary = controller.run(&[input.path().to_path_buf()]).await.unwrap();

    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(summary.success_count, 2);
    assert!(out_dir.join("a_translated.txt").exists());
    let beta = std::fs::read_to_string(out_dir.join("b_translated.txt")).unwrap();
    assert!(beta.contains("# Beta [ru]"));
}

#[tokio::test(start_paused = true)]
async fn test_controller_epubInput_shouldProduceRebuiltBook() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let book = three_chapter_book().write(input.path(), "weather.epub").unwrap();

    let controller = Controller::with_provider(test_config(OutputFormat::Epub), output.path(), Arc::new(translating_mock()));
    let summary = controller.run(&[book]).await.unwrap();

    assert!(!summary.is_failure());
    let bytes = std::fs::read(output.path().join("weather_translated.epub")).unwrap();
    assert!(entry_names(&bytes).contains(&"OEBPS/Text/chapter3_translated.xhtml".to_string()));
}

#[test]
fn test_controller_nothingToDo_shouldFail() {
    init_test_logging();
    let input = create_temp_dir().unwrap();
    create_test_file(input.path(), "only.pdf", "%PDF").unwrap();
    let output = create_temp_dir().unwrap();

    let controller = Controller::with_provider(test_config(OutputFormat::Txt), output.path(), Arc::new(translating_mock()));
    let result = tokio_test::block_on(async { controller.run(&[input.path().to_path_buf()]).await });
    assert!(result.is_err());
}

#[test]
fn test_controller_control_shouldExposeRunFlags() {
    let output = create_temp_dir().unwrap();
    let controller = Controller::with_provider(test_config(OutputFormat::Txt), output.path(), Arc::new(translating_mock()));
    let control = controller.control();
    assert!(!control.is_finishing());
    control.finish();
    assert!(control.is_finishing());
    assert!(!control.is_cancelled());
    control.cancel();
    assert!(controller.control().is_cancelled());
}
