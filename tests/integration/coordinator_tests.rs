/*!
 * End-to-end runs of the coordinator over real files
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use yadtwai::app_config::OutputFormat;
use yadtwai::coordinator::{Outcome, ProgressEvent, plan_inputs, progress_channel};
use yadtwai::errors::{ErrorClass, ProviderError};
use yadtwai::providers::mock::MockProvider;
use yadtwai::translation::RunSignals;

use crate::common::epub_fixture::{EpubBuilder, entry_names, entry_text, three_chapter_book};
use crate::common::{coordinator, create_temp_dir, create_test_file, paragraphs, test_config, translating_mock};

/// Slot filled with the run's signals once the coordinator exists
type SignalSlot = Arc<Mutex<Option<RunSignals>>>;

fn hooked_mock(on: usize, action: fn(&RunSignals)) -> (MockProvider, SignalSlot) {
    let slot: SignalSlot = Arc::default();
    let hook_slot = slot.clone();
    let mock = translating_mock().with_call_hook(move |index| {
        if index == on {
            if let Some(signals) = hook_slot.lock().as_ref() {
                action(signals);
            }
        }
    });
    (mock, slot)
}

#[tokio::test(start_paused = true)]
async fn test_run_singleTextFile_shouldWriteTranslatedCopy() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let path = create_test_file(input.path(), "notes.txt", "First line.\nSecond line.").unwrap();
    let config = test_config(OutputFormat::Txt);
    let (coordinator, _) = coordinator(translating_mock(), &config, output.path());

    let summary = coordinator.run(plan_inputs(&[path], OutputFormat::Txt), None).await;
    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.error_count, 0);

    let written = std::fs::read_to_string(output.path().join("notes_translated.txt")).unwrap();
    assert!(written.contains("First line. [ru]"));
    assert!(written.contains("Second line. [ru]"));
}

#[tokio::test(start_paused = true)]
async fn test_run_epubBook_shouldRebuildWithTranslatedChapters() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let book = three_chapter_book().write(input.path(), "weather.epub").unwrap();
    let config = test_config(OutputFormat::Epub);
    let (coordinator, _) = coordinator(translating_mock(), &config, output.path());

    let (sender, mut receiver) = progress_channel();
    let summary = coordinator.run(plan_inputs(&[book], OutputFormat::Epub), Some(sender)).await;
    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(summary.total_tasks, 4);
    assert_eq!(summary.success_count, 4);
    assert!(!summary.is_failure());

    let bytes = std::fs::read(output.path().join("weather_translated.epub")).unwrap();
    let names = entry_names(&bytes);
    assert_eq!(names[0], "mimetype");
    for n in 1..=3 {
        assert!(names.contains(&format!("OEBPS/Text/chapter{}_translated.xhtml", n)));
    }
    let nav = entry_text(&bytes, "OEBPS/nav.xhtml").unwrap();
    assert!(nav.contains("Chapter Two [ru]"));

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    assert_eq!(events.first(), Some(&ProgressEvent::TotalTasks(4)));
    assert!(matches!(events.last(), Some(ProgressEvent::Finished(_))));
    let processed = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::TaskFinished { .. }))
        .count();
    assert_eq!(processed, 4);
}

#[tokio::test(start_paused = true)]
async fn test_run_epubAsText_shouldWriteOneFilePerChapter() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let book = three_chapter_book().write(input.path(), "weather.epub").unwrap();
    let config = test_config(OutputFormat::Md);
    let (coordinator, _) = coordinator(translating_mock(), &config, output.path());

    let plan = plan_inputs(&[book], OutputFormat::Md);
    assert!(plan.books.is_empty());
    let summary = coordinator.run(plan, None).await;
    assert_eq!(summary.success_count, 3);
    let chapter = std::fs::read_to_string(output.path().join("chapter2_translated.md")).unwrap();
    assert!(chapter.contains("Chapter Two [ru]"));
}

#[tokio::test(start_paused = true)]
async fn test_run_cancelledMidBook_shouldSkipBuild() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let book = three_chapter_book().write(input.path(), "weather.epub").unwrap();
    let mut config = test_config(OutputFormat::Epub);
    config.concurrency = 1;
    let (mock, slot) = hooked_mock(0, RunSignals::cancel);
    let (coordinator, signals) = coordinator(mock.clone(), &config, output.path());
    *slot.lock() = Some(signals);

    let summary = coordinator.run(plan_inputs(&[book], OutputFormat::Epub), None).await;
    assert_eq!(summary.outcome, Outcome::Cancelled);
    assert!(summary.is_failure());
    assert_eq!(mock.request_count(), 1);
    assert!(!output.path().join("weather_translated.epub").exists());
    assert!(summary
        .errors
        .iter()
        .any(|e| e.class == ErrorClass::Cancelled && e.message.contains("EPUB build not run")));
}

#[tokio::test(start_paused = true)]
async fn test_run_finishingAfterSecondChunk_shouldSavePartialFile() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let path = create_test_file(input.path(), "long.txt", &paragraphs(5)).unwrap();
    let waiting = create_test_file(input.path(), "zz_waiting.txt", "Queued text.").unwrap();
    let mut config = test_config(OutputFormat::Txt);
    config.concurrency = 1;
    let (mock, slot) = hooked_mock(1, RunSignals::finish);
    let (coordinator, signals) = coordinator(mock.clone(), &config, output.path());
    *slot.lock() = Some(signals);

    let summary = coordinator
        .run(plan_inputs(&[path, waiting], OutputFormat::Txt), None)
        .await;
    assert_eq!(summary.outcome, Outcome::Finished);
    assert_eq!(mock.request_count(), 2);

    let written = std::fs::read_to_string(output.path().join("long_translated.txt")).unwrap();
    assert!(written.contains("Paragraph number 1"));
    assert!(!written.contains("Paragraph number 5"));
    assert!(!output.path().join("zz_waiting_translated.txt").exists());
    assert!(summary.errors.iter().any(|e| e.origin == "zz_waiting.txt"));
}

#[tokio::test(start_paused = true)]
async fn test_run_finishingInsideEpubChapter_shouldRebuildWithPartialChapter() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let body: String = (1..=5)
        .map(|i| format!("<p>Paragraph number {} talks about the weather in some detail.</p>\n", i))
        .collect();
    let book = EpubBuilder::new("Long Book")
        .chapter("Text/long.xhtml", "Long Day", &format!("<h1>Long Day</h1>\n{}", body))
        .write(input.path(), "long.epub")
        .unwrap();
    let mut config = test_config(OutputFormat::Epub);
    config.concurrency = 1;
    let (mock, slot) = hooked_mock(1, RunSignals::finish);
    let (coordinator, signals) = coordinator(mock.clone(), &config, output.path());
    *slot.lock() = Some(signals);

    let summary = coordinator.run(plan_inputs(&[book], OutputFormat::Epub), None).await;
    assert_eq!(summary.outcome, Outcome::Finished);
    assert_eq!(mock.request_count(), 2);
    assert_eq!(summary.success_count, 2);
    assert!(summary
        .warnings
        .iter()
        .any(|(origin, warning)| origin.ends_with("Text/long.xhtml") && warning.starts_with("partial: 2 of")));

    let bytes = std::fs::read(output.path().join("long_translated.epub")).unwrap();
    let chapter = entry_text(&bytes, "OEBPS/Text/long_translated.xhtml").unwrap();
    assert!(chapter.contains("[ru]"));
    assert!(chapter.contains("Paragraph number 1"));
    assert!(!chapter.contains("Paragraph number 4"));
    assert!(!chapter.contains("Paragraph number 5"));
}

#[tokio::test(start_paused = true)]
async fn test_run_unreadableFragment_shouldNotBuildBook() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let book = three_chapter_book().write(input.path(), "weather.epub").unwrap();
    let config = test_config(OutputFormat::Epub);
    let (coordinator, _) = coordinator(translating_mock(), &config, output.path());

    let mut plan = plan_inputs(&[book], OutputFormat::Epub);
    plan.books
        .values_mut()
        .next()
        .unwrap()
        .fragment_paths
        .push("OEBPS/Text/missing.xhtml".to_string());

    let summary = coordinator.run(plan, None).await;
    assert!(summary.is_failure());
    assert_eq!(summary.success_count, 3);
    assert!(!output.path().join("weather_translated.epub").exists());
    assert!(summary
        .errors
        .iter()
        .any(|e| e.class == ErrorClass::Io && e.origin.ends_with("missing.xhtml")));
    assert!(summary
        .errors
        .iter()
        .any(|e| e.origin == "weather.epub" && e.message.contains("EPUB build not run")));
}

#[tokio::test(start_paused = true)]
async fn test_run_manyFiles_shouldNotExceedConcurrency() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let inputs: Vec<_> = (0..6)
        .map(|i| create_test_file(input.path(), &format!("file{}.txt", i), &format!("Text {}.", i)).unwrap())
        .collect();
    let config = test_config(OutputFormat::Txt);
    let mock = MockProvider::slow(1_000);
    let (coordinator, _) = coordinator(mock.clone(), &config, output.path());

    let summary = coordinator.run(plan_inputs(&inputs, OutputFormat::Txt), None).await;
    assert_eq!(summary.success_count, 6);
    assert_eq!(mock.request_count(), 6);

    let mut per_instant: BTreeMap<tokio::time::Instant, usize> = BTreeMap::new();
    for call in mock.calls() {
        *per_instant.entry(call.at).or_default() += 1;
    }
    assert!(per_instant.values().all(|count| *count <= 2), "{:?}", per_instant);
    assert!(per_instant.len() >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_serviceOutage_shouldStopAsCritical() {
    let input = create_temp_dir().unwrap();
    let output = create_temp_dir().unwrap();
    let inputs: Vec<_> = (0..4)
        .map(|i| create_test_file(input.path(), &format!("doc{}.txt", i), "Some text.").unwrap())
        .collect();
    let mut config = test_config(OutputFormat::Txt);
    config.concurrency = 1;
    let mock = MockProvider::failing(ProviderError::Unavailable("overloaded".into()));
    let (coordinator, signals) = coordinator(mock.clone(), &config, output.path());

    let summary = coordinator.run(plan_inputs(&inputs, OutputFormat::Txt), None).await;
    assert_eq!(summary.outcome, Outcome::Critical);
    assert!(signals.is_critical());
    assert!(summary.is_failure());
    // Only the first document reaches the service
    assert_eq!(mock.request_count(), config.retry.max_attempts as usize);
    assert_eq!(summary.success_count, 0);
}

#[tokio::test]
async fn test_run_missingInput_shouldBeReportedAsError() {
    let output = create_temp_dir().unwrap();
    let config = test_config(OutputFormat::Txt);
    let (coordinator, _) = coordinator(translating_mock(), &config, output.path());
    let missing = output.path().join("does-not-exist.txt");

    let summary = coordinator.run(plan_inputs(&[missing], OutputFormat::Txt), None).await;
    assert_eq!(summary.total_tasks, 1);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.errors[0].class, ErrorClass::Io);
}
