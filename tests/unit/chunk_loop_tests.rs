/*!
 * Tests for the sequential chunk loop
 */

use std::sync::Arc;

use yadtwai::app_config::OutputFormat;
use yadtwai::translation::ChunkStop;

use crate::common::{fake_translate, paragraphs, test_config, translating_mock, translator};

#[tokio::test(start_paused = true)]
async fn test_translateText_shouldKeepChunkOrderAndReportProgress() {
    let config = test_config(OutputFormat::Txt);
    let mock = translating_mock();
    let (translator, _) = translator(mock.clone(), &config);
    let text = paragraphs(4);
    let chunks = translator.chunks(&text);
    assert!(chunks.len() >= 3);

    let mut progress = Vec::new();
    let run = translator
        .translate_text(&text, "doc", |done, total| progress.push((done, total)))
        .await
        .unwrap();

    assert!(run.is_complete());
    assert_eq!(run.total, chunks.len());
    let expected: Vec<String> = chunks.iter().map(|c| fake_translate(c)).collect();
    assert_eq!(run.translated, expected);
    assert_eq!(progress.last(), Some(&(chunks.len(), chunks.len())));
    assert_eq!(mock.request_count(), chunks.len());
}

#[tokio::test(start_paused = true)]
async fn test_translateText_finishingAfterSecondChunk_shouldStopThere() {
    let config = test_config(OutputFormat::Txt);
    let text = paragraphs(5);
    let signals_slot: Arc<parking_lot::Mutex<Option<yadtwai::RunSignals>>> = Arc::default();
    let slot = signals_slot.clone();
    let mock = translating_mock().with_call_hook(move |index| {
        if index == 1 {
            if let Some(signals) = slot.lock().as_ref() {
                signals.finish();
            }
        }
    });
    let (translator, signals) = translator(mock.clone(), &config);
    *signals_slot.lock() = Some(signals.clone());
    let total = translator.chunks(&text).len();
    assert!(total >= 3);

    let run = translator.translate_text(&text, "doc", |_, _| {}).await.unwrap();
    assert!(matches!(run.stop, ChunkStop::Finishing));
    assert_eq!(run.translated.len(), 2);
    assert_eq!(mock.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_translateText_laterChunkFailure_shouldKeepPrefix() {
    let config = test_config(OutputFormat::Txt);
    let text = paragraphs(4);
    // Only the first paragraph gets an answer; the rest come back empty
    let mock = translating_mock().with_responder(|p| {
        if p.contains("number 1 ") {
            fake_translate(p)
        } else {
            String::new()
        }
    });
    let (translator, _) = translator(mock, &config);

    let run = translator.translate_text(&text, "doc", |_, _| {}).await.unwrap();
    assert!(run.total >= 3);
    match &run.stop {
        ChunkStop::Failed(e) => assert!(!e.is_cancelled()),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!run.translated.is_empty());
    assert!(run.translated.len() < run.total);
}

#[tokio::test(start_paused = true)]
async fn test_translateText_cancelled_shouldReturnErr() {
    let config = test_config(OutputFormat::Txt);
    let (translator, signals) = translator(translating_mock(), &config);
    signals.cancel();

    let err = translator
        .translate_text(&paragraphs(3), "doc", |_, _| {})
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_translateText_chunkingDisabled_shouldSendOneCall() {
    let mut config = test_config(OutputFormat::Txt);
    config.chunking.enabled = false;
    let mock = translating_mock();
    let (translator, _) = translator(mock.clone(), &config);

    let run = translator.translate_text(&paragraphs(5), "doc", |_, _| {}).await.unwrap();
    assert_eq!(run.total, 1);
    assert_eq!(mock.request_count(), 1);
}
