/*!
 * Per-fragment chunk loop.
 *
 * `ChunkTranslator` splits a fragment's text, sends each chunk through the
 * `TranslationClient` strictly one after another, reconciles the placeholder
 * tokens of every answer and reports progress. Cancellation aborts the loop
 * with an error; the finishing flag stops it after the chunk in flight and
 * keeps what was translated.
 */

use log::{info, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::app_config::Config;
use crate::errors::TranslationError;
use crate::placeholder;
use crate::translation::chunking::ChunkSplitter;
use crate::translation::client::TranslationClient;

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});").expect("entity pattern"));

/// Tick used for the inter-chunk delay
const CHUNK_DELAY_TICK: Duration = Duration::from_millis(100);

/// Outcome of placeholder reconciliation for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub text: String,
    /// Ids introduced by the service and stripped
    pub stripped: BTreeSet<String>,
    /// Set when the surviving ids differ from the original ones
    pub warning: Option<String>,
}

/// Strip hallucinated placeholder tokens from `translated` and compare id sets
pub fn reconcile(original: &str, translated: &str) -> Reconciled {
    let before = placeholder::id_set(original);
    let mut stripped = BTreeSet::new();
    let text = placeholder::replace_with(translated, |id| {
        if before.contains(id) {
            placeholder::encode(id)
        } else {
            stripped.insert(id.to_string());
            String::new()
        }
    });
    let after = placeholder::id_set(&text);

    let mut problems = Vec::new();
    if !stripped.is_empty() {
        problems.push(format!("stripped {} placeholder(s) not present in the source", stripped.len()));
    }
    if after != before {
        let missing: Vec<&String> = before.difference(&after).collect();
        problems.push(format!(
            "placeholder mismatch: {} before, {} after (missing: {:?})",
            before.len(),
            after.len(),
            missing
        ));
    }
    let warning = (!problems.is_empty()).then(|| problems.join("; "));

    Reconciled { text, stripped, warning }
}

/// Decode HTML entities the service may have introduced.
///
/// Each reference is resolved on its own; bare ampersands and unknown names stay as they are.
pub fn unescape_html(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY.replace_all(text, |caps: &regex::Captures| {
        let whole = &caps[0];
        resolve_entity(&caps[1]).unwrap_or_else(|| {
            trace!("Leaving unknown entity {}", whole);
            whole.to_string()
        })
    })
}

fn resolve_entity(body: &str) -> Option<String> {
    if let Some(number) = body.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code).filter(|c| *c != '\0').map(String::from);
    }
    quick_xml::escape::resolve_html5_entity(body).map(str::to_string)
}

/// Why the chunk loop stopped
#[derive(Debug, Clone)]
pub enum ChunkStop {
    /// Every chunk was translated
    Completed,
    /// The finishing flag stopped the loop after the chunk in flight
    Finishing,
    /// A chunk failed; earlier chunks are kept
    Failed(TranslationError),
}

/// Result of one chunk loop
#[derive(Debug, Clone)]
pub struct ChunkRun {
    /// Translated chunks, in chunk order
    pub translated: Vec<String>,
    /// Number of chunks the text was split into
    pub total: usize,
    pub stop: ChunkStop,
    /// Placeholder drift warnings, one per affected chunk
    pub warnings: Vec<String>,
}

impl ChunkRun {
    pub fn is_complete(&self) -> bool {
        matches!(self.stop, ChunkStop::Completed)
    }

    /// Join the translated chunks with `separator` and trim the result
    pub fn joined(&self, separator: &str) -> String {
        self.translated.join(separator).trim().to_string()
    }
}

/// Translates one fragment chunk by chunk
#[derive(Debug, Clone)]
pub struct ChunkTranslator {
    client: TranslationClient,
    splitter: Option<ChunkSplitter>,
    prompt_config: Config,
    chunk_delay: Duration,
}

impl ChunkTranslator {
    pub fn new(client: TranslationClient, config: &Config) -> Self {
        let splitter = config.chunking_active().then(|| {
            ChunkSplitter::new(
                config.chunking.limit,
                config.chunking.window,
                config.chunking.min_chunk_size,
            )
        });
        Self {
            client,
            splitter,
            prompt_config: config.clone(),
            chunk_delay: config.chunk_delay(),
        }
    }

    pub fn client(&self) -> &TranslationClient {
        &self.client
    }

    /// Split `text` into the chunks that will be sent
    pub fn chunks(&self, text: &str) -> Vec<String> {
        match &self.splitter {
            Some(splitter) => splitter.split(text),
            None if text.trim().is_empty() => Vec::new(),
            None => vec![text.to_string()],
        }
    }

    /// Translate one chunk and reconcile its placeholders
    pub async fn translate_chunk(&self, chunk: &str, context: &str) -> Result<Reconciled, TranslationError> {
        let prompt = self.prompt_config.render_prompt(chunk);
        let raw = self.client.translate(&prompt, context).await?;
        let reconciled = reconcile(chunk, &unescape_html(&raw));
        if let Some(warning) = &reconciled.warning {
            warn!("{}: {}", context, warning);
        }
        Ok(reconciled)
    }

    /// Run the chunk loop over `text`
    ///
    /// `on_chunk(done, total)` is called after every successful chunk. Only a
    /// cancellation is returned as `Err`; other failures end the loop with
    /// `ChunkStop::Failed` so the caller can keep the translated prefix.
    pub async fn translate_text<F>(
        &self,
        text: &str,
        label: &str,
        mut on_chunk: F,
    ) -> Result<ChunkRun, TranslationError>
    where
        F: FnMut(usize, usize),
    {
        let chunks = self.chunks(text);
        let total = chunks.len();
        let signals = self.client.signals().clone();
        let mut run = ChunkRun {
            translated: Vec::with_capacity(total),
            total,
            stop: ChunkStop::Completed,
            warnings: Vec::new(),
        };

        if total > 1 {
            info!("{}: {} chunks", label, total);
        }

        for (index, chunk) in chunks.iter().enumerate() {
            signals.check(label)?;
            if index > 0 && signals.is_finishing() {
                info!("{}: finishing, {} of {} chunks left untranslated", label, total - index, total);
                run.stop = ChunkStop::Finishing;
                return Ok(run);
            }

            let context = format!("{} [{}/{}]", label, index + 1, total);
            match self.translate_chunk(chunk, &context).await {
                Ok(reconciled) => {
                    if let Some(warning) = reconciled.warning {
                        run.warnings.push(format!("chunk {}: {}", index + 1, warning));
                    }
                    run.translated.push(reconciled.text);
                    on_chunk(index + 1, total);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    run.stop = ChunkStop::Failed(e);
                    return Ok(run);
                }
            }

            if index + 1 < total {
                if signals.is_finishing() {
                    info!("{}: finishing after chunk {}/{}", label, index + 1, total);
                    run.stop = ChunkStop::Finishing;
                    return Ok(run);
                }
                if !self.chunk_delay.is_zero() {
                    signals.sleep(self.chunk_delay, CHUNK_DELAY_TICK, label).await?;
                }
            }
        }

        Ok(run)
    }
}
