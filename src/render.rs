/*!
 * Output renderers.
 *
 * A renderer turns translated text (still carrying image placeholders) into
 * the bytes of an output file. The coordinator only knows the `Renderer`
 * trait and looks implementations up by format in a `RendererRegistry`.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::app_config::OutputFormat;
use crate::errors::DocumentError;
use crate::placeholder::{self, ImageMap};

static BREAK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("br pattern"));

/// Turns translated text into output bytes
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        format: OutputFormat,
        text: &str,
        images: &ImageMap,
        title: &str,
    ) -> Result<Vec<u8>, DocumentError>;
}

/// `txt` and `md` output
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

impl Renderer for PlainTextRenderer {
    fn render(
        &self,
        format: OutputFormat,
        text: &str,
        images: &ImageMap,
        title: &str,
    ) -> Result<Vec<u8>, DocumentError> {
        debug!("Rendering '{}' as {}", title, format);
        let text = placeholder::replace_with(text, |id| {
            let name = images
                .get(id)
                .map(|record| record.display_name())
                .unwrap_or_else(|| id.to_string());
            format!("[Image: {}]", name)
        });
        let text = BREAK_TAG.replace_all(&text, "\n");
        let mut out = text.trim_end().to_string();
        out.push('\n');
        Ok(out.into_bytes())
    }
}

/// Renderers by output format
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: HashMap<OutputFormat, Arc<dyn Renderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in plain text renderer
    pub fn with_defaults() -> Self {
        let plain: Arc<dyn Renderer> = Arc::new(PlainTextRenderer);
        let mut registry = Self::new();
        registry.register(OutputFormat::Txt, plain.clone());
        registry.register(OutputFormat::Md, plain);
        registry
    }

    pub fn register(&mut self, format: OutputFormat, renderer: Arc<dyn Renderer>) {
        self.renderers.insert(format, renderer);
    }

    pub fn supports(&self, format: OutputFormat) -> bool {
        self.renderers.contains_key(&format)
    }

    pub fn render(
        &self,
        format: OutputFormat,
        text: &str,
        images: &ImageMap,
        title: &str,
    ) -> Result<Vec<u8>, DocumentError> {
        match self.renderers.get(&format) {
            Some(renderer) => renderer.render(format, text, images, title),
            None => Err(DocumentError::Unsupported(format!(
                "no renderer for output format '{}'",
                format
            ))),
        }
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formats: Vec<String> = self.renderers.keys().map(|f| f.to_string()).collect();
        formats.sort();
        f.debug_struct("RendererRegistry").field("formats", &formats).finish()
    }
}
