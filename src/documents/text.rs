use encoding_rs::{WINDOWS_1251, WINDOWS_1252};
use log::warn;
use std::fs;
use std::path::Path;

use crate::errors::DocumentError;

// @module: Plain text decoding with legacy encoding fallback

/// Decode bytes as UTF-8, falling back to Windows-1251 then Windows-1252
///
/// Returns the text and a warning when a fallback encoding was used.
pub fn decode_bytes(bytes: &[u8]) -> (String, Option<String>) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), None);
    }

    if let Some(text) = WINDOWS_1251.decode_without_bom_handling_and_without_replacement(bytes) {
        let message = "Input is not UTF-8, decoded as windows-1251".to_string();
        warn!("{}", message);
        return (text.into_owned(), Some(message));
    }

    // windows-1252 maps every byte, so this cannot fail on malformed input
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    let message = "Input is not UTF-8, decoded as windows-1252".to_string();
    warn!("{}", message);
    (text.into_owned(), Some(message))
}

/// Read a text file through `decode_bytes`
pub fn read_text_file(path: &Path) -> Result<(String, Option<String>), DocumentError> {
    let bytes = fs::read(path)?;
    let (text, warning) = decode_bytes(&bytes);
    Ok((text, warning.map(|w| format!("{}: {}", path.display(), w))))
}
