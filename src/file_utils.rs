use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

/// Marker inserted into the name of every translated output
pub const TRANSLATED_SUFFIX: &str = "_translated";

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    // @generates: Output path for a translated document
    // @params: input_file, output_dir, extension
    pub fn generate_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        extension: &str,
    ) -> PathBuf {
        let name = input_file
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = true_stem(&name);
        let stem = if stem.is_empty() { "document" } else { stem };
        output_dir
            .as_ref()
            .join(format!("{}{}.{}", stem, TRANSLATED_SUFFIX, extension.trim_start_matches('.')))
    }

    /// Find files whose extension is one of `extensions`, sorted by path
    pub fn find_files<P: AsRef<Path>>(dir: P, extensions: &[&str]) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(ext) = path.extension() {
                let ext = ext.to_string_lossy();
                if extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted)) {
                    result.push(path.to_path_buf());
                }
            }
        }
        result.sort();
        Ok(result)
    }

    // @writes: Bytes to a file, creating parent directories
    pub fn write_bytes<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                Self::ensure_dir(parent)?;
            }
        }
        fs::write(path, content).with_context(|| format!("Failed to write file: {:?}", path))?;
        Ok(())
    }
}

// @returns: File name without any of its extensions ("a.tar.gz" -> "a")
pub fn true_stem(file_name: &str) -> &str {
    match file_name.char_indices().skip(1).find(|(_, c)| *c == '.') {
        Some((index, _)) => &file_name[..index],
        None => file_name,
    }
}

// @inserts: The translated marker before all extensions of the last path segment
pub fn add_translated_suffix(path: &str) -> String {
    let (dir, name) = match path.rfind('/') {
        Some(index) => path.split_at(index + 1),
        None => ("", path),
    };
    let stem = true_stem(name);
    format!("{}{}{}{}", dir, stem, TRANSLATED_SUFFIX, &name[stem.len()..])
}
