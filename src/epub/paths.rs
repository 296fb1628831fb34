use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

// @module: Archive path arithmetic
// Paths inside an EPUB always use `/`, are relative to the archive root and
// never start with a separator.

// @normalizes: Resolves `.` and `..`, drops empty segments and leading separators
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

// @returns: Directory part of an archive path, "" for the root
pub fn parent_dir(path: &str) -> String {
    let normalized = normalize(path);
    match normalized.rfind('/') {
        Some(index) => normalized[..index].to_string(),
        None => String::new(),
    }
}

// @returns: Final segment of an archive path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// @joins: `rel` against directory `dir`
pub fn join(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        normalize(rel)
    } else {
        normalize(&format!("{}/{}", dir, rel))
    }
}

// @returns: Path of `target` as seen from directory `from_dir`
pub fn relative(target: &str, from_dir: &str) -> String {
    let target = normalize(target);
    let from = normalize(from_dir);
    let target_parts: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();
    let from_parts: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();

    let common = target_parts
        .iter()
        .zip(from_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out: Vec<&str> = std::iter::repeat_n("..", from_parts.len() - common).collect();
    out.extend_from_slice(&target_parts[common..]);
    if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}

/// Split an href into its percent-decoded path and its fragment
pub fn split_href(href: &str) -> (String, Option<String>) {
    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment.to_string())),
        None => (href, None),
    };
    let path = path.split('?').next().unwrap_or(path);
    let decoded = percent_decode_str(path).decode_utf8_lossy().to_string();
    (decoded, fragment.filter(|f| !f.is_empty()))
}

/// Whether an href points outside the book or inside the same document
pub fn is_external_or_local(href: &str) -> bool {
    let lowered = href.trim().to_lowercase();
    lowered.is_empty()
        || lowered.starts_with('#')
        || lowered.starts_with("http:")
        || lowered.starts_with("https:")
        || lowered.starts_with("mailto:")
}

/// Characters escaped when a path is written back into an href
const HREF_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?');

/// Build an href from a relative path and an optional fragment
pub fn to_href(path: &str, fragment: Option<&str>) -> String {
    let encoded = utf8_percent_encode(path, HREF_ESCAPES).to_string();
    match fragment {
        Some(fragment) => format!("{}#{}", encoded, fragment),
        None => encoded,
    }
}

/// Resolve an href found in the document at `base_dir` to an archive path
pub fn resolve_href(base_dir: &str, href: &str) -> (String, Option<String>) {
    let (path, fragment) = split_href(href);
    (join(base_dir, &path), fragment)
}
