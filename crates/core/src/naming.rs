//! File and directory naming rules.

use crate::{Error, Result};

/// Image extensions accepted by the ingest pipeline (lowercase, no dot).
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

/// Maximum length of a single path component.
const MAX_COMPONENT_LEN: usize = 255;

/// Validate a client-supplied string used as a single directory or file name.
///
/// Rejects anything that could escape its parent directory or that the
/// filesystem would interpret specially.
pub fn validate_component(value: &str) -> Result<&str> {
    if value.is_empty() {
        return Err(Error::InvalidPathComponent("empty component".to_string()));
    }
    if value.len() > MAX_COMPONENT_LEN {
        return Err(Error::InvalidPathComponent(format!(
            "component longer than {MAX_COMPONENT_LEN} bytes"
        )));
    }
    if value == "." || value == ".." {
        return Err(Error::InvalidPathComponent(format!(
            "relative component not allowed: {value}"
        )));
    }
    if value
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
    {
        return Err(Error::InvalidPathComponent(format!(
            "separator or control character in: {value:?}"
        )));
    }
    if value.starts_with('.') {
        return Err(Error::InvalidPathComponent(format!(
            "hidden component not allowed: {value}"
        )));
    }
    Ok(value)
}

/// Reduce an arbitrary string to a safe identifier (`[A-Za-z0-9._-]`).
pub fn sanitize_identifier(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Strip any client-side directory part from an uploaded file name.
pub fn base_file_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Lowercased extension of a file name, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    let base = base_file_name(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether a file name carries an accepted image extension.
pub fn is_accepted_image(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Insert `_<suffix>` before the extension: `a.jpg` becomes `a_<suffix>.jpg`.
pub fn with_name_suffix(name: &str, suffix: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{suffix}.{ext}"),
        _ => format!("{name}_{suffix}"),
    }
}

/// Canonical file name for a manifest index: `<index>.<ext>`.
pub fn canonical_name(index: u64, extension: &str) -> String {
    format!("{index}.{extension}")
}

/// Parse the index out of a canonical name; `None` for anything else.
pub fn parse_canonical_index(name: &str) -> Option<u64> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !ACCEPTED_EXTENSIONS.contains(&ext) {
        return None;
    }
    stem.parse().ok()
}
