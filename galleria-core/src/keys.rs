//! Storage key derivation.
//!
//! Keys are flat object names. Everything a client sends is reduced to
//! `[A-Za-z0-9_.-]` so a key can never address outside the container.
//! Distinct filenames may collapse onto the same key; the catalog treats
//! that as a conflict rather than disambiguating.

use crate::{GalleriaError, Result};
use unicode_normalization::UnicodeNormalization;

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "LPT1", "LPT2", "LPT3",
];

/// Reduce a client filename to a safe storage key.
pub fn sanitize_key(filename: &str) -> Result<String> {
    // NFKD splits accented letters into base + combining mark; the mark is dropped below.
    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let mut key = filtered.trim_matches(|c| c == '.' || c == '_').to_string();

    if key.is_empty() {
        return Err(GalleriaError::InvalidArgument(format!(
            "filename {:?} has no usable characters",
            filename
        )));
    }

    let stem = key.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if WINDOWS_DEVICE_NAMES.contains(&stem.as_str()) {
        key.insert(0, '_');
    }

    Ok(key)
}

/// Extension of a key, without the dot. Dotfiles have none.
pub fn key_extension(key: &str) -> Option<&str> {
    match key.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Compose the key an asset moves to when renamed to `new_base`, keeping the old extension.
pub fn renamed_key(old_key: &str, new_base: &str) -> Result<String> {
    let new_base = new_base.trim();
    if new_base.is_empty() {
        return Err(GalleriaError::InvalidArgument(
            "new name cannot be empty".to_string(),
        ));
    }

    let candidate = match key_extension(old_key) {
        Some(ext) => {
            let suffix = format!(".{}", ext.to_ascii_lowercase());
            if new_base.to_ascii_lowercase().ends_with(&suffix) {
                new_base.to_string()
            } else {
                format!("{}.{}", new_base, ext)
            }
        }
        None => new_base.to_string(),
    };

    sanitize_key(&candidate)
}
