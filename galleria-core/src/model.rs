use crate::{GalleriaError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One catalogued image as stored in the metadata store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: i64,
    pub path: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub search_count: i64,
    pub created_at: DateTime<Utc>,
}

impl AssetRecord {
    pub fn new(id: i64, path: impl Into<String>, analysis: ImageAnalysis) -> Self {
        Self {
            id,
            path: path.into(),
            tags: analysis.tags,
            description: analysis.description,
            search_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Tags and caption produced by the tagging oracle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub tags: Vec<String>,
    pub description: String,
}

impl ImageAnalysis {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Numeric record fields that may only change through store-level atomic increments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    SearchCount,
}

impl CounterField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::SearchCount => "search_count",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Path,
    SearchCount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GallerySort {
    pub key: SortKey,
    pub order: SortOrder,
}

impl GallerySort {
    pub fn new(key: SortKey, order: SortOrder) -> Self {
        Self { key, order }
    }

    /// Parse caller-supplied values; absent or blank values fall back to the defaults.
    pub fn parse(key: Option<&str>, order: Option<&str>) -> Result<Self> {
        let key = match key.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => value.parse()?,
            None => SortKey::default(),
        };
        let order = match order.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => value.parse()?,
            None => SortOrder::default(),
        };
        Ok(Self { key, order })
    }
}

impl FromStr for SortKey {
    type Err = GalleriaError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "path" | "image_path" => Ok(Self::Path),
            "search_count" => Ok(Self::SearchCount),
            other => Err(GalleriaError::InvalidArgument(format!(
                "unsupported sort key: {}",
                other
            ))),
        }
    }
}

impl FromStr for SortOrder {
    type Err = GalleriaError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(GalleriaError::InvalidArgument(format!(
                "unsupported sort order: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::SearchCount => write!(f, "search_count"),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_gallery_sort_defaults() {
        let sort = GallerySort::parse(None, Some("  ")).unwrap();
        assert_eq!(sort, GallerySort::new(SortKey::Path, SortOrder::Asc));
    }

    #[test]
    fn test_gallery_sort_parses_aliases() {
        let sort = GallerySort::parse(Some("image_path"), Some("DESC")).unwrap();
        assert_eq!(sort, GallerySort::new(SortKey::Path, SortOrder::Desc));

        let sort = GallerySort::parse(Some("search_count"), None).unwrap();
        assert_eq!(sort.key, SortKey::SearchCount);
    }

    #[test]
    fn test_gallery_sort_rejects_unknown() {
        let error = GallerySort::parse(Some("size"), None).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        let error = GallerySort::parse(None, Some("sideways")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_record_defaults_when_fields_missing() {
        let record: AssetRecord = serde_json::from_str(
            r#"{"id":7,"path":"memory:///a.png","created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.search_count, 0);
        assert!(record.tags.is_empty());
        assert_eq!(record.description, "");
    }
}
