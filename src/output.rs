//! Result types returned by the pipeline.

use crate::error::ExtractError;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Metadata fields reported by the extraction service.
///
/// Lookups ignore case; each entry keeps the spelling the service used.
/// Serialises as a flat JSON object ordered by case-folded name, so output
/// is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, (String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a field. An existing entry keeps its original spelling.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        self.entries
            .entry(name.to_lowercase())
            .and_modify(|(_, v)| *v = value.clone())
            .or_insert((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(original name, value)` pairs in serialisation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| (k, crate::pipeline::extract::value_text(&v)))
            .collect())
    }
}

/// The pipeline's output for one document.
///
/// Field order is fixed (`metadata`, then `content`) so serialised results
/// can be compared byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub metadata: Metadata,
    /// Extracted text; empty when the service reported no content field.
    #[serde(default)]
    pub content: String,
}

impl ExtractionResult {
    /// Compact JSON: `{"metadata":{...},"content":"..."}`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| unreachable_json())
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| unreachable_json())
    }

    /// Write the pretty-printed JSON (plus a trailing newline) to `path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files;
    /// missing parent directories are created.
    pub async fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), ExtractError> {
        let path = path.as_ref();
        let write_err = |source| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let json = format!("{}\n", self.to_json_pretty());
        tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
    }
}

// Only reachable if serialising a string map fails.
fn unreachable_json() -> String {
    r#"{"metadata":{},"content":""}"#.to_string()
}

/// Combine metadata and content into the fixed result shape.
pub fn assemble(metadata: Metadata, content: String) -> ExtractionResult {
    ExtractionResult { metadata, content }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_lookup_ignores_case() {
        let mut m = Metadata::new();
        m.insert("Content-Type", "application/pdf");
        assert_eq!(m.get("content-type"), Some("application/pdf"));
        assert_eq!(m.get("CONTENT-TYPE"), Some("application/pdf"));
        assert!(m.contains_key("Content-type"));
        assert!(m.get("missing").is_none());
    }

    #[test]
    fn reinsert_keeps_first_spelling_and_last_value() {
        let mut m = Metadata::new();
        m.insert("dc:title", "Draft");
        m.insert("DC:Title", "Final");
        assert_eq!(m.len(), 1);
        assert_eq!(m.iter().collect::<Vec<_>>(), vec![("dc:title", "Final")]);
    }

    #[test]
    fn serialises_metadata_before_content() {
        let result = assemble(
            [("xmpTPg:NPages", "3"), ("Author", "Ada")].into_iter().collect(),
            "Hello".to_string(),
        );
        assert_eq!(
            result.to_json(),
            r#"{"metadata":{"Author":"Ada","xmpTPg:NPages":"3"},"content":"Hello"}"#
        );
    }

    #[test]
    fn empty_result_has_empty_content_not_null() {
        let result = assemble(Metadata::new(), String::new());
        assert_eq!(result.to_json(), r#"{"metadata":{},"content":""}"#);
    }

    #[tokio::test]
    async fn write_to_file_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out/deeper/result.json");
        let result = assemble([("Author", "Ada")].into_iter().collect(), "Body".into());

        result.write_to_file(&target).await.unwrap();

        let written = std::fs::read_to_string(&target).unwrap();
        assert_eq!(written, format!("{}\n", result.to_json_pretty()));
        assert!(!dir.path().join("out/deeper/result.json.tmp").exists());
    }

    #[tokio::test]
    async fn write_to_file_reports_the_target_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blocker"), b"file, not dir").unwrap();
        let target = dir.path().join("blocker/result.json");

        let err = ExtractionResult::default()
            .write_to_file(&target)
            .await
            .unwrap_err();
        match err {
            ExtractError::OutputWriteFailed { path, .. } => assert_eq!(path, target),
            other => panic!("Expected OutputWriteFailed, but got {other:?}"),
        }
    }

    #[test]
    fn deserialises_stored_output() {
        let parsed: ExtractionResult =
            serde_json::from_str(r#"{"metadata":{"Pages":"2"},"content":"text"}"#).unwrap();
        assert_eq!(parsed.metadata.get("pages"), Some("2"));
        assert_eq!(parsed.content, "text");

        let no_content: ExtractionResult = serde_json::from_str(r#"{"metadata":{}}"#).unwrap();
        assert_eq!(no_content.content, "");
    }
}
