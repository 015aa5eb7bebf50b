//! Raw resource configuration document.
//!
//! These structures mirror the YAML/JSON file one-to-one and carry
//! quantities as text. Nothing downstream reads them directly: the
//! [`validator`](crate::validator) converts them into typed values first.
//!
//! Workers and entities are kept as ordered entry lists because entity
//! declaration order decides how auto-divided cores are handed out. The
//! lists keep repeated keys so the validator can report them alongside
//! every other violation.

use std::fmt;
use std::path::Path;

use osscrs_common::error::{OssCrsError, Result};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_yaml::Value;

/// The whole configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDocument {
    /// Worker name to [`RawWorker`], in declaration order.
    #[serde(default)]
    pub workers: RawEntries,
    /// Optional global budget envelope.
    #[serde(default)]
    pub budget: Option<RawEnvelope>,
    /// Entity name to [`RawEntity`], in declaration order.
    #[serde(default)]
    pub entities: RawEntries,
}

/// A mapping read as a list of key/value pairs.
///
/// Unlike [`serde_yaml::Mapping`], a repeated key is kept rather than
/// rejected by the parser. A `null` value reads as an empty list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntries(Vec<(Value, Value)>);

impl RawEntries {
    /// Number of entries, repeats included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no entry is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|(k, _)| k)
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.0.iter().map(|(k, v)| (k, v))
    }
}

impl<'a> IntoIterator for &'a RawEntries {
    type Item = (&'a Value, &'a Value);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (Value, Value)>,
        fn(&'a (Value, Value)) -> (&'a Value, &'a Value),
    >;

    fn into_iter(self) -> Self::IntoIter {
        let split: fn(&'a (Value, Value)) -> (&'a Value, &'a Value) = |(k, v)| (k, v);
        self.0.iter().map(split)
    }
}

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<RawEntries, E> {
                Ok(RawEntries::default())
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<RawEntries, E> {
                Ok(RawEntries::default())
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<RawEntries, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<Value, Value>()? {
                    entries.push(entry);
                }
                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_any(EntriesVisitor)
    }
}

/// One machine's declared capacity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWorker {
    /// CPU cores available, e.g. `"0-15"`.
    pub cpu_capacity: Option<RawQuantity>,
    /// Memory available, e.g. `"16G"`.
    pub memory_capacity: Option<RawQuantity>,
    /// Dollar budget available to entities on this worker.
    pub budget_capacity: Option<RawQuantity>,
}

/// The global budget envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEnvelope {
    /// Total dollars across every entity and worker.
    pub max_budget: RawQuantity,
    /// Requests per minute allowed per credential.
    #[serde(default)]
    pub max_rate: Option<u32>,
}

/// One CRS instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEntity {
    /// Worker name to [`RawRequest`]; an entity runs on every worker listed.
    #[serde(default)]
    pub worker_resources: RawEntries,
    /// Models the entity's credential may use.
    #[serde(default)]
    pub models: Vec<String>,
    /// Per-entity override of the envelope's request rate.
    #[serde(default)]
    pub max_rate: Option<u32>,
    /// Container image launched for this entity.
    #[serde(default)]
    pub image: Option<String>,
}

/// Resources an entity requests on one worker. Omitted fields are
/// auto-divided.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRequest {
    /// Pinned cores.
    #[serde(default)]
    pub cpuset: Option<RawQuantity>,
    /// Memory limit.
    #[serde(default)]
    pub memory: Option<RawQuantity>,
    /// Dollar budget.
    #[serde(default)]
    pub budget: Option<RawQuantity>,
}

/// A quantity as written in the document.
///
/// YAML turns `cpuset: 5` and `budget: 60` into numbers, so every quantity
/// accepts a number or a string and is parsed from its text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawQuantity {
    /// An integer literal.
    Integer(i64),
    /// A floating-point literal.
    Float(f64),
    /// A string literal.
    Text(String),
}

impl fmt::Display for RawQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RawQuantity {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// Parses a configuration document from YAML (or JSON) text.
///
/// # Errors
///
/// Returns [`OssCrsError::Yaml`] if the document is not well-formed or has
/// unknown top-level keys.
pub fn from_yaml_str(content: &str) -> Result<RawDocument> {
    Ok(serde_yaml::from_str(content)?)
}

/// Reads and parses a configuration document from disk.
///
/// # Errors
///
/// Returns [`OssCrsError::Io`] if the file cannot be read, or
/// [`OssCrsError::Yaml`] if it is malformed.
pub fn load_file(path: &Path) -> Result<RawDocument> {
    tracing::debug!(path = %path.display(), "loading resource configuration");
    let content = std::fs::read_to_string(path).map_err(|e| OssCrsError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    from_yaml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
workers:
  local:
    cpu_capacity: "0-15"
    memory_capacity: 16G
    budget_capacity: 100
budget:
  max_budget: 250.5
  max_rate: 60
entities:
  crs2:
    worker_resources:
      local: {}
  crs1:
    worker_resources:
      local: {cpuset: "0-7", memory: 8G, budget: 60}
    models: [gpt-4o]
    image: ghcr.io/example/crs1:latest
"#;

    #[test]
    fn parses_sample_document() {
        let doc = from_yaml_str(SAMPLE).unwrap();
        assert_eq!(doc.workers.len(), 1);
        assert_eq!(doc.entities.len(), 2);
        let envelope = doc.budget.unwrap();
        assert_eq!(envelope.max_budget, RawQuantity::Float(250.5));
        assert_eq!(envelope.max_rate, Some(60));
    }

    #[test]
    fn entity_order_is_declaration_order() {
        let doc = from_yaml_str(SAMPLE).unwrap();
        let names: Vec<_> = doc.entities.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["crs2", "crs1"]);
    }

    #[test]
    fn numeric_quantities_display_as_text() {
        assert_eq!(RawQuantity::Integer(5).to_string(), "5");
        assert_eq!(RawQuantity::Float(12.5).to_string(), "12.5");
        assert_eq!(RawQuantity::from("0-3").to_string(), "0-3");
    }

    #[test]
    fn repeated_keys_are_kept_in_order() {
        let doc = from_yaml_str(
            "entities:\n  crs1: {image: a}\n  crs2: {}\n  crs1: {image: b}\nworkers:\n",
        )
        .unwrap();
        let names: Vec<_> = doc.entities.keys().filter_map(Value::as_str).collect();
        assert_eq!(names, vec!["crs1", "crs2", "crs1"]);
        assert!(doc.workers.is_empty());
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        assert!(from_yaml_str("wrokers: {}\n").is_err());
    }

    #[test]
    fn json_document_is_accepted() {
        let doc = from_yaml_str(r#"{"workers": {"w": {"cpu_capacity": "0-1"}}}"#).unwrap();
        assert_eq!(doc.workers.len(), 1);
    }

    #[test]
    fn load_file_reads_from_disk() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("oss-crs.yaml");
        std::fs::write(&path, SAMPLE).expect("write failed");
        let doc = load_file(&path).expect("load failed");
        assert_eq!(doc.entities.len(), 2);
    }

    #[test]
    fn load_file_missing_is_io_error() {
        let err = load_file(Path::new("/nonexistent/oss-crs.yaml")).unwrap_err();
        assert!(matches!(err, OssCrsError::Io { .. }));
    }
}
