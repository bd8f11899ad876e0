use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

use crate::error::{Error, Result};
use crate::term_index::{TermIndex, TermIndexOptions};

/// Header stored in front of every term-index snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub data_structure: String,
    pub date: String,
    pub terms: usize,
    pub documents: usize,
    /// Caller-supplied fields, stored inline next to the fixed ones.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SnapshotMeta {
    /// Header for `index`. Caller fields win over the computed ones with the
    /// same name, but must still have the right type.
    pub fn describe(index: &TermIndex, extra: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut fields = serde_json::Map::new();
        fields.insert("data_structure".into(), index.to_string().into());
        fields.insert(
            "date".into(),
            time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default().into(),
        );
        fields.insert("terms".into(), index.term_count().into());
        fields.insert("documents".into(), index.document_count().into());
        fields.extend(extra);
        serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| Error::InvalidInput(format!("snapshot metadata: {e}")))
    }
}

/// Structural snapshot of a `TermIndex`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub documents: BTreeMap<String, u64>,
    pub terms: BTreeMap<String, BTreeMap<String, u32>>,
}

#[derive(Deserialize)]
struct MetaOnly {
    meta: SnapshotMeta,
}

/// Labelled data source: document path -> label, `None` for unlabelled.
pub type DataSource = BTreeMap<PathBuf, Option<String>>;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            create_dir_all(dir)?;
        }
    }
    Ok(())
}

pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let mut f = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut f, value)?;
    f.write_all(b"\n")?;
    f.flush()?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(f)?)
}

/// Save `index` as a pretty JSON snapshot with extra metadata fields.
pub fn save_index(path: &Path, index: &TermIndex, extra: serde_json::Map<String, serde_json::Value>) -> Result<SnapshotMeta> {
    let snapshot = index.to_snapshot(extra)?;
    save_json(path, &snapshot)?;
    tracing::info!(path = %path.display(), terms = snapshot.meta.terms, documents = snapshot.meta.documents, "saved term index");
    Ok(snapshot.meta)
}

pub fn load_index(path: &Path, options: TermIndexOptions) -> Result<(TermIndex, SnapshotMeta)> {
    let snapshot: Snapshot = load_json(path)?;
    let meta = snapshot.meta.clone();
    Ok((TermIndex::from_snapshot(snapshot, options), meta))
}

/// Read only the header of a snapshot; term and document maps are skipped, not kept.
pub fn load_meta(path: &Path) -> Result<SnapshotMeta> {
    let only: MetaOnly = load_json(path)?;
    Ok(only.meta)
}

pub fn load_data_source(path: &Path) -> Result<DataSource> {
    load_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn extra() -> serde_json::Map<String, serde_json::Value> {
        let mut m = serde_json::Map::new();
        m.insert("subreddit".into(), json!("python"));
        m.insert("min_frequency".into(), json!(0.01));
        m
    }

    #[test]
    fn snapshot_round_trip_keeps_contents_and_meta() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        let mut index = TermIndex::new();
        index.add_term_occurrence("word", "a.txt");
        index.add_term_occurrence("word", "a.txt");
        index.add_term_occurrence("malta", "b.txt");

        let saved = save_index(&path, &index, extra()).unwrap();
        let (loaded, meta) = load_index(&path, TermIndexOptions::default()).unwrap();
        assert!(loaded.same_contents(&index));
        assert_eq!(meta, saved);
        assert_eq!(meta.terms, 2);
        assert_eq!(meta.documents, 2);
        assert_eq!(meta.extra.get("subreddit"), Some(&json!("python")));

        let header = load_meta(&path).unwrap();
        assert_eq!(header.extra.get("min_frequency"), Some(&json!(0.01)));
        assert_eq!(header.data_structure, "<TermIndex: 2 terms, 2 documents>");
    }

    #[test]
    fn caller_fields_override_header_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let mut index = TermIndex::new();
        index.add_term_occurrence("word", "a.txt");

        let mut extra = extra();
        extra.insert("date".into(), json!("2014-01-01"));
        let saved = save_index(&path, &index, extra).unwrap();
        assert_eq!(saved.date, "2014-01-01");
        assert!(!saved.extra.contains_key("date"));

        let (loaded, meta) = load_index(&path, TermIndexOptions::default()).unwrap();
        assert!(loaded.same_contents(&index));
        assert_eq!(meta.date, "2014-01-01");
        assert_eq!(load_meta(&path).unwrap().extra.get("subreddit"), Some(&json!("python")));
    }

    #[test]
    fn mistyped_header_field_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let mut extra = serde_json::Map::new();
        extra.insert("terms".into(), json!("many"));
        let err = save_index(&path, &TermIndex::new(), extra);
        assert!(matches!(err, Err(Error::InvalidInput(_))));
        assert!(!path.exists());
    }

    #[test]
    fn data_source_accepts_null_labels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"{"pages/a.txt": "python", "pages/b.txt": null}"#).unwrap();
        let data = load_data_source(&path).unwrap();
        assert_eq!(data.get(Path::new("pages/a.txt")), Some(&Some("python".to_string())));
        assert_eq!(data.get(Path::new("pages/b.txt")), Some(&None));
    }
}
