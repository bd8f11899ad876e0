//! Positive-vs-unlabelled feature matrices for downstream classifiers.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::FeatureConfig;
use crate::error::Result;
use crate::persist::DataSource;
use crate::ranker::ConceptRanker;
use crate::store::{ConceptStore, PageId};
use crate::term_index::TermIndex;
use crate::tokenizer::Tokenizer;

/// Dense documents x features matrix with one label per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub matrix: Array2<f64>,
    /// 1 for labelled documents, 0 for unlabelled ones.
    pub labels: Array1<f64>,
}

impl FeatureSet {
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l > 0.0).count()
    }
}

fn label_value(label: &Option<String>) -> f64 {
    if label.is_some() { 1.0 } else { 0.0 }
}

/// Read a document, or `None` if it is missing or unreadable.
fn read_document(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "document not found, skipping");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable document, skipping");
            None
        }
    }
}

/// Bag-of-words features: one column per surviving term.
pub fn bag_of_words(data: &DataSource, tokenizer: &Tokenizer, config: &FeatureConfig) -> Result<FeatureSet> {
    let mut index = TermIndex::new();
    let mut labels = BTreeMap::new();
    for (path, label) in data {
        let Some(text) = read_document(path) else { continue };
        let key = path.display().to_string();
        for term in tokenizer.terms(&text) {
            index.add_term_occurrence(&term, &key);
        }
        labels.insert(key, label_value(label));
    }

    if let Some(prune) = &config.prune {
        index.prune(prune.min_frequency, prune.max_frequency);
    }

    let rows: Vec<String> = index.documents().into_iter().map(str::to_string).collect();
    let labels = rows.iter().map(|r| labels.get(r).copied().unwrap_or(0.0)).collect();
    let features = FeatureSet {
        columns: index.terms().into_iter().map(str::to_string).collect(),
        matrix: index.generate_feature_matrix(config.mode),
        rows,
        labels,
    };
    tracing::info!(rows = features.rows.len(), columns = features.columns.len(), "built bag-of-words features");
    Ok(features)
}

/// Bag-of-concepts features: one column per concept page any document retrieved.
pub fn bag_of_concepts<S: ConceptStore + ?Sized>(
    data: &DataSource,
    ranker: &ConceptRanker<'_, S>,
    config: &FeatureConfig,
) -> Result<FeatureSet> {
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    let mut per_row: Vec<Vec<(PageId, f64)>> = Vec::new();
    let mut concepts = BTreeSet::new();

    for (path, label) in data {
        let Some(text) = read_document(path) else { continue };
        if text.chars().count() < config.min_text_length {
            tracing::debug!(path = %path.display(), "document too short, skipping");
            continue;
        }
        let found = match ranker.word_concepts(&text, None)? {
            Some(found) if !found.results.is_empty() => found,
            _ => {
                tracing::warn!(path = %path.display(), "no concepts for document, skipping");
                continue;
            }
        };
        let weights: Vec<(PageId, f64)> = found
            .results
            .into_iter()
            .take(config.n_concepts)
            .filter(|r| r.weight > 0.0)
            .map(|r| (r.page_id, r.weight))
            .collect();
        concepts.extend(weights.iter().map(|(id, _)| *id));
        rows.push(path.display().to_string());
        labels.push(label_value(label));
        per_row.push(weights);
    }

    let column_of: BTreeMap<PageId, usize> = concepts.iter().enumerate().map(|(j, id)| (*id, j)).collect();
    let mut matrix = Array2::zeros((rows.len(), concepts.len()));
    for (i, weights) in per_row.iter().enumerate() {
        for (id, weight) in weights {
            matrix[[i, column_of[id]]] = *weight;
        }
    }

    let features = FeatureSet {
        rows,
        columns: concepts.iter().map(|id| id.to_string()).collect(),
        matrix,
        labels: Array1::from(labels),
    };
    tracing::info!(rows = features.rows.len(), columns = features.columns.len(), "built bag-of-concepts features");
    Ok(features)
}
