use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::persist::{Snapshot, SnapshotMeta};

/// What a missing term or document lookup returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupPolicy {
    /// Zero or empty defaults.
    #[default]
    Lenient,
    /// `Error::TermNotFound` / `Error::DocumentNotFound`.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TermIndexOptions {
    /// Lowercase terms and document ids on the way in and on every lookup.
    pub fold_case: bool,
    pub policy: LookupPolicy,
}

impl TermIndexOptions {
    pub fn strict() -> Self {
        Self { fold_case: false, policy: LookupPolicy::Strict }
    }
}

/// Cell weighting used when exporting vectors and matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightMode {
    #[default]
    Tfidf,
    /// Raw occurrence count.
    Count,
    /// Count divided by document length.
    Tf,
}

impl FromStr for WeightMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tfidf" => Ok(WeightMode::Tfidf),
            "count" => Ok(WeightMode::Count),
            "tf" => Ok(WeightMode::Tf),
            other => Err(Error::InvalidInput(format!("unexpected weight mode: {other}"))),
        }
    }
}

/// In-memory inverted index of term occurrence counts per document.
///
/// Terms and documents iterate in sorted order, so `terms()` and `documents()`
/// always address the columns and rows of a generated feature matrix.
#[derive(Debug, Clone, Default)]
pub struct TermIndex {
    terms: BTreeMap<String, BTreeMap<String, u32>>,
    documents: BTreeMap<String, u64>,
    frozen: bool,
    options: TermIndexOptions,
}

impl fmt::Display for TermIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TermIndex: {} terms, {} documents>", self.terms.len(), self.documents.len())
    }
}

impl TermIndex {
    pub fn new() -> Self { Self::default() }

    pub fn with_options(options: TermIndexOptions) -> Self {
        Self { options, ..Self::default() }
    }

    pub fn options(&self) -> TermIndexOptions { self.options }

    fn key<'a>(&self, s: &'a str) -> Cow<'a, str> {
        if self.options.fold_case { Cow::Owned(s.to_lowercase()) } else { Cow::Borrowed(s) }
    }

    fn strict(&self) -> bool { self.options.policy == LookupPolicy::Strict }

    /// Resets to a clean state without any terms or documents. The frozen flag is kept.
    pub fn clear(&mut self) {
        self.terms.clear();
        self.documents.clear();
    }

    /// Stop `add_term_occurrence` from introducing new terms.
    pub fn freeze(&mut self) { self.frozen = true; }

    pub fn unfreeze(&mut self) { self.frozen = false; }

    pub fn is_frozen(&self) -> bool { self.frozen }

    /// Records one occurrence of `term` in `document`.
    ///
    /// Returns `false` when the index is frozen and `term` is unseen; nothing
    /// is recorded in that case, not even the document.
    pub fn add_term_occurrence(&mut self, term: &str, document: &str) -> bool {
        let term = self.key(term).into_owned();
        let document = self.key(document).into_owned();

        if self.frozen && !self.terms.contains_key(&term) {
            tracing::trace!(%term, %document, "frozen index dropped unseen term");
            return false;
        }

        *self.terms.entry(term).or_default().entry(document.clone()).or_insert(0) += 1;
        *self.documents.entry(document).or_insert(0) += 1;
        true
    }

    pub fn contains_term(&self, term: &str) -> bool {
        self.terms.contains_key(self.key(term).as_ref())
    }

    pub fn contains_document(&self, document: &str) -> bool {
        self.documents.contains_key(self.key(document).as_ref())
    }

    /// Document -> count map of a term.
    pub fn postings(&self, term: &str) -> Result<Option<&BTreeMap<String, u32>>> {
        match self.terms.get(self.key(term).as_ref()) {
            Some(p) => Ok(Some(p)),
            None if self.strict() => Err(Error::TermNotFound(term.to_string())),
            None => Ok(None),
        }
    }

    pub fn get_term_frequency(&self, term: &str, document: &str) -> Result<u32> {
        let doc_key = self.key(document);
        if self.strict() && !self.documents.contains_key(doc_key.as_ref()) {
            return Err(Error::DocumentNotFound(document.to_string()));
        }
        let Some(postings) = self.postings(term)? else { return Ok(0) };
        Ok(postings.get(doc_key.as_ref()).copied().unwrap_or(0))
    }

    /// Number of distinct documents containing `term`.
    pub fn get_document_frequency(&self, term: &str) -> Result<usize> {
        Ok(self.postings(term)?.map_or(0, |p| p.len()))
    }

    /// Occurrences of `term` across the whole index.
    pub fn get_total_term_frequency(&self, term: &str) -> Result<u64> {
        Ok(self.postings(term)?.map_or(0, |p| p.values().map(|&c| c as u64).sum()))
    }

    /// Number of term occurrences recorded for `document`.
    pub fn get_document_length(&self, document: &str) -> Result<u64> {
        match self.documents.get(self.key(document).as_ref()) {
            Some(&len) => Ok(len),
            None if self.strict() => Err(Error::DocumentNotFound(document.to_string())),
            None => Ok(0),
        }
    }

    /// `tf * log10((1 + N) / (1 + df))`, exactly 0.0 when `tf` is 0.
    pub fn get_tfidf(&self, term: &str, document: &str) -> Result<f64> {
        let tf = self.get_term_frequency(term, document)?;
        if tf == 0 {
            return Ok(0.0);
        }
        let df = self.get_document_frequency(term)?;
        Ok(smoothed_tfidf(tf, df, self.documents.len()))
    }

    pub fn terms(&self) -> Vec<&str> { self.terms.keys().map(String::as_str).collect() }

    pub fn documents(&self) -> Vec<&str> { self.documents.keys().map(String::as_str).collect() }

    pub fn items(&self) -> &BTreeMap<String, BTreeMap<String, u32>> { &self.terms }

    pub fn term_count(&self) -> usize { self.terms.len() }

    pub fn document_count(&self) -> usize { self.documents.len() }

    fn cell(&self, count: u32, df: usize, doc_len: u64, mode: WeightMode) -> f64 {
        match mode {
            WeightMode::Tfidf if count == 0 => 0.0,
            WeightMode::Tfidf => smoothed_tfidf(count, df, self.documents.len()),
            WeightMode::Count => count as f64,
            WeightMode::Tf if doc_len == 0 => 0.0,
            WeightMode::Tf => count as f64 / doc_len as f64,
        }
    }

    /// One document as a vector over `terms()`.
    pub fn generate_document_vector(&self, document: &str, mode: WeightMode) -> Result<Array1<f64>> {
        let doc_len = self.get_document_length(document)?;
        let doc_key = self.key(document);
        let mut out = Array1::zeros(self.terms.len());
        for (j, postings) in self.terms.values().enumerate() {
            let count = postings.get(doc_key.as_ref()).copied().unwrap_or(0);
            out[j] = self.cell(count, postings.len(), doc_len, mode);
        }
        Ok(out)
    }

    /// Documents x terms matrix; rows follow `documents()`, columns follow `terms()`.
    pub fn generate_feature_matrix(&self, mode: WeightMode) -> Array2<f64> {
        let rows: HashMap<&str, usize> = self
            .documents
            .keys()
            .enumerate()
            .map(|(i, d)| (d.as_str(), i))
            .collect();
        let mut out = Array2::zeros((self.documents.len(), self.terms.len()));
        for (j, postings) in self.terms.values().enumerate() {
            let df = postings.len();
            for (doc, &count) in postings {
                let Some(&i) = rows.get(doc.as_str()) else { continue };
                let doc_len = self.documents.get(doc).copied().unwrap_or(0);
                out[[i, j]] = self.cell(count, df, doc_len, mode);
            }
        }
        out
    }

    /// Removes every term whose document-frequency ratio `df / N` falls
    /// outside `[min_frequency, max_frequency]`. Returns how many were removed.
    pub fn prune(&mut self, min_frequency: f64, max_frequency: f64) -> usize {
        let n = self.documents.len();
        if n == 0 {
            return 0;
        }
        let before = self.terms.len();
        self.terms.retain(|_, postings| {
            let ratio = postings.len() as f64 / n as f64;
            ratio >= min_frequency && ratio <= max_frequency
        });
        let removed = before - self.terms.len();
        tracing::debug!(removed, remaining = self.terms.len(), min_frequency, max_frequency, "pruned term index");
        removed
    }

    /// Equality of term maps and document sets; options and frozen state are ignored.
    pub fn same_contents(&self, other: &TermIndex) -> bool {
        self.terms == other.terms && self.documents == other.documents
    }

    /// Structural snapshot with caller-supplied metadata fields.
    pub fn to_snapshot(&self, extra: serde_json::Map<String, serde_json::Value>) -> Result<Snapshot> {
        Ok(Snapshot {
            meta: SnapshotMeta::describe(self, extra)?,
            documents: self.documents.clone(),
            terms: self.terms.clone(),
        })
    }

    /// Rebuilds an index from a snapshot. Zero counts and empty terms are dropped.
    pub fn from_snapshot(snapshot: Snapshot, options: TermIndexOptions) -> Self {
        let mut terms = snapshot.terms;
        for postings in terms.values_mut() {
            postings.retain(|_, count| *count > 0);
        }
        terms.retain(|_, postings| !postings.is_empty());
        Self { terms, documents: snapshot.documents, frozen: false, options }
    }
}

fn smoothed_tfidf(tf: u32, df: usize, n: usize) -> f64 {
    tf as f64 * ((1.0 + n as f64) / (1.0 + df as f64)).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TermIndex {
        let mut index = TermIndex::new();
        for _ in 0..3 { index.add_term_occurrence("word", "document1.txt"); }
        for _ in 0..5 { index.add_term_occurrence("malta", "document1.txt"); }
        for _ in 0..4 { index.add_term_occurrence("phone", "document2.txt"); }
        for _ in 0..2 { index.add_term_occurrence("word", "document2.txt"); }
        index
    }

    #[test]
    fn counts_occurrences() {
        let index = sample();
        assert_eq!(index.get_term_frequency("word", "document1.txt").unwrap(), 3);
        assert_eq!(index.get_term_frequency("malta", "document1.txt").unwrap(), 5);
        assert_eq!(index.get_term_frequency("phone", "document2.txt").unwrap(), 4);
        assert_eq!(index.get_term_frequency("word", "document2.txt").unwrap(), 2);
        assert_eq!(index.get_term_frequency("malta", "document2.txt").unwrap(), 0);
        assert_eq!(index.get_term_frequency("doesnotexist", "document1.txt").unwrap(), 0);
    }

    #[test]
    fn document_and_total_frequencies() {
        let index = sample();
        assert_eq!(index.get_document_frequency("word").unwrap(), 2);
        assert_eq!(index.get_document_frequency("malta").unwrap(), 1);
        assert_eq!(index.get_document_frequency("doesnotexist").unwrap(), 0);
        assert_eq!(index.get_total_term_frequency("word").unwrap(), 5);
        assert_eq!(index.get_document_length("document1.txt").unwrap(), 8);
        assert_eq!(index.get_document_length("document2.txt").unwrap(), 6);
    }

    #[test]
    fn rarer_terms_score_higher() {
        let index = sample();
        let word = index.get_tfidf("word", "document1.txt").unwrap();
        let malta = index.get_tfidf("malta", "document1.txt").unwrap();
        assert!(word < malta);
        assert_eq!(index.get_tfidf("malta", "document2.txt").unwrap(), 0.0);
        assert_eq!(index.get_tfidf("doesnotexist", "document1.txt").unwrap(), 0.0);
        assert_eq!(index.get_tfidf("word", "nowhere.txt").unwrap(), 0.0);
    }

    #[test]
    fn strict_policy_reports_missing_keys() {
        let mut index = TermIndex::with_options(TermIndexOptions::strict());
        index.add_term_occurrence("word", "a");
        index.add_term_occurrence("malta", "b");
        assert!(matches!(index.get_term_frequency("nope", "a"), Err(Error::TermNotFound(_))));
        assert!(matches!(index.get_term_frequency("word", "zzz"), Err(Error::DocumentNotFound(_))));
        assert!(matches!(index.get_document_frequency("nope"), Err(Error::TermNotFound(_))));
        assert!(matches!(index.get_document_length("zzz"), Err(Error::DocumentNotFound(_))));
        assert!(matches!(index.get_tfidf("nope", "a"), Err(Error::TermNotFound(_))));
        // present term, present document, no overlap
        assert_eq!(index.get_term_frequency("malta", "a").unwrap(), 0);
    }

    #[test]
    fn case_folding_merges_terms_and_documents() {
        let mut index = TermIndex::with_options(TermIndexOptions { fold_case: true, ..Default::default() });
        for _ in 0..3 { index.add_term_occurrence("malta", "document1.txt"); }
        for _ in 0..2 { index.add_term_occurrence("Malta", "DocumenT1.txt"); }
        assert_eq!(index.get_term_frequency("MALTA", "document1.txt").unwrap(), 5);
        assert!(index.contains_term("MaLtA"));
        assert_eq!(index.documents(), vec!["document1.txt"]);
    }

    #[test]
    fn frozen_index_ignores_new_terms() {
        let mut index = sample();
        index.freeze();
        assert!(!index.add_term_occurrence("novel", "document3.txt"));
        assert!(!index.contains_term("novel"));
        assert!(!index.contains_document("document3.txt"));
        assert!(index.add_term_occurrence("word", "document3.txt"));
        assert_eq!(index.get_term_frequency("word", "document3.txt").unwrap(), 1);
        index.unfreeze();
        assert!(index.add_term_occurrence("novel", "document3.txt"));
    }

    #[test]
    fn feature_matrix_matches_terms_and_documents() {
        let index = sample();
        let counts = index.generate_feature_matrix(WeightMode::Count);
        assert_eq!(counts.dim(), (2, 3));
        let docs = index.documents();
        let terms = index.terms();
        for (i, doc) in docs.iter().enumerate() {
            for (j, term) in terms.iter().enumerate() {
                assert_eq!(counts[[i, j]], index.get_term_frequency(term, doc).unwrap() as f64);
            }
        }

        let tf = index.generate_feature_matrix(WeightMode::Tf);
        for row in tf.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }

        let tfidf = index.generate_feature_matrix(WeightMode::Tfidf);
        assert!(tfidf.iter().all(|&v| v >= 0.0));
        let vector = index.generate_document_vector("document1.txt", WeightMode::Tfidf).unwrap();
        assert_eq!(vector, tfidf.row(0));
    }

    #[test]
    fn prune_by_document_frequency_ratio() {
        let mut index = sample();
        index.add_term_occurrence("rare", "document3.txt");
        index.add_term_occurrence("word", "document3.txt");
        // N = 3: word 3/3, malta 1/3, phone 1/3, rare 1/3
        let removed = index.prune(0.5, 1.0);
        assert_eq!(removed, 3);
        assert_eq!(index.terms(), vec!["word"]);
        assert_eq!(index.prune(0.5, 1.0), 0);
        assert_eq!(index.document_count(), 3);

        let mut index = sample();
        assert_eq!(index.prune(0.0, 0.9), 1);
        assert!(!index.contains_term("word"));
    }

    #[test]
    fn clear_and_display() {
        let mut index = sample();
        assert_eq!(index.to_string(), "<TermIndex: 3 terms, 2 documents>");
        index.clear();
        assert_eq!(index.term_count(), 0);
        assert_eq!(index.document_count(), 0);
    }

    #[test]
    fn weight_mode_parses() {
        assert_eq!("tf".parse::<WeightMode>().unwrap(), WeightMode::Tf);
        assert!("bm25".parse::<WeightMode>().is_err());
    }
}
