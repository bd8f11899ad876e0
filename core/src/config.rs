//! Per-operation configuration for indexing, ranking and feature export.

use serde::{Deserialize, Serialize};

use crate::term_index::WeightMode;

/// How link-matrix cells are filled from raw link multiplicities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkWeighting {
    /// 1 when any link exists.
    #[default]
    Single,
    /// The raw multiplicity.
    Count,
    /// `1 + ln(count)`.
    Log,
}

/// Parameters of `word_concepts` and the second-order re-rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Number of driver terms used to gather candidate pages.
    pub n: usize,
    /// Salience cutoff; query terms at or below this weight are dropped.
    pub min_tfidf: f64,
    /// Blend weight of the link signal in the re-rank.
    pub alpha: f64,
    /// A candidate page must contain a driver term more than this many times.
    pub min_counter: u32,
    /// Candidate pages fetched per driver term.
    pub limit: usize,
    pub link_weighting: LinkWeighting,
    /// Ignore links between pages retrieved by the same driver term.
    pub discount_co_retrieved: bool,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            n: 15,
            min_tfidf: 0.5,
            alpha: 0.5,
            min_counter: 2,
            limit: 40,
            link_weighting: LinkWeighting::Single,
            discount_co_retrieved: false,
        }
    }
}

/// Document-frequency ratio bounds for `TermIndex::prune`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    pub min_frequency: f64,
    pub max_frequency: f64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self { min_frequency: 0.0, max_frequency: 1.0 }
    }
}

/// Rules applied while ingesting the concept corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Pages with fewer terms are not indexed.
    pub min_page_length: u32,
    /// Terms whose corpus-wide count is below this are pruned.
    pub min_term_total: u32,
    /// Page titles starting with any of these are skipped.
    pub ignore_prefixes: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            min_page_length: 200,
            min_term_total: 3,
            ignore_prefixes: ["List of", "Wikipedia:", "Template:", "File:", "Category:", "Help:", "Portal:"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Feature-matrix export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Concepts kept per document on the bag-of-concepts path.
    pub n_concepts: usize,
    /// Documents shorter than this many characters are skipped on the bag-of-concepts path.
    pub min_text_length: usize,
    /// Weighting on the bag-of-words path.
    pub mode: WeightMode,
    pub prune: Option<PruneConfig>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { n_concepts: 10, min_text_length: 500, mode: WeightMode::Tfidf, prune: None }
    }
}
