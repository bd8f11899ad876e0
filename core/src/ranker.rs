//! Text to ranked concept pages ("bag of concepts").
//!
//! Ranking runs in two passes. Candidate pages are scored by cosine
//! similarity between their tfidf vector and the query vector, then
//! re-scored with a link-authority signal taken from the links among the
//! candidates themselves.

use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::{LinkWeighting, RankerConfig};
use crate::error::{Error, Result};
use crate::store::{ConceptStore, PageId, TermId};
use crate::tokenizer::Tokenizer;

/// Weight given to the plain similarity term of the re-ranked score.
const SIMILARITY_BLEND: f64 = 1.5;
const MIN_AUTHORITY: f64 = 1.0;
const MAX_AUTHORITY: f64 = 8.0;

/// `(1 + ln tf) * ln(N / df)`, or 0 when `tf` or `df` is 0.
pub fn tfidf(tf: u32, df: u32, corpus_size: u32) -> f64 {
    if tf == 0 || df == 0 {
        return 0.0;
    }
    (1.0 + (tf as f64).ln()) * (corpus_size as f64 / df as f64).ln()
}

/// Cosine of the angle between `a` and `b`; 0 if either has zero norm.
pub fn cosine_similarity(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    let denom = a.dot(a).sqrt() * b.dot(b).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub page_id: PageId,
    pub page_name: String,
    /// Page weights over the query term dimensions.
    pub vector: Array1<f64>,
    pub weight: f64,
    pub incoming: Option<f64>,
    pub outgoing: Option<f64>,
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {:.6}", self.page_name, self.page_id, self.weight)
    }
}

/// Output of `word_concepts`.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptMatch {
    /// Highest weight first.
    pub results: Vec<SearchResult>,
    /// Query term names in query-vector order.
    pub terms: Vec<String>,
    pub query_vector: Array1<f64>,
}

fn by_weight_desc(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal).then(a.page_id.cmp(&b.page_id))
}

struct QueryTerms {
    /// (term id, name, weight), highest weight first.
    terms: Vec<(TermId, String, f64)>,
    document_frequencies: HashMap<TermId, u32>,
    corpus_size: u32,
}

pub struct ConceptRanker<'a, S: ConceptStore + ?Sized> {
    store: &'a S,
    tokenizer: Tokenizer,
    config: RankerConfig,
}

impl<'a, S: ConceptStore + ?Sized> ConceptRanker<'a, S> {
    pub fn new(store: &'a S, tokenizer: Tokenizer, config: RankerConfig) -> Self {
        Self { store, tokenizer, config }
    }

    pub fn config(&self) -> &RankerConfig { &self.config }

    /// Concepts related to `text`, most similar first.
    ///
    /// Title terms count twice as much as body terms. Returns `None` when the
    /// text has no usable terms at all.
    pub fn word_concepts(&self, text: &str, title: Option<&str>) -> Result<Option<ConceptMatch>> {
        let mut counts = self.tokenizer.term_counts(text);
        let total: u32 = counts.values().sum();
        let query_norm = (1.0 + total as f64).ln();
        if query_norm == 0.0 {
            return Ok(None);
        }

        if let Some(title) = title {
            for (term, count) in self.tokenizer.term_counts(title) {
                *counts.entry(term).or_insert(0) += 2 * count;
            }
        }

        let query = self.query_terms(&counts, query_norm)?;
        let term_index: HashMap<TermId, usize> =
            query.terms.iter().enumerate().map(|(i, (id, _, _))| (*id, i)).collect();
        let query_vector: Array1<f64> = query.terms.iter().map(|(_, _, w)| *w).collect();
        let terms: Vec<String> = query.terms.iter().map(|(_, name, _)| name.clone()).collect();

        let (pages, per_term) = self.candidate_pages(&query)?;
        let mut results = self.similarity_results(&pages, &query, &term_index, &query_vector)?;

        if !results.is_empty() {
            let page_ids: Vec<PageId> = results.iter().map(|r| r.page_id).collect();
            let co_retrieved = if self.config.discount_co_retrieved { Some(per_term.as_slice()) } else { None };
            let links = link_matrix(self.store, &page_ids, self.config.link_weighting, co_retrieved)?;
            second_order_ranking(&mut results, &links, self.config.alpha)?;
        }

        tracing::debug!(
            query_terms = terms.len(),
            candidates = pages.len(),
            results = results.len(),
            "ranked concepts"
        );
        Ok(Some(ConceptMatch { results, terms, query_vector }))
    }

    /// Resolve, weight and filter the query terms.
    fn query_terms(&self, counts: &HashMap<String, u32>, query_norm: f64) -> Result<QueryTerms> {
        let mut names: Vec<String> = counts.keys().cloned().collect();
        names.sort();
        let resolved = self.store.term_ids(&names)?;
        let ids: Vec<TermId> = resolved.iter().map(|(_, id)| *id).collect();
        let document_frequencies: HashMap<TermId, u32> = self.store.document_frequencies(&ids)?.into_iter().collect();
        let corpus_size = self.store.corpus_size()?;

        let mut terms = Vec::new();
        for (name, id) in resolved {
            let Some(&df) = document_frequencies.get(&id) else { continue };
            let tf = counts.get(&name).copied().unwrap_or(0);
            let weight = tfidf(tf, df, corpus_size) / query_norm;
            if weight > self.config.min_tfidf {
                terms.push((id, name, weight));
            }
        }
        terms.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        Ok(QueryTerms { terms, document_frequencies, corpus_size })
    }

    /// Union of the pages retrieved by the top `n` terms, plus each term's own list.
    fn candidate_pages(&self, query: &QueryTerms) -> Result<(Vec<PageId>, Vec<Vec<PageId>>)> {
        let mut seen = HashSet::new();
        let mut pages = Vec::new();
        let mut per_term = Vec::new();
        for (term_id, _, _) in query.terms.iter().take(self.config.n) {
            let related = self.store.pages_for_term(*term_id, self.config.min_counter, self.config.limit)?;
            for &page in &related {
                if seen.insert(page) {
                    pages.push(page);
                }
            }
            per_term.push(related);
        }
        Ok((pages, per_term))
    }

    fn similarity_results(
        &self,
        pages: &[PageId],
        query: &QueryTerms,
        term_index: &HashMap<TermId, usize>,
        query_vector: &Array1<f64>,
    ) -> Result<Vec<SearchResult>> {
        if pages.is_empty() {
            return Ok(Vec::new());
        }
        let term_ids: Vec<TermId> = query.terms.iter().map(|(id, _, _)| *id).collect();
        let dims = query_vector.len();

        let mut page_vectors: HashMap<PageId, Array1<f64>> = HashMap::new();
        for occ in self.store.term_occurrences(pages, &term_ids)? {
            let (Some(&index), Some(&df)) = (term_index.get(&occ.term_id), query.document_frequencies.get(&occ.term_id)) else {
                return Err(Error::Store(format!("occurrence of unrequested term {}", occ.term_id)));
            };
            page_vectors.entry(occ.page_id).or_insert_with(|| Array1::zeros(dims))[index] =
                tfidf(occ.count, df, query.corpus_size);
        }

        let totals = self.store.tfidf_totals(pages)?;
        let mut results = Vec::with_capacity(pages.len());
        for page in self.store.page_data(pages)? {
            let mut vector = page_vectors.remove(&page.page_id).unwrap_or_else(|| Array1::zeros(dims));
            let mass = totals
                .as_ref()
                .and_then(|t| t.get(&page.page_id).copied())
                .unwrap_or(page.length as f64);
            let normaliser = mass.ln();
            if normaliser.is_finite() && normaliser > 0.0 {
                vector /= normaliser;
            }
            let weight = cosine_similarity(&vector, query_vector);
            results.push(SearchResult {
                page_id: page.page_id,
                page_name: page.name,
                vector,
                weight,
                incoming: None,
                outgoing: None,
            });
        }
        results.sort_by(by_weight_desc);
        Ok(results)
    }
}

/// Square matrix over `pages` where cell `[i, j]` is the link from page `j`
/// to page `i`, so row sums count incoming links and column sums outgoing.
///
/// With `co_retrieved`, links between two pages that the same candidate list
/// holds are left out.
pub fn link_matrix<S: ConceptStore + ?Sized>(
    store: &S,
    pages: &[PageId],
    weighting: LinkWeighting,
    co_retrieved: Option<&[Vec<PageId>]>,
) -> Result<Array2<f64>> {
    let index: HashMap<PageId, usize> = pages.iter().enumerate().map(|(i, p)| (*p, i)).collect();
    let mut matrix = Array2::zeros((pages.len(), pages.len()));
    if pages.is_empty() {
        return Ok(matrix);
    }

    let lists: Option<Vec<HashSet<PageId>>> =
        co_retrieved.map(|lists| lists.iter().map(|l| l.iter().copied().collect()).collect());

    for link in store.page_links(pages)? {
        let (Some(&i), Some(&j)) = (index.get(&link.target), index.get(&link.source)) else { continue };
        if let Some(lists) = &lists {
            if lists.iter().any(|l| l.contains(&link.source) && l.contains(&link.target)) {
                continue;
            }
        }
        let cell = match weighting {
            LinkWeighting::Single => 1.0,
            LinkWeighting::Count => link.count as f64,
            LinkWeighting::Log if link.count > 0 => 1.0 + (link.count as f64).ln(),
            LinkWeighting::Log => 0.0,
        };
        matrix[[i, j]] = cell;
    }
    Ok(matrix)
}

/// Re-score similarity-ranked `results` with the link matrix among them and
/// re-sort. `links` must be square and follow the order of `results`.
pub fn second_order_ranking(results: &mut [SearchResult], links: &Array2<f64>, alpha: f64) -> Result<()> {
    let n = results.len();
    if links.dim() != (n, n) {
        return Err(Error::InvalidInput(format!(
            "link matrix is {:?}, expected ({n}, {n})",
            links.dim()
        )));
    }

    let incoming = links.sum_axis(Axis(1));
    let outgoing = links.sum_axis(Axis(0));
    let weights: Array1<f64> = results.iter().map(|r| r.weight).collect();

    let authority: Array1<f64> = incoming
        .iter()
        .zip(outgoing.iter())
        .map(|(&inc, &out)| if inc > 0.0 { (out / inc).clamp(MIN_AUTHORITY, MAX_AUTHORITY) } else { 0.0 })
        .collect();
    let norm_weights: Array1<f64> = weights
        .iter()
        .zip(authority.iter())
        .map(|(&w, &a)| if a > 0.0 { w / a } else { 0.0 })
        .collect();

    let propagated = links.dot(&norm_weights) * alpha;
    for (i, result) in results.iter_mut().enumerate() {
        let w = weights[i];
        result.weight = propagated[i] * w * w + SIMILARITY_BLEND * w;
        result.incoming = Some(incoming[i]);
        result.outgoing = Some(outgoing[i]);
    }
    results.sort_by(by_weight_desc);
    Ok(())
}
