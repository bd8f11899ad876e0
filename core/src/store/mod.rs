//! Query contract over the concept corpus, plus two backends.
//!
//! Every lookup is batched. Keys that do not exist are simply absent from
//! the result, and an empty key set yields an empty result.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

pub mod corpus;
pub mod sled_store;

pub use corpus::{wiki_links, ConceptCorpusBuilder, MemoryConceptStore, PageSource};
pub use sled_store::SledConceptStore;

pub type TermId = u32;
pub type PageId = u32;

/// A page of the concept corpus as stored by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptPage {
    pub name: String,
    /// Number of terms in the page.
    pub length: u32,
    /// Unprocessed pages exist only as link targets.
    pub processed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageData {
    pub page_id: PageId,
    pub name: String,
    pub length: u32,
}

/// Directed link with multiplicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLink {
    pub source: PageId,
    pub target: PageId,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermOccurrence {
    pub page_id: PageId,
    pub term_id: TermId,
    pub count: u32,
}

/// Read-only, batched access to a concept corpus.
pub trait ConceptStore {
    /// (name, id) for every name that is a known term.
    fn term_ids(&self, names: &[String]) -> Result<Vec<(String, TermId)>>;

    /// (id, name) for every known term id.
    fn term_names(&self, ids: &[TermId]) -> Result<Vec<(TermId, String)>>;

    /// Number of concept pages containing each term.
    fn document_frequencies(&self, ids: &[TermId]) -> Result<Vec<(TermId, u32)>>;

    /// Number of processed concept pages.
    fn corpus_size(&self) -> Result<u32>;

    /// Up to `limit` pages containing `term` more than `min_counter` times,
    /// highest count first.
    fn pages_for_term(&self, term: TermId, min_counter: u32, limit: usize) -> Result<Vec<PageId>>;

    /// Every (page, term, count) triple with the page in `pages` and the term in `terms`.
    fn term_occurrences(&self, pages: &[PageId], terms: &[TermId]) -> Result<Vec<TermOccurrence>>;

    fn page_data(&self, pages: &[PageId]) -> Result<Vec<PageData>>;

    /// Links whose source and target are both in `pages`.
    fn page_links(&self, pages: &[PageId]) -> Result<Vec<PageLink>>;

    /// (name, id) for every known page name.
    fn page_ids(&self, names: &[String]) -> Result<Vec<(String, PageId)>>;

    /// Precomputed tfidf mass per page, when the backend keeps it.
    fn tfidf_totals(&self, _pages: &[PageId]) -> Result<Option<HashMap<PageId, f64>>> {
        Ok(None)
    }
}
