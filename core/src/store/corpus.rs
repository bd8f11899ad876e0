use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{ConceptPage, ConceptStore, PageData, PageId, PageLink, TermId, TermOccurrence};
use crate::config::CorpusConfig;
use crate::error::Result;
use crate::tokenizer::Tokenizer;

lazy_static! {
    // [[Target]], [[Target|label]], [[Target#section|label]]
    static ref LINK_RE: Regex = Regex::new(r"\[\[([^\]\^|#]+)#?[^\]\^|]*\|?[^\]]*\]\]").expect("valid regex");
}

/// Link targets of wiki markup, in order of appearance.
pub fn wiki_links(markup: &str) -> Vec<String> {
    LINK_RE
        .captures_iter(markup)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// One page of the concept corpus dump (a JSONL line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSource {
    pub name: String,
    pub text: String,
    /// Outgoing link targets by page name. Extracted from wiki markup in `text` when absent.
    #[serde(default)]
    pub links: Option<Vec<String>>,
}

/// Accumulates concept pages and produces a queryable corpus.
pub struct ConceptCorpusBuilder {
    config: CorpusConfig,
    tokenizer: Tokenizer,
    pages: Vec<ConceptPage>,
    page_ids: HashMap<String, PageId>,
    term_ids: HashMap<String, TermId>,
    term_names: Vec<String>,
    page_terms: BTreeMap<PageId, HashMap<TermId, u32>>,
    links: BTreeMap<(PageId, PageId), u32>,
    skipped: usize,
}

impl ConceptCorpusBuilder {
    pub fn new(config: CorpusConfig, tokenizer: Tokenizer) -> Self {
        Self {
            config,
            tokenizer,
            pages: Vec::new(),
            page_ids: HashMap::new(),
            term_ids: HashMap::new(),
            term_names: Vec::new(),
            page_terms: BTreeMap::new(),
            links: BTreeMap::new(),
            skipped: 0,
        }
    }

    fn ignored(&self, name: &str) -> bool {
        self.config.ignore_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    fn intern_page(&mut self, name: &str) -> PageId {
        if let Some(&id) = self.page_ids.get(name) {
            return id;
        }
        let id = self.pages.len() as PageId;
        self.pages.push(ConceptPage { name: name.to_string(), length: 0, processed: false });
        self.page_ids.insert(name.to_string(), id);
        id
    }

    fn intern_term(&mut self, term: String) -> TermId {
        if let Some(&id) = self.term_ids.get(&term) {
            return id;
        }
        let id = self.term_names.len() as TermId;
        self.term_names.push(term.clone());
        self.term_ids.insert(term, id);
        id
    }

    pub fn add_source(&mut self, source: &PageSource) -> Option<PageId> {
        match &source.links {
            Some(links) => self.add_page(&source.name, &source.text, links),
            None => {
                let links = wiki_links(&source.text);
                self.add_page(&source.name, &source.text, &links)
            }
        }
    }

    /// Index one page. Returns `None` when the page was skipped.
    pub fn add_page(&mut self, name: &str, text: &str, links: &[String]) -> Option<PageId> {
        let name = name.trim();
        if name.is_empty() || self.ignored(name) {
            self.skipped += 1;
            return None;
        }

        let counts = self.tokenizer.term_counts(text);
        let length: u32 = counts.values().sum();
        if length < self.config.min_page_length {
            tracing::debug!(page = name, length, "page too short, skipped");
            self.skipped += 1;
            return None;
        }

        if let Some(&existing) = self.page_ids.get(name) {
            if self.pages[existing as usize].processed {
                tracing::debug!(page = name, "duplicate page, skipped");
                self.skipped += 1;
                return None;
            }
        }

        let page_id = self.intern_page(name);
        let page = &mut self.pages[page_id as usize];
        page.length = length;
        page.processed = true;

        let mut terms = HashMap::with_capacity(counts.len());
        for (term, count) in counts {
            terms.insert(self.intern_term(term), count);
        }
        self.page_terms.insert(page_id, terms);

        for target in links {
            let target = target.trim();
            if target.is_empty() || target == name || self.ignored(target) {
                continue;
            }
            let target_id = self.intern_page(target);
            *self.links.entry((page_id, target_id)).or_insert(0) += 1;
        }
        Some(page_id)
    }

    pub fn build(self) -> MemoryConceptStore {
        let ConceptCorpusBuilder { config, tokenizer, pages, page_ids, term_names, mut page_terms, links, skipped, .. } = self;

        let mut totals: HashMap<TermId, u64> = HashMap::new();
        for terms in page_terms.values() {
            for (&term, &count) in terms {
                *totals.entry(term).or_insert(0) += count as u64;
            }
        }
        let min_total = config.min_term_total as u64;
        for terms in page_terms.values_mut() {
            terms.retain(|term, _| totals.get(term).copied().unwrap_or(0) >= min_total);
        }

        let mut postings: HashMap<TermId, Vec<(PageId, u32)>> = HashMap::new();
        for (&page, terms) in &page_terms {
            for (&term, &count) in terms {
                postings.entry(term).or_default().push((page, count));
            }
        }
        for list in postings.values_mut() {
            list.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        }

        let document_frequencies: HashMap<TermId, u32> =
            postings.iter().map(|(&t, list)| (t, list.len() as u32)).collect();
        let corpus_size = pages.iter().filter(|p| p.processed).count() as u32;

        let mut tfidf_totals = HashMap::new();
        for (&page, terms) in &page_terms {
            let length = pages[page as usize].length;
            if length <= 1 {
                continue;
            }
            let log_length = (length as f64).ln();
            let total: f64 = terms
                .iter()
                .map(|(term, &count)| {
                    let df = document_frequencies.get(term).copied().unwrap_or(0);
                    if df == 0 { return 0.0; }
                    (1.0 + (count as f64).ln()) / log_length * (corpus_size as f64 / df as f64).ln()
                })
                .sum();
            tfidf_totals.insert(page, total);
        }

        let terms: HashMap<String, TermId> = postings
            .keys()
            .map(|&id| (term_names[id as usize].clone(), id))
            .collect();
        let term_names: HashMap<TermId, String> = terms.iter().map(|(n, &id)| (id, n.clone())).collect();

        let mut outgoing: HashMap<PageId, Vec<(PageId, u32)>> = HashMap::new();
        for ((source, target), count) in links {
            outgoing.entry(source).or_default().push((target, count));
        }

        let store = MemoryConceptStore {
            terms,
            term_names,
            document_frequencies,
            postings,
            page_terms,
            pages: pages.into_iter().enumerate().map(|(i, p)| (i as PageId, p)).collect(),
            page_names: page_ids,
            links: outgoing,
            tfidf_totals,
            corpus_size,
            tokenizer,
        };
        tracing::info!(
            pages = store.pages.len(),
            processed = corpus_size,
            terms = store.terms.len(),
            skipped,
            "built concept corpus"
        );
        store
    }
}

/// Concept corpus held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryConceptStore {
    pub(crate) terms: HashMap<String, TermId>,
    pub(crate) term_names: HashMap<TermId, String>,
    pub(crate) document_frequencies: HashMap<TermId, u32>,
    /// Per term, pages with counts, highest count first.
    pub(crate) postings: HashMap<TermId, Vec<(PageId, u32)>>,
    pub(crate) page_terms: BTreeMap<PageId, HashMap<TermId, u32>>,
    pub(crate) pages: BTreeMap<PageId, ConceptPage>,
    pub(crate) page_names: HashMap<String, PageId>,
    /// Outgoing links with multiplicity.
    pub(crate) links: HashMap<PageId, Vec<(PageId, u32)>>,
    pub(crate) tfidf_totals: HashMap<PageId, f64>,
    pub(crate) corpus_size: u32,
    pub(crate) tokenizer: Tokenizer,
}

impl MemoryConceptStore {
    /// Tokenizer the corpus was built with; queries must use the same one.
    pub fn tokenizer(&self) -> Tokenizer { self.tokenizer }

    pub fn page(&self, id: PageId) -> Option<&ConceptPage> { self.pages.get(&id) }

    pub fn page_count(&self) -> usize { self.pages.len() }

    pub fn term_count(&self) -> usize { self.terms.len() }
}

fn unique<T: Copy + Eq + std::hash::Hash>(keys: &[T]) -> Vec<T> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().copied().filter(|k| seen.insert(*k)).collect()
}

impl ConceptStore for MemoryConceptStore {
    fn term_ids(&self, names: &[String]) -> Result<Vec<(String, TermId)>> {
        Ok(names.iter().filter_map(|n| self.terms.get(n).map(|&id| (n.clone(), id))).collect())
    }

    fn term_names(&self, ids: &[TermId]) -> Result<Vec<(TermId, String)>> {
        Ok(ids.iter().filter_map(|id| self.term_names.get(id).map(|n| (*id, n.clone()))).collect())
    }

    fn document_frequencies(&self, ids: &[TermId]) -> Result<Vec<(TermId, u32)>> {
        Ok(ids.iter().filter_map(|id| self.document_frequencies.get(id).map(|&df| (*id, df))).collect())
    }

    fn corpus_size(&self) -> Result<u32> { Ok(self.corpus_size) }

    fn pages_for_term(&self, term: TermId, min_counter: u32, limit: usize) -> Result<Vec<PageId>> {
        let Some(list) = self.postings.get(&term) else { return Ok(Vec::new()) };
        Ok(list.iter().filter(|(_, c)| *c > min_counter).take(limit).map(|(p, _)| *p).collect())
    }

    fn term_occurrences(&self, pages: &[PageId], terms: &[TermId]) -> Result<Vec<TermOccurrence>> {
        let terms = unique(terms);
        let mut out = Vec::new();
        for page_id in unique(pages) {
            let Some(counts) = self.page_terms.get(&page_id) else { continue };
            for &term_id in &terms {
                if let Some(&count) = counts.get(&term_id) {
                    out.push(TermOccurrence { page_id, term_id, count });
                }
            }
        }
        Ok(out)
    }

    fn page_data(&self, pages: &[PageId]) -> Result<Vec<PageData>> {
        Ok(unique(pages)
            .into_iter()
            .filter_map(|id| {
                self.pages.get(&id).map(|p| PageData { page_id: id, name: p.name.clone(), length: p.length })
            })
            .collect())
    }

    fn page_links(&self, pages: &[PageId]) -> Result<Vec<PageLink>> {
        let wanted: HashSet<PageId> = pages.iter().copied().collect();
        let mut out = Vec::new();
        for &source in &wanted {
            for &(target, count) in self.links.get(&source).into_iter().flatten() {
                if wanted.contains(&target) {
                    out.push(PageLink { source, target, count });
                }
            }
        }
        Ok(out)
    }

    fn page_ids(&self, names: &[String]) -> Result<Vec<(String, PageId)>> {
        Ok(names.iter().filter_map(|n| self.page_names.get(n).map(|&id| (n.clone(), id))).collect())
    }

    fn tfidf_totals(&self, pages: &[PageId]) -> Result<Option<HashMap<PageId, f64>>> {
        Ok(Some(pages.iter().filter_map(|id| self.tfidf_totals.get(id).map(|&t| (*id, t))).collect()))
    }
}
