//! Concept store persisted in a sled database.
//!
//! One tree per logical table. Ids are stored big-endian so composite keys
//! `term ++ page` and `page ++ term` sort and prefix-scan by their first id.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::{ConceptPage, ConceptStore, MemoryConceptStore, PageData, PageId, PageLink, TermId, TermOccurrence};
use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;

const TERMS: &str = "terms";
const TERM_NAMES: &str = "term_names";
const DOCUMENT_FREQUENCIES: &str = "document_frequencies";
const POSTINGS: &str = "postings";
const PAGE_TERMS: &str = "page_terms";
const PAGES: &str = "pages";
const PAGE_NAMES: &str = "page_names";
const LINKS: &str = "links";
const TFIDF_TOTALS: &str = "tfidf_totals";
const META: &str = "meta";

const CORPUS_SIZE_KEY: &[u8] = b"corpus_size";
const TOKENIZER_KEY: &[u8] = b"tokenizer";

#[derive(Clone)]
pub struct SledConceptStore {
    db: sled::Db,
    terms: sled::Tree,
    term_names: sled::Tree,
    document_frequencies: sled::Tree,
    postings: sled::Tree,
    page_terms: sled::Tree,
    pages: sled::Tree,
    page_names: sled::Tree,
    links: sled::Tree,
    tfidf_totals: sled::Tree,
    meta: sled::Tree,
}

fn pair_key(a: u32, b: u32) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[..4].copy_from_slice(&a.to_be_bytes());
    key[4..].copy_from_slice(&b.to_be_bytes());
    key
}

fn decode_u32(bytes: &[u8]) -> Result<u32> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::Store(format!("expected 4 bytes, found {}", bytes.len())))?;
    Ok(u32::from_be_bytes(arr))
}

fn decode_pair(bytes: &[u8]) -> Result<(u32, u32)> {
    if bytes.len() != 8 {
        return Err(Error::Store(format!("expected 8 byte key, found {}", bytes.len())));
    }
    Ok((decode_u32(&bytes[..4])?, decode_u32(&bytes[4..])?))
}

fn decode_f64(bytes: &[u8]) -> Result<f64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Store(format!("expected 8 bytes, found {}", bytes.len())))?;
    Ok(f64::from_be_bytes(arr))
}

fn decode_str(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::Store(e.to_string()))
}

impl SledConceptStore {
    /// Open an existing store, or an empty one if nothing is at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            terms: db.open_tree(TERMS)?,
            term_names: db.open_tree(TERM_NAMES)?,
            document_frequencies: db.open_tree(DOCUMENT_FREQUENCIES)?,
            postings: db.open_tree(POSTINGS)?,
            page_terms: db.open_tree(PAGE_TERMS)?,
            pages: db.open_tree(PAGES)?,
            page_names: db.open_tree(PAGE_NAMES)?,
            links: db.open_tree(LINKS)?,
            tfidf_totals: db.open_tree(TFIDF_TOTALS)?,
            meta: db.open_tree(META)?,
            db,
        })
    }

    /// Replace whatever is at `path` with the contents of `corpus`.
    pub fn import<P: AsRef<Path>>(path: P, corpus: &MemoryConceptStore) -> Result<Self> {
        let store = Self::open(path)?;
        for tree in store.trees() {
            tree.clear()?;
        }

        let mut batch = sled::Batch::default();
        for (name, id) in &corpus.terms {
            batch.insert(name.as_bytes(), &id.to_be_bytes()[..]);
        }
        store.terms.apply_batch(batch)?;

        let mut batch = sled::Batch::default();
        for (id, name) in &corpus.term_names {
            batch.insert(&id.to_be_bytes()[..], name.as_bytes());
        }
        store.term_names.apply_batch(batch)?;

        let mut batch = sled::Batch::default();
        for (id, df) in &corpus.document_frequencies {
            batch.insert(&id.to_be_bytes()[..], &df.to_be_bytes()[..]);
        }
        store.document_frequencies.apply_batch(batch)?;

        let mut postings = sled::Batch::default();
        let mut page_terms = sled::Batch::default();
        for (&page, terms) in &corpus.page_terms {
            for (&term, &count) in terms {
                postings.insert(&pair_key(term, page)[..], &count.to_be_bytes()[..]);
                page_terms.insert(&pair_key(page, term)[..], &count.to_be_bytes()[..]);
            }
        }
        store.postings.apply_batch(postings)?;
        store.page_terms.apply_batch(page_terms)?;

        let mut pages = sled::Batch::default();
        let mut names = sled::Batch::default();
        for (&id, page) in &corpus.pages {
            pages.insert(&id.to_be_bytes()[..], bincode::serialize(page)?);
            names.insert(page.name.as_bytes(), &id.to_be_bytes()[..]);
        }
        store.pages.apply_batch(pages)?;
        store.page_names.apply_batch(names)?;

        let mut batch = sled::Batch::default();
        for (&source, targets) in &corpus.links {
            for &(target, count) in targets {
                batch.insert(&pair_key(source, target)[..], &count.to_be_bytes()[..]);
            }
        }
        store.links.apply_batch(batch)?;

        let mut batch = sled::Batch::default();
        for (&page, total) in &corpus.tfidf_totals {
            batch.insert(&page.to_be_bytes()[..], &total.to_be_bytes()[..]);
        }
        store.tfidf_totals.apply_batch(batch)?;

        store.meta.insert(CORPUS_SIZE_KEY, &corpus.corpus_size.to_be_bytes()[..])?;
        store.meta.insert(TOKENIZER_KEY, bincode::serialize(&corpus.tokenizer)?)?;
        store.db.flush()?;

        tracing::info!(pages = corpus.page_count(), terms = corpus.term_count(), "imported concept corpus into sled");
        Ok(store)
    }

    fn trees(&self) -> [&sled::Tree; 10] {
        [
            &self.terms,
            &self.term_names,
            &self.document_frequencies,
            &self.postings,
            &self.page_terms,
            &self.pages,
            &self.page_names,
            &self.links,
            &self.tfidf_totals,
            &self.meta,
        ]
    }

    /// Tokenizer recorded at import time, or the default one.
    pub fn tokenizer(&self) -> Result<Tokenizer> {
        match self.meta.get(TOKENIZER_KEY)? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Tokenizer::default()),
        }
    }

    pub fn page(&self, id: PageId) -> Result<Option<ConceptPage>> {
        match self.pages.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl ConceptStore for SledConceptStore {
    fn term_ids(&self, names: &[String]) -> Result<Vec<(String, TermId)>> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(v) = self.terms.get(name.as_bytes())? {
                out.push((name.clone(), decode_u32(&v)?));
            }
        }
        Ok(out)
    }

    fn term_names(&self, ids: &[TermId]) -> Result<Vec<(TermId, String)>> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(v) = self.term_names.get(id.to_be_bytes())? {
                out.push((id, decode_str(&v)?));
            }
        }
        Ok(out)
    }

    fn document_frequencies(&self, ids: &[TermId]) -> Result<Vec<(TermId, u32)>> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(v) = self.document_frequencies.get(id.to_be_bytes())? {
                out.push((id, decode_u32(&v)?));
            }
        }
        Ok(out)
    }

    fn corpus_size(&self) -> Result<u32> {
        match self.meta.get(CORPUS_SIZE_KEY)? {
            Some(v) => decode_u32(&v),
            None => Ok(0),
        }
    }

    fn pages_for_term(&self, term: TermId, min_counter: u32, limit: usize) -> Result<Vec<PageId>> {
        let mut hits = Vec::new();
        for item in self.postings.scan_prefix(term.to_be_bytes()) {
            let (k, v) = item?;
            let (_, page) = decode_pair(&k)?;
            let count = decode_u32(&v)?;
            if count > min_counter {
                hits.push((page, count));
            }
        }
        hits.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(limit);
        Ok(hits.into_iter().map(|(p, _)| p).collect())
    }

    fn term_occurrences(&self, pages: &[PageId], terms: &[TermId]) -> Result<Vec<TermOccurrence>> {
        let mut seen_pages = HashSet::new();
        let mut seen_terms = HashSet::new();
        let terms: Vec<TermId> = terms.iter().copied().filter(|t| seen_terms.insert(*t)).collect();
        let mut out = Vec::new();
        for &page_id in pages {
            if !seen_pages.insert(page_id) {
                continue;
            }
            for &term_id in &terms {
                if let Some(v) = self.page_terms.get(pair_key(page_id, term_id))? {
                    out.push(TermOccurrence { page_id, term_id, count: decode_u32(&v)? });
                }
            }
        }
        Ok(out)
    }

    fn page_data(&self, pages: &[PageId]) -> Result<Vec<PageData>> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(pages.len());
        for &page_id in pages {
            if !seen.insert(page_id) {
                continue;
            }
            if let Some(page) = self.page(page_id)? {
                out.push(PageData { page_id, name: page.name, length: page.length });
            }
        }
        Ok(out)
    }

    fn page_links(&self, pages: &[PageId]) -> Result<Vec<PageLink>> {
        let wanted: HashSet<PageId> = pages.iter().copied().collect();
        let mut out = Vec::new();
        for &source in &wanted {
            for item in self.links.scan_prefix(source.to_be_bytes()) {
                let (k, v) = item?;
                let (_, target) = decode_pair(&k)?;
                if wanted.contains(&target) {
                    out.push(PageLink { source, target, count: decode_u32(&v)? });
                }
            }
        }
        Ok(out)
    }

    fn page_ids(&self, names: &[String]) -> Result<Vec<(String, PageId)>> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(v) = self.page_names.get(name.as_bytes())? {
                out.push((name.clone(), decode_u32(&v)?));
            }
        }
        Ok(out)
    }

    fn tfidf_totals(&self, pages: &[PageId]) -> Result<Option<HashMap<PageId, f64>>> {
        let mut out = HashMap::with_capacity(pages.len());
        for &page in pages {
            if let Some(v) = self.tfidf_totals.get(page.to_be_bytes())? {
                out.insert(page, decode_f64(&v)?);
            }
        }
        Ok(Some(out))
    }
}
