use crate::error::Result;
use crate::tokenizer::{AnalyzerConfig, TokenStream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type TermId = u32;
pub type DocId = u32;

/// Stored fields of one document. Content is not stored; it is re-read from `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub freq: u32,
    pub positions: Vec<u32>, // ascending
}

/// Read side of an index store.
pub trait IndexReader {
    fn analyzer(&self) -> AnalyzerConfig;
    fn num_docs(&self) -> u32;
    /// Postings for `term`, sorted by doc id. Unknown terms yield an empty list.
    fn postings(&self, term: &str) -> Result<Arc<Vec<Posting>>>;
    fn doc_freq(&self, term: &str) -> u32;
    fn doc(&self, doc_id: DocId) -> Option<&DocMeta>;
}

/// Terms of one analyzed document, with the positions each term occurs at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocTerms(pub BTreeMap<String, Vec<u32>>);

impl DocTerms {
    pub fn from_stream(stream: &TokenStream) -> Self {
        let mut terms: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for tok in stream.iter() {
            terms.entry(tok.term.into_owned()).or_default().push(tok.position);
        }
        Self(terms)
    }
}

/// In-memory index. Built by [`IndexBuilder`], persisted by `persist::write_index`.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    pub analyzer: AnalyzerConfig,
    pub postings: BTreeMap<String, Arc<Vec<Posting>>>,
    pub docs: Vec<DocMeta>, // indexed by doc id
}

impl IndexReader for InvertedIndex {
    fn analyzer(&self) -> AnalyzerConfig { self.analyzer }

    fn num_docs(&self) -> u32 { self.docs.len() as u32 }

    fn postings(&self, term: &str) -> Result<Arc<Vec<Posting>>> {
        Ok(self.postings.get(term).cloned().unwrap_or_default())
    }

    fn doc_freq(&self, term: &str) -> u32 {
        self.postings.get(term).map(|p| p.len() as u32).unwrap_or(0)
    }

    fn doc(&self, doc_id: DocId) -> Option<&DocMeta> { self.docs.get(doc_id as usize) }
}

/// Accumulates postings. Doc ids are handed out sequentially from 0 in call order.
pub struct IndexBuilder {
    analyzer: AnalyzerConfig,
    postings: BTreeMap<String, Vec<Posting>>,
    docs: Vec<DocMeta>,
}

impl IndexBuilder {
    pub fn new(analyzer: AnalyzerConfig) -> Self {
        Self { analyzer, postings: BTreeMap::new(), docs: Vec::new() }
    }

    pub fn next_doc_id(&self) -> DocId { self.docs.len() as DocId }

    pub fn add_document(&mut self, path: impl Into<String>, terms: DocTerms) -> DocId {
        let doc_id = self.next_doc_id();
        self.docs.push(DocMeta { path: path.into() });
        for (term, positions) in terms.0 {
            let freq = positions.len() as u32;
            self.postings.entry(term).or_default().push(Posting { doc_id, freq, positions });
        }
        doc_id
    }

    /// Seal the build. Postings are already doc-id ordered since ids only grow.
    pub fn finish(self) -> InvertedIndex {
        let postings = self.postings.into_iter().map(|(t, p)| (t, Arc::new(p))).collect();
        InvertedIndex { analyzer: self.analyzer, postings, docs: self.docs }
    }
}
