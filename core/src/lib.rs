//! Inverted-index document search: analysis, index storage, query parsing and ranked retrieval.

pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod search;
pub mod tokenizer;

pub use error::{QuarryError, Result};
pub use index::{DocId, DocMeta, DocTerms, IndexBuilder, IndexReader, InvertedIndex, Posting, TermId};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Field name documents are indexed under.
pub const CONTENTS_FIELD: &str = "contents";

/// Shared cooperative cancellation switch for index builds and search sessions.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() { Err(QuarryError::Cancelled) } else { Ok(()) }
    }
}
