use rayon::prelude::*;
use tracing::debug;

use crate::{
    error::Result,
    query,
    record_store::RecordStore,
    repository::FileRepository,
    search::SearchHit,
    text_util::{self, DEFAULT_WINDOW_PADDING},
};

/// Most hits returned by one fallback search.
pub const DEFAULT_MAX_HITS: usize = 100;

/// Substring search straight over stored document content.
///
/// The term is the query's quoted phrase if it has one, otherwise the whole
/// trimmed query; tokens are not split. Every occurrence becomes one hit
/// whose snippet is a padded window around it. Documents are visited in
/// record-store order.
#[derive(Debug, Clone, Copy)]
pub struct FallbackScanner<'a> {
    store: &'a RecordStore,
    files: &'a FileRepository,
    padding: usize,
    max_hits: usize,
}

impl<'a> FallbackScanner<'a> {
    pub fn new(store: &'a RecordStore, files: &'a FileRepository) -> Self {
        Self {
            store,
            files,
            padding: DEFAULT_WINDOW_PADDING,
            max_hits: DEFAULT_MAX_HITS,
        }
    }

    pub fn with_max_hits(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits;
        self
    }

    pub fn search(
        &self,
        query: &str,
        public_only: bool,
    ) -> Result<Vec<SearchHit>> {
        let term = query::scan_term(query);
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let needle = text_util::fold_chars(&term);

        let records: Vec<_> = self
            .store
            .list()?
            .into_iter()
            .filter(|r| !public_only || r.is_public)
            .collect();

        let per_document: Vec<Vec<SearchHit>> = records
            .par_iter()
            .map(|record| {
                let content = match self.files.read(&record.filename) {
                    Ok(content) => content,
                    Err(e) => {
                        debug!(
                            filename = %record.filename,
                            "skipping unreadable document: {e}"
                        );
                        return Vec::new();
                    }
                };
                scan_document(&record.filename, &content, &needle, self.padding)
            })
            .collect();

        Ok(per_document
            .into_iter()
            .flatten()
            .take(self.max_hits)
            .collect())
    }
}

/// Every occurrence of the folded `needle` in `content`, as windowed hits in
/// match order.
pub fn scan_document(
    filename: &str,
    content: &str,
    needle: &[char],
    padding: usize,
) -> Vec<SearchHit> {
    let chars: Vec<char> = content.chars().collect();
    let folded: Vec<char> =
        chars.iter().copied().map(text_util::fold).collect();
    text_util::find_matches(&folded, needle)
        .into_iter()
        .map(|at| {
            SearchHit::new(
                text_util::window(&chars, at, needle.len(), padding),
                filename,
            )
        })
        .collect()
}
