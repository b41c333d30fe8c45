use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    error::Result,
    record_store::RecordStore,
    repository::FileRepository,
    search::SearchIndex,
};

/// Push `filenames` into the search engine, each with the visibility stored
/// for it. Files without a record are pushed as private; files that cannot
/// be read are skipped. Returns how many the engine accepted.
///
/// Does nothing when the engine is disabled.
pub fn index_files(
    index: &SearchIndex,
    store: &RecordStore,
    files: &FileRepository,
    filenames: &[String],
) -> Result<usize> {
    if !index.is_enabled() || filenames.is_empty() {
        return Ok(0);
    }
    let visibility: HashMap<String, bool> = store
        .list()?
        .into_iter()
        .map(|r| (r.filename, r.is_public))
        .collect();

    // Read in parallel, push sequentially: engines commit per document.
    let loaded: Vec<(&String, String)> = filenames
        .par_iter()
        .filter_map(|name| match files.read(name) {
            Ok(content) => Some((name, content)),
            Err(e) => {
                debug!(filename = %name, "not indexing: {e}");
                None
            }
        })
        .collect();

    let pushed = loaded
        .iter()
        .filter(|(name, content)| {
            let is_public =
                visibility.get(name.as_str()).copied().unwrap_or(false);
            index.index_document(name, content, is_public)
        })
        .count();

    info!(
        requested = filenames.len(),
        pushed,
        "pushed documents to search engine"
    );
    Ok(pushed)
}

/// Push every repository file. Returns how many the engine accepted.
pub fn reindex_all(
    index: &SearchIndex,
    store: &RecordStore,
    files: &FileRepository,
) -> Result<usize> {
    if !index.is_enabled() {
        return Ok(0);
    }
    index_files(index, store, files, &files.list()?)
}
