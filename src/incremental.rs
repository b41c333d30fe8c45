use std::collections::HashSet;

use crate::{
    error::Result,
    record_store::RecordStore,
    repository::FileRepository,
};

/// Sync work between the repository and the record store.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncDiff {
    /// Files on disk with no record, in repository order.
    pub unsynced: Vec<String>,
    /// Records whose file is gone, in store order.
    pub orphaned: Vec<String>,
}

impl SyncDiff {
    pub fn is_clean(&self) -> bool {
        self.unsynced.is_empty() && self.orphaned.is_empty()
    }
}

/// Compare the repository listing against the stored records.
///
/// Both sides are read separately, so the result is a snapshot that a
/// concurrent upload or delete can make stale.
pub fn diff(store: &RecordStore, files: &FileRepository) -> Result<SyncDiff> {
    let on_disk = files.list()?;
    let records = store.list()?;

    let known: HashSet<&str> =
        records.iter().map(|r| r.filename.as_str()).collect();
    let present: HashSet<&str> = on_disk.iter().map(String::as_str).collect();

    Ok(SyncDiff {
        unsynced: on_disk
            .iter()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect(),
        orphaned: records
            .iter()
            .filter(|r| !present.contains(r.filename.as_str()))
            .map(|r| r.filename.clone())
            .collect(),
    })
}
