use std::{
    collections::{BTreeMap, HashSet},
    fmt::Display,
    fs::{File, OpenOptions, TryLockError},
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{
    data_dir::DataDir,
    error::{Error, Result},
    record::{self, COLUMNS, DocumentRecord, MetadataUpdate},
    repository::FileRepository,
};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The durable filename-keyed table of document records.
///
/// Every operation runs as one full cycle under an exclusive lock on the
/// sibling lock file: acquire, read the whole table, apply, atomically
/// replace the table file, release. The lock is advisory and valid across
/// processes; nothing else in the crate serializes access to the table.
pub struct RecordStore {
    table: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    default_public: bool,
}

/// Held for the duration of one read-modify-write cycle.
struct TableLock {
    file: File,
}

impl Drop for TableLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl RecordStore {
    pub fn new(table: PathBuf, lock_path: PathBuf) -> Self {
        Self {
            table,
            lock_path,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            default_public: true,
        }
    }

    pub fn open(data_dir: &DataDir) -> Self {
        Self::new(data_dir.index_table(), data_dir.index_lock())
    }

    /// Bound how long an operation waits for the table lock before failing
    /// with [`Error::StoreUnavailable`].
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Visibility assumed for rows whose `is_public` cell is blank or
    /// unparsable.
    pub fn with_visibility_default(mut self, is_public: bool) -> Self {
        self.default_public = is_public;
        self
    }

    pub fn path(&self) -> &Path {
        &self.table
    }

    // -- Reads --

    pub fn list(&self) -> Result<Vec<DocumentRecord>> {
        let _lock = self.lock()?;
        self.read()
    }

    pub fn get(&self, filename: &str) -> Result<Option<DocumentRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|record| record.filename == filename))
    }

    // -- Mutations --

    /// Write a header-only table if none exists yet. The existence check runs
    /// under the lock, so a table created concurrently is never replaced.
    /// Returns whether the table was created.
    pub fn ensure_table(&self) -> Result<bool> {
        let _lock = self.lock()?;
        if self.table.exists() {
            return Ok(false);
        }
        write_table(&self.table, &[])?;
        debug!(table = %self.table.display(), "created empty index table");
        Ok(true)
    }

    /// Insert `record`, or replace the record with the same filename in
    /// place.
    pub fn upsert(&self, record: DocumentRecord) -> Result<()> {
        self.modify(|records| {
            match records.iter_mut().find(|r| r.filename == record.filename) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
            ((), true)
        })
    }

    /// Remove the record for `filename`. Returns whether one was present.
    pub fn delete(&self, filename: &str) -> Result<bool> {
        self.modify(|records| {
            let before = records.len();
            records.retain(|r| r.filename != filename);
            let removed = records.len() != before;
            (removed, removed)
        })
    }

    /// Set the visibility flag of `filename`. Returns whether a record was
    /// present.
    pub fn toggle_visibility(
        &self,
        filename: &str,
        is_public: bool,
    ) -> Result<bool> {
        self.modify(|records| {
            match records.iter_mut().find(|r| r.filename == filename) {
                Some(record) => {
                    record.is_public = is_public;
                    record.touch();
                    (true, true)
                }
                None => (false, false),
            }
        })
    }

    /// Create an empty record for every repository file that has none.
    /// Returns the created filenames in repository order.
    pub fn sync_new_files(
        &self,
        files: &FileRepository,
        default_public: bool,
    ) -> Result<Vec<String>> {
        let on_disk = files.list()?;
        self.modify(|records| {
            let known: HashSet<&str> =
                records.iter().map(|r| r.filename.as_str()).collect();
            let new_files: Vec<String> = on_disk
                .into_iter()
                .filter(|name| !known.contains(name.as_str()))
                .collect();
            for name in &new_files {
                records.push(DocumentRecord::new(
                    name,
                    "",
                    "",
                    default_public,
                    None,
                ));
            }
            let changed = !new_files.is_empty();
            (new_files, changed)
        })
    }

    /// Apply `updates` to the matching records. Filenames without a record
    /// are ignored. Returns the number of records touched.
    pub fn apply_metadata_updates(
        &self,
        updates: &BTreeMap<String, MetadataUpdate>,
    ) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        self.modify(|records| {
            let mut touched = 0;
            for record in records.iter_mut() {
                if let Some(update) = updates.get(&record.filename) {
                    update.apply_to(record);
                    touched += 1;
                }
            }
            (touched, touched > 0)
        })
    }

    // -- Internals --

    /// Run one locked read-modify-write cycle. The closure returns its result
    /// and whether the table changed; unchanged tables are not rewritten.
    fn modify<T>(
        &self,
        f: impl FnOnce(&mut Vec<DocumentRecord>) -> (T, bool),
    ) -> Result<T> {
        let _lock = self.lock()?;
        let mut records = self.read()?;
        let (result, changed) = f(&mut records);
        if changed {
            write_table(&self.table, &records)?;
            debug!(records = records.len(), "index table replaced");
        }
        Ok(result)
    }

    fn read(&self) -> Result<Vec<DocumentRecord>> {
        read_table(&self.table, self.default_public)
    }

    fn lock(&self) -> Result<TableLock> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| unavailable("create", parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| unavailable("open lock", &self.lock_path, e))?;

        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match file.try_lock() {
                Ok(()) => return Ok(TableLock { file }),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(Error::StoreUnavailable(format!(
                            "timed out after {:?} waiting for {}",
                            self.lock_timeout,
                            self.lock_path.display()
                        )));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(TryLockError::Error(e)) => {
                    return Err(unavailable("lock", &self.lock_path, e));
                }
            }
        }
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

fn unavailable(action: &str, path: &Path, err: impl Display) -> Error {
    Error::StoreUnavailable(format!(
        "cannot {action} {}: {err}",
        path.display()
    ))
}

/// Read every record of the table at `path`. A missing file is an empty
/// table. Columns are matched by header name; rows with a blank filename
/// are skipped.
pub(crate) fn read_table(
    path: &Path,
    default_public: bool,
) -> Result<Vec<DocumentRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| unavailable("read", path, e))?;
    let headers = reader
        .headers()
        .map_err(|e| unavailable("read", path, e))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let [filename, title, description, is_public, date_uploaded, updated_at] =
        COLUMNS.map(column);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| unavailable("read", path, e))?;
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i)).map(str::trim).unwrap_or("")
        };

        let name = cell(filename);
        if name.is_empty() {
            continue;
        }
        let uploaded = cell(date_uploaded);
        records.push(DocumentRecord {
            filename: name.to_string(),
            title: cell(title).to_string(),
            description: cell(description).to_string(),
            is_public: record::parse_bool(
                is_public.and_then(|i| row.get(i)),
                default_public,
            ),
            date_uploaded: if uploaded.is_empty() {
                record::today()
            } else {
                uploaded.to_string()
            },
            updated_at: cell(updated_at).to_string(),
        });
    }
    Ok(records)
}

/// Atomically replace the table at `path` with `records`. The rows are
/// written to a temporary file in the same directory which is then renamed
/// over the target; on failure the temporary file is removed and the
/// previous table is left as it was.
fn write_table(path: &Path, records: &[DocumentRecord]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| unavailable("create", dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| unavailable("create temporary table in", dir, e))?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        writer
            .write_record(COLUMNS)
            .map_err(|e| unavailable("write", path, e))?;
        for record in records {
            writer
                .write_record(record.to_row())
                .map_err(|e| unavailable("write", path, e))?;
        }
        writer.flush().map_err(|e| unavailable("write", path, e))?;
    }
    tmp.as_file_mut()
        .flush()
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| unavailable("sync", path, e))?;
    tmp.persist(path)
        .map_err(|e| unavailable("replace", path, e.error))?;
    Ok(())
}
