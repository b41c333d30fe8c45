use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    data_dir::DataDir,
    enrichment::{Enricher, EnrichmentReport},
    error::{Error, Result},
    incremental,
    ingestion,
    record::{DocumentRecord, MetadataUpdate},
    record_store::RecordStore,
    repository::FileRepository,
    scanner::FallbackScanner,
    search::{self, SearchIndex, SearchOutcome},
    summarizer::Summarizer,
};

/// The document library under one data directory: record store, file
/// repository, optional search engine and optional summarizer.
///
/// Every method is one request. Only the record store serializes access;
/// composed operations can interleave with other callers.
pub struct Library {
    data_dir: DataDir,
    store: RecordStore,
    files: FileRepository,
    index: SearchIndex,
    summarizer: Option<Box<dyn Summarizer>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub filename: String,
    /// Whether generated metadata was applied to the new record.
    pub enriched: bool,
    pub enrichment_errors: usize,
    pub indexed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub new_files: usize,
    pub enriched: usize,
    pub skipped: usize,
    pub errors: usize,
    pub orphaned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichSummary {
    pub candidates: usize,
    pub enriched: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub file_removed: bool,
    pub record_removed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenedDocument {
    pub record: DocumentRecord,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryStatus {
    pub data_dir: String,
    pub records: usize,
    pub public: usize,
    pub unsynced: Vec<String>,
    pub orphaned: Vec<String>,
    pub engine: Option<&'static str>,
    pub summarizer: bool,
}

impl Library {
    /// Open the library, creating the storage layout if needed.
    pub fn open(
        data_dir: DataDir,
        index: SearchIndex,
        summarizer: Option<Box<dyn Summarizer>>,
    ) -> Result<Self> {
        data_dir.ensure_layout()?;
        Ok(Self {
            store: RecordStore::open(&data_dir),
            files: FileRepository::new(data_dir.markdown_dir()),
            data_dir,
            index,
            summarizer,
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.store = self.store.with_lock_timeout(timeout);
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn files(&self) -> &FileRepository {
        &self.files
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    fn enricher(&self) -> Enricher<'_> {
        Enricher::new(
            &self.files,
            self.summarizer.as_deref(),
            &self.data_dir.summarize_prompt(),
        )
    }

    fn scanner(&self) -> FallbackScanner<'_> {
        FallbackScanner::new(&self.store, &self.files)
    }

    /// Save an uploaded file, record it, fill in missing metadata and push
    /// it to the search engine.
    pub fn upload(
        &self,
        original_name: &str,
        bytes: &[u8],
        title: &str,
        description: &str,
        is_public: bool,
    ) -> Result<UploadReport> {
        let filename = self.files.save(original_name, bytes)?;
        let record = DocumentRecord::new(
            &filename,
            title.trim(),
            description.trim(),
            is_public,
            None,
        );
        self.store.upsert(record.clone())?;

        let mut enriched = false;
        let mut enrichment_errors = 0;
        if record.is_missing_metadata() {
            let snapshot = BTreeMap::from([(filename.clone(), record)]);
            let report = self.enricher().enrich(&[filename.clone()], &snapshot);
            enrichment_errors = report.errors;
            enriched = self.store.apply_metadata_updates(&report.updates)? > 0;
        }

        let indexed = ingestion::index_files(
            &self.index,
            &self.store,
            &self.files,
            std::slice::from_ref(&filename),
        )? > 0;

        info!(%filename, enriched, indexed, "uploaded document");
        Ok(UploadReport {
            filename,
            enriched,
            enrichment_errors,
            indexed,
        })
    }

    /// Sync unrecorded files, enrich every record lacking metadata and push
    /// all files to the search engine.
    pub fn process(&self) -> Result<ProcessSummary> {
        let new_files = self.store.sync_new_files(&self.files, false)?;
        let records = self.store.list()?;

        let candidates: Vec<String> = new_files
            .iter()
            .cloned()
            .chain(
                records
                    .iter()
                    .filter(|r| r.is_missing_metadata())
                    .map(|r| r.filename.clone()),
            )
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let report = self.enricher().enrich(&candidates, &snapshot(&records));
        self.store.apply_metadata_updates(&report.updates)?;

        ingestion::reindex_all(&self.index, &self.store, &self.files)?;
        let orphaned =
            incremental::diff(&self.store, &self.files)?.orphaned.len();

        let summary = ProcessSummary {
            new_files: new_files.len(),
            enriched: report.updates.len(),
            skipped: records.len().saturating_sub(candidates.len()),
            errors: report.errors,
            orphaned,
        };
        info!(?summary, "processing finished");
        Ok(summary)
    }

    /// Enrich only the records that lack a title or description.
    pub fn enrich_missing(&self) -> Result<EnrichSummary> {
        let records = self.store.list()?;
        let candidates: Vec<String> = records
            .iter()
            .filter(|r| r.is_missing_metadata())
            .map(|r| r.filename.clone())
            .collect();

        let EnrichmentReport {
            updates, errors, ..
        } = self.enricher().enrich(&candidates, &snapshot(&records));
        self.store.apply_metadata_updates(&updates)?;

        Ok(EnrichSummary {
            candidates: candidates.len(),
            enriched: updates.len(),
            errors,
        })
    }

    /// Overwrite the provided non-empty fields of a record.
    pub fn set_metadata(
        &self,
        filename: &str,
        update: MetadataUpdate,
    ) -> Result<()> {
        if update.is_empty() {
            return match self.store.get(filename)? {
                Some(_) => Ok(()),
                None => Err(Error::not_found("document", filename)),
            };
        }
        let updates = BTreeMap::from([(filename.to_string(), update)]);
        match self.store.apply_metadata_updates(&updates)? {
            0 => Err(Error::not_found("document", filename)),
            _ => Ok(()),
        }
    }

    pub fn set_visibility(
        &self,
        filename: &str,
        is_public: bool,
    ) -> Result<()> {
        if !self.store.toggle_visibility(filename, is_public)? {
            return Err(Error::not_found("document", filename));
        }
        self.index.update_visibility(filename, is_public);
        Ok(())
    }

    /// Remove the file, its record and its engine entry. Each step succeeds
    /// when its target is already gone; engine failures are only logged. A
    /// name that cannot be a repository file still has its record removed.
    pub fn delete(&self, filename: &str) -> Result<DeleteReport> {
        let file_removed = match self.files.delete(filename) {
            Ok(removed) => removed,
            Err(Error::InvalidPath(_)) => {
                debug!(filename, "no repository file for this name");
                false
            }
            Err(e) => return Err(e),
        };
        let record_removed = self.store.delete(filename)?;
        self.index.delete_document(filename);
        if !file_removed && !record_removed {
            warn!(filename, "delete requested for unknown document");
        }
        Ok(DeleteReport {
            file_removed,
            record_removed,
        })
    }

    /// Read a recorded document. Private documents need `include_private`.
    pub fn open_document(
        &self,
        filename: &str,
        include_private: bool,
    ) -> Result<OpenedDocument> {
        let record = self
            .store
            .get(filename)?
            .ok_or_else(|| Error::not_found("document", filename))?;
        if !record.is_public && !include_private {
            return Err(Error::Private(filename.to_string()));
        }
        self.files.resolve(filename)?;
        let content = self.files.read(filename)?;
        Ok(OpenedDocument { record, content })
    }

    pub fn search(
        &self,
        query: &str,
        public_only: bool,
        limit: usize,
    ) -> Result<SearchOutcome> {
        search::execute_search(
            query,
            public_only,
            limit,
            &self.index,
            &self.scanner(),
        )
    }

    /// Push every repository file to the engine. Returns how many were
    /// accepted.
    pub fn reindex(&self) -> Result<usize> {
        ingestion::reindex_all(&self.index, &self.store, &self.files)
    }

    pub fn status(&self) -> Result<LibraryStatus> {
        let records = self.store.list()?;
        let diff = incremental::diff(&self.store, &self.files)?;
        Ok(LibraryStatus {
            data_dir: self.data_dir.root().display().to_string(),
            records: records.len(),
            public: records.iter().filter(|r| r.is_public).count(),
            unsynced: diff.unsynced,
            orphaned: diff.orphaned,
            engine: self.index.engine_name(),
            summarizer: self.summarizer.is_some(),
        })
    }

    /// Records in store order, optionally public only and filtered by a glob
    /// over the filename.
    pub fn list(
        &self,
        public_only: bool,
        pattern: Option<&str>,
    ) -> Result<Vec<DocumentRecord>> {
        let matcher = pattern
            .map(|p| {
                globset::Glob::new(p)
                    .map(|g| g.compile_matcher())
                    .map_err(|e| {
                        Error::Config(format!("invalid glob pattern: {e}"))
                    })
            })
            .transpose()?;

        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|r| !public_only || r.is_public)
            .filter(|r| {
                matcher.as_ref().is_none_or(|m| m.is_match(&r.filename))
            })
            .collect())
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("data_dir", &self.data_dir)
            .field("index", &self.index)
            .field("summarizer", &self.summarizer.is_some())
            .finish()
    }
}

fn snapshot(records: &[DocumentRecord]) -> BTreeMap<String, DocumentRecord> {
    records
        .iter()
        .map(|r| (r.filename.clone(), r.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        enrichment::tests::ScriptedSummarizer,
        search::{SearchSource, tests::MemoryEngine},
        tantivy_index::TantivyEngine,
    };

    const REPLY: &str =
        r#"{"title": "Generated", "description": "Generated description."}"#;

    fn library(
        index: SearchIndex,
        summarizer: Option<Box<dyn Summarizer>>,
    ) -> (tempfile::TempDir, Library) {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let lib = Library::open(data_dir, index, summarizer).unwrap();
        (tmp, lib)
    }

    fn plain() -> (tempfile::TempDir, Library) {
        library(SearchIndex::disabled(), None)
    }

    fn with_engine(engine: MemoryEngine) -> (tempfile::TempDir, Library) {
        library(SearchIndex::new(Box::new(engine)), None)
    }

    #[test]
    fn upload_records_sanitized_names() {
        let (_tmp, lib) = plain();
        let first = lib
            .upload("My Report!.md", b"one", " Title ", "", true)
            .unwrap();
        let second = lib.upload("My Report!.md", b"two", "", "", true).unwrap();

        assert_eq!(first.filename, "my_report.md");
        assert_eq!(second.filename, "my_report-1.md");
        let records = lib.store().list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Title");
    }

    #[test]
    fn upload_rejects_unsupported_type() {
        let (_tmp, lib) = plain();
        let err = lib.upload("photo.png", b"x", "", "", true).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
        assert!(lib.store().list().unwrap().is_empty());
    }

    #[test]
    fn upload_enriches_without_clobbering() {
        let summarizer = Box::new(ScriptedSummarizer::replying(REPLY));
        let (_tmp, lib) = library(SearchIndex::disabled(), Some(summarizer));

        let report = lib.upload("a.md", b"# A", "Mine", "", false).unwrap();
        assert!(report.enriched);
        assert_eq!(report.enrichment_errors, 0);

        let record = lib.store().get("a.md").unwrap().unwrap();
        assert_eq!(record.title, "Mine");
        assert_eq!(record.description, "Generated description.");
        assert!(!record.is_public);
    }

    #[test]
    fn upload_pushes_to_engine_with_stored_visibility() {
        let (_tmp, lib) = with_engine(MemoryEngine::default());
        let report =
            lib.upload("a.md", b"hello world", "T", "D", false).unwrap();
        assert!(report.indexed);

        let outcome = lib.search("hello", true, 10).unwrap();
        assert_eq!(outcome.source, SearchSource::Engine("memory"));
        assert!(outcome.hits.is_empty());
        assert_eq!(lib.search("hello", false, 10).unwrap().hits.len(), 1);
    }

    #[test]
    fn process_syncs_enriches_and_counts() {
        let summarizer = Box::new(ScriptedSummarizer::replying(REPLY));
        let (_tmp, lib) = library(SearchIndex::disabled(), Some(summarizer));
        lib.upload("done.md", b"d", "T", "D", true).unwrap();
        std::fs::write(lib.files().root().join("new.md"), "# New").unwrap();
        lib.store()
            .upsert(DocumentRecord::new("gone.md", "T", "D", true, None))
            .unwrap();

        let summary = lib.process().unwrap();
        assert_eq!(
            summary,
            ProcessSummary {
                new_files: 1,
                enriched: 1,
                skipped: 2,
                errors: 0,
                orphaned: 1,
            }
        );
        let new = lib.store().get("new.md").unwrap().unwrap();
        assert!(!new.is_public);
        assert_eq!(new.title, "Generated");
    }

    #[test]
    fn process_without_summarizer_reports_errors() {
        let (_tmp, lib) = plain();
        std::fs::write(lib.files().root().join("a.md"), "a").unwrap();
        std::fs::write(lib.files().root().join("b.md"), "b").unwrap();

        let summary = lib.process().unwrap();
        assert_eq!(summary.new_files, 2);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.enriched, 0);
        assert_eq!(lib.store().list().unwrap().len(), 2);
    }

    #[test]
    fn enrich_missing_only_targets_incomplete_records() {
        let summarizer = Box::new(ScriptedSummarizer::replying(REPLY));
        let (_tmp, lib) = library(SearchIndex::disabled(), Some(summarizer));
        lib.upload("full.md", b"f", "T", "D", true).unwrap();
        std::fs::write(lib.files().root().join("bare.md"), "b").unwrap();
        lib.store().sync_new_files(lib.files(), true).unwrap();

        let summary = lib.enrich_missing().unwrap();
        assert_eq!(summary.candidates, 1);
        assert_eq!(summary.enriched, 1);
        assert_eq!(lib.store().get("full.md").unwrap().unwrap().title, "T");
    }

    #[test]
    fn set_metadata_overwrites_and_requires_record() {
        let (_tmp, lib) = plain();
        lib.upload("a.md", b"a", "Old", "Old", true).unwrap();

        lib.set_metadata("a.md", MetadataUpdate::title("New")).unwrap();
        let record = lib.store().get("a.md").unwrap().unwrap();
        assert_eq!(record.title, "New");
        assert_eq!(record.description, "Old");

        let err = lib
            .set_metadata("ghost.md", MetadataUpdate::title("x"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(
            lib.set_metadata("ghost.md", MetadataUpdate::default())
                .is_err()
        );
    }

    #[test]
    fn visibility_change_reaches_engine() {
        let (_tmp, lib) = with_engine(MemoryEngine::default());
        lib.upload("a.md", b"hello", "T", "D", false).unwrap();

        lib.set_visibility("a.md", true).unwrap();
        assert!(lib.store().get("a.md").unwrap().unwrap().is_public);
        assert_eq!(lib.search("hello", true, 10).unwrap().hits.len(), 1);

        assert!(matches!(
            lib.set_visibility("ghost.md", true),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn delete_removes_everything_and_is_idempotent() {
        let (_tmp, lib) = with_engine(MemoryEngine::default());
        lib.upload("a.md", b"hello", "T", "D", true).unwrap();

        let report = lib.delete("a.md").unwrap();
        assert_eq!(
            report,
            DeleteReport {
                file_removed: true,
                record_removed: true,
            }
        );
        assert!(!lib.files().exists("a.md"));
        assert!(lib.search("hello", false, 10).unwrap().hits.is_empty());

        let again = lib.delete("a.md").unwrap();
        assert!(!again.file_removed && !again.record_removed);
    }

    #[test]
    fn delete_survives_failing_engine() {
        let (_tmp, lib) = with_engine(MemoryEngine::failing());
        lib.upload("a.md", b"hello", "T", "D", true).unwrap();
        assert!(lib.delete("a.md").unwrap().record_removed);
    }

    #[test]
    fn delete_removes_records_with_unresolvable_names() {
        let (_tmp, lib) = plain();
        lib.store()
            .upsert(DocumentRecord::new("a/b.md", "", "", true, None))
            .unwrap();

        let report = lib.delete("a/b.md").unwrap();
        assert!(!report.file_removed);
        assert!(report.record_removed);
        assert!(lib.store().list().unwrap().is_empty());
    }

    #[test]
    fn open_document_checks_in_order() {
        let (_tmp, lib) = plain();
        lib.upload("public.md", b"pub", "T", "D", true).unwrap();
        lib.upload("private.md", b"priv", "T", "D", false).unwrap();
        lib.store()
            .upsert(DocumentRecord::new("gone.md", "", "", true, None))
            .unwrap();

        let public = lib.open_document("public.md", false).unwrap();
        assert_eq!(public.content, "pub");
        assert!(matches!(
            lib.open_document("private.md", false),
            Err(Error::Private(_))
        ));
        let private = lib.open_document("private.md", true).unwrap();
        assert_eq!(private.content, "priv");
        assert!(matches!(
            lib.open_document("ghost.md", true),
            Err(Error::NotFound { kind: "document", .. })
        ));
        assert!(matches!(
            lib.open_document("gone.md", true),
            Err(Error::NotFound { kind: "file", .. })
        ));
    }

    #[test]
    fn open_document_rejects_traversal_records() {
        let (_tmp, lib) = plain();
        lib.store()
            .upsert(DocumentRecord::new("../secret.md", "", "", true, None))
            .unwrap();
        assert!(matches!(
            lib.open_document("../secret.md", true),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn search_falls_back_when_engine_fails() {
        let (_tmp, lib) = with_engine(MemoryEngine::failing());
        lib.upload("a.md", b"some hello text", "T", "D", true).unwrap();

        let outcome = lib.search("hello", false, 10).unwrap();
        assert_eq!(outcome.source, SearchSource::Fallback);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].snippet, "...some hello text...");
    }

    #[test]
    fn search_falls_back_for_tokens_the_index_drops() {
        let engine = TantivyEngine::open_in_ram().unwrap();
        let (_tmp, lib) = library(SearchIndex::new(Box::new(engine)), None);
        let word = "y".repeat(60);
        lib.upload("a.md", format!("x {word} z").as_bytes(), "T", "D", true)
            .unwrap();

        let outcome = lib.search(&word, false, 10).unwrap();
        assert_eq!(outcome.source, SearchSource::Fallback);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].filename, "a.md");
    }

    #[test]
    fn list_filters_by_visibility_and_glob() {
        let (_tmp, lib) = plain();
        lib.upload("alpha.md", b"a", "T", "D", true).unwrap();
        lib.upload("beta.md", b"b", "T", "D", false).unwrap();
        lib.upload("alpha-notes.markdown", b"c", "T", "D", true).unwrap();

        let names = |records: Vec<DocumentRecord>| {
            records.into_iter().map(|r| r.filename).collect::<Vec<_>>()
        };
        assert_eq!(names(lib.list(true, None).unwrap()).len(), 2);
        assert_eq!(
            names(lib.list(false, Some("alpha*")).unwrap()),
            vec!["alpha.md", "alpha-notes.markdown"]
        );
        assert!(matches!(lib.list(false, Some("[")), Err(Error::Config(_))));
    }

    #[test]
    fn status_reports_sync_work() {
        let (_tmp, lib) = plain();
        lib.upload("a.md", b"a", "T", "D", true).unwrap();
        std::fs::write(lib.files().root().join("b.md"), "b").unwrap();

        let status = lib.status().unwrap();
        assert_eq!(status.records, 1);
        assert_eq!(status.public, 1);
        assert_eq!(status.unsynced, vec!["b.md"]);
        assert!(status.orphaned.is_empty());
        assert_eq!(status.engine, None);
        assert!(!status.summarizer);
    }
}
