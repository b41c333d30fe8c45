use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    record::{DocumentRecord, MetadataUpdate},
    repository::FileRepository,
    summarizer::{self, Summarizer, SummarizerError},
};

/// Placeholder replaced by the document text in a prompt template.
pub const CONTENT_PLACEHOLDER: &str = "{markdown_file_content}";

pub const FALLBACK_TEMPLATE: &str = "Summarize the markdown and return JSON \
with keys title and description. Use a concise title and a 1-3 sentence \
description with an animated tone and emojis where appropriate.\n\
Markdown:\n{markdown_file_content}";

/// Why one file could not be enriched.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("cannot read content: {0}")]
    Unreadable(crate::Error),

    #[error("no summarizer configured")]
    NotConfigured,

    #[error("summarizer failed: {0}")]
    Summarizer(#[from] SummarizerError),

    #[error("summarizer response had no title or description")]
    Unusable,
}

/// Outcome of one enrichment batch. Nothing here has been written yet.
#[derive(Debug, Default)]
pub struct EnrichmentReport {
    /// Proposed updates, only for fields that were empty in the snapshot.
    pub updates: BTreeMap<String, MetadataUpdate>,
    pub errors: usize,
    pub failures: Vec<(String, EnrichmentError)>,
}

impl EnrichmentReport {
    fn fail(&mut self, filename: &str, error: EnrichmentError) {
        debug!(filename, "enrichment failed: {error}");
        self.errors += 1;
        self.failures.push((filename.to_string(), error));
    }
}

/// Fills missing titles and descriptions by asking a summarizer.
pub struct Enricher<'a> {
    files: &'a FileRepository,
    summarizer: Option<&'a dyn Summarizer>,
    template_path: PathBuf,
}

impl<'a> Enricher<'a> {
    pub fn new(
        files: &'a FileRepository,
        summarizer: Option<&'a dyn Summarizer>,
        template_path: &Path,
    ) -> Self {
        Self {
            files,
            summarizer,
            template_path: template_path.to_path_buf(),
        }
    }

    /// The prompt template, or the built-in one when the file is missing or
    /// unreadable.
    pub fn template(&self) -> String {
        match std::fs::read_to_string(&self.template_path) {
            Ok(template) => template,
            Err(_) => {
                warn!(
                    path = %self.template_path.display(),
                    "prompt template not found, using built-in prompt"
                );
                FALLBACK_TEMPLATE.to_string()
            }
        }
    }

    /// Propose metadata for each of `candidates`.
    ///
    /// `existing` is the caller's snapshot of the records; a field is only
    /// proposed when it is empty there. Candidates without a snapshot entry
    /// are treated as having no metadata. The store is not touched: the
    /// caller applies [`EnrichmentReport::updates`] afterwards, outside any
    /// lock held here.
    pub fn enrich(
        &self,
        candidates: &[String],
        existing: &BTreeMap<String, DocumentRecord>,
    ) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        if candidates.is_empty() {
            return report;
        }
        let Some(summarizer) = self.summarizer else {
            warn!(
                count = candidates.len(),
                "no summarizer configured, skipping enrichment"
            );
            for filename in candidates {
                report.fail(filename, EnrichmentError::NotConfigured);
            }
            return report;
        };

        let template = self.template();
        for filename in candidates {
            let content = match self.files.read(filename) {
                Ok(content) => content,
                Err(e) => {
                    report.fail(filename, EnrichmentError::Unreadable(e));
                    continue;
                }
            };
            let prompt = template.replace(CONTENT_PLACEHOLDER, &content);

            let generated = match summarizer.complete(&prompt) {
                Ok(text) => match summarizer::parse_metadata(&text) {
                    Some(generated) => generated,
                    None => {
                        report.fail(filename, EnrichmentError::Unusable);
                        continue;
                    }
                },
                Err(e) => {
                    report.fail(filename, e.into());
                    continue;
                }
            };

            let current = existing.get(filename);
            let missing =
                |value: Option<&String>| value.is_none_or(|v| v.is_empty());
            let update = MetadataUpdate {
                title: (!generated.title.is_empty()
                    && missing(current.map(|r| &r.title)))
                .then_some(generated.title),
                description: (!generated.description.is_empty()
                    && missing(current.map(|r| &r.description)))
                .then_some(generated.description),
            };
            if !update.is_empty() {
                debug!(filename, "proposed metadata");
                report.updates.insert(filename.clone(), update);
            }
        }

        info!(
            candidates = candidates.len(),
            proposed = report.updates.len(),
            errors = report.errors,
            "enrichment finished"
        );
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Replies from a fixed script and records the prompts it saw.
    pub(crate) struct ScriptedSummarizer {
        pub reply: Result<String, ()>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedSummarizer {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: Err(()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl Summarizer for ScriptedSummarizer {
        fn complete(&self, prompt: &str) -> Result<String, SummarizerError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|()| SummarizerError::Empty)
        }
    }

    fn fixture() -> (tempfile::TempDir, FileRepository, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let files = FileRepository::new(tmp.path().join("markdown_files"));
        std::fs::create_dir_all(files.root()).unwrap();
        let template = tmp.path().join("prompts").join("summarize_markdown.md");
        (tmp, files, template)
    }

    fn snapshot(
        records: &[DocumentRecord],
    ) -> BTreeMap<String, DocumentRecord> {
        records
            .iter()
            .map(|r| (r.filename.clone(), r.clone()))
            .collect()
    }

    const REPLY: &str =
        r#"{"title": "New Title", "description": "New description."}"#;

    #[test]
    fn proposes_only_missing_fields() {
        let (_tmp, files, template) = fixture();
        std::fs::write(files.root().join("a.md"), "# A").unwrap();
        let summarizer = ScriptedSummarizer::replying(REPLY);
        let enricher = Enricher::new(&files, Some(&summarizer), &template);

        let existing =
            snapshot(&[DocumentRecord::new("a.md", "X", "", true, None)]);
        let report = enricher.enrich(&["a.md".to_string()], &existing);

        assert_eq!(report.errors, 0);
        assert_eq!(
            report.updates["a.md"],
            MetadataUpdate::description("New description.")
        );
    }

    #[test]
    fn fully_described_record_yields_no_update() {
        let (_tmp, files, template) = fixture();
        std::fs::write(files.root().join("a.md"), "# A").unwrap();
        let summarizer = ScriptedSummarizer::replying(REPLY);
        let enricher = Enricher::new(&files, Some(&summarizer), &template);

        let existing =
            snapshot(&[DocumentRecord::new("a.md", "X", "Y", true, None)]);
        let report = enricher.enrich(&["a.md".to_string()], &existing);

        assert!(report.updates.is_empty());
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn missing_file_and_bad_reply_are_errors() {
        let (_tmp, files, template) = fixture();
        std::fs::write(files.root().join("a.md"), "# A").unwrap();
        let summarizer = ScriptedSummarizer::replying("no metadata here");
        let enricher = Enricher::new(&files, Some(&summarizer), &template);

        let report = enricher.enrich(
            &["a.md".to_string(), "gone.md".to_string()],
            &BTreeMap::new(),
        );

        assert_eq!(report.errors, 2);
        assert!(report.updates.is_empty());
        assert!(matches!(report.failures[0].1, EnrichmentError::Unusable));
        assert!(matches!(report.failures[1].1, EnrichmentError::Unreadable(_)));
    }

    #[test]
    fn summarizer_failure_is_counted() {
        let (_tmp, files, template) = fixture();
        std::fs::write(files.root().join("a.md"), "# A").unwrap();
        std::fs::write(files.root().join("b.md"), "# B").unwrap();
        let summarizer = ScriptedSummarizer::failing();
        let enricher = Enricher::new(&files, Some(&summarizer), &template);

        let candidates = ["a.md".to_string(), "b.md".to_string()];
        let report = enricher.enrich(&candidates, &BTreeMap::new());
        assert_eq!(report.errors, 2);
        assert!(matches!(report.failures[0].1, EnrichmentError::Summarizer(_)));
    }

    #[test]
    fn without_summarizer_every_candidate_is_an_error() {
        let (_tmp, files, template) = fixture();
        std::fs::write(files.root().join("a.md"), "# A").unwrap();
        let enricher = Enricher::new(&files, None, &template);

        let report = enricher.enrich(&["a.md".to_string()], &BTreeMap::new());
        assert_eq!(report.errors, 1);
        assert!(matches!(report.failures[0].1, EnrichmentError::NotConfigured));
    }

    #[test]
    fn template_file_is_used_when_present() {
        let (_tmp, files, template) = fixture();
        std::fs::write(files.root().join("a.md"), "BODY").unwrap();
        std::fs::create_dir_all(template.parent().unwrap()).unwrap();
        std::fs::write(&template, "Custom <{markdown_file_content}>").unwrap();
        let summarizer = ScriptedSummarizer::replying(REPLY);
        let enricher = Enricher::new(&files, Some(&summarizer), &template);

        enricher.enrich(&["a.md".to_string()], &BTreeMap::new());
        assert_eq!(summarizer.prompts.lock().unwrap()[0], "Custom <BODY>");
    }

    #[test]
    fn builtin_template_is_the_fallback() {
        let (_tmp, files, template) = fixture();
        std::fs::write(files.root().join("a.md"), "BODY").unwrap();
        let summarizer = ScriptedSummarizer::replying(REPLY);
        let enricher = Enricher::new(&files, Some(&summarizer), &template);

        let report = enricher.enrich(&["a.md".to_string()], &BTreeMap::new());
        let prompt = &summarizer.prompts.lock().unwrap()[0];
        assert!(prompt.starts_with("Summarize the markdown"));
        assert!(prompt.ends_with("Markdown:\nBODY"));
        assert_eq!(report.updates["a.md"].title.as_deref(), Some("New Title"));
    }
}
