use serde::Serialize;
use tracing::{debug, warn};

use crate::{error::Result, query::ParsedQuery, scanner::FallbackScanner};

/// Documents requested from an engine per search.
pub const DEFAULT_ENGINE_LIMIT: usize = 50;

/// One matching fragment of a document. An empty snippet means the document
/// matched but no fragment could be highlighted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub snippet: String,
    pub filename: String,
}

impl SearchHit {
    pub fn new(
        snippet: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            snippet: snippet.into(),
            filename: filename.into(),
        }
    }
}

/// Failure inside a search engine. Never leaves [`SearchIndex`]: it is
/// logged and turned into "not available".
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed engine response: {0}")]
    Decode(String),

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("invalid query: {0}")]
    Query(String),
}

/// A full-text engine keyed by filename.
pub trait SearchEngine: Send + Sync {
    /// Short name for logs and status output.
    fn name(&self) -> &'static str;

    /// Insert or replace the document stored under `filename`.
    fn index_document(
        &self,
        filename: &str,
        content: &str,
        is_public: bool,
    ) -> std::result::Result<(), EngineError>;

    /// Change only the visibility flag of an indexed document.
    fn update_visibility(
        &self,
        filename: &str,
        is_public: bool,
    ) -> std::result::Result<(), EngineError>;

    /// Remove a document. Removing an unknown document succeeds.
    fn delete_document(
        &self,
        filename: &str,
    ) -> std::result::Result<(), EngineError>;

    /// Documents matching `query`, at most `limit` of them, each expanded to
    /// one hit per highlighted fragment.
    fn search(
        &self,
        query: &ParsedQuery,
        public_only: bool,
        limit: usize,
    ) -> std::result::Result<Vec<SearchHit>, EngineError>;
}

/// The optional search engine. When no engine is configured every mutation
/// is a no-op and [`SearchIndex::search`] reports "not available".
pub struct SearchIndex {
    engine: Option<Box<dyn SearchEngine>>,
}

impl SearchIndex {
    pub fn new(engine: Box<dyn SearchEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub fn disabled() -> Self {
        Self { engine: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine_name(&self) -> Option<&'static str> {
        self.engine.as_ref().map(|e| e.name())
    }

    /// Push one document. Returns whether the engine accepted it.
    pub fn index_document(
        &self,
        filename: &str,
        content: &str,
        is_public: bool,
    ) -> bool {
        let Some(engine) = &self.engine else {
            return false;
        };
        match engine.index_document(filename, content, is_public) {
            Ok(()) => {
                debug!(engine = engine.name(), filename, "indexed document");
                true
            }
            Err(e) => {
                warn!(engine = engine.name(), filename, "index failed: {e}");
                false
            }
        }
    }

    pub fn update_visibility(&self, filename: &str, is_public: bool) {
        let Some(engine) = &self.engine else {
            return;
        };
        if let Err(e) = engine.update_visibility(filename, is_public) {
            warn!(
                engine = engine.name(),
                filename,
                "visibility update failed: {e}"
            );
        }
    }

    pub fn delete_document(&self, filename: &str) {
        let Some(engine) = &self.engine else {
            return;
        };
        if let Err(e) = engine.delete_document(filename) {
            warn!(engine = engine.name(), filename, "delete failed: {e}");
        }
    }

    /// Engine hits for `query`, or `None` when there is no engine or it
    /// failed. `Some(vec![])` is a genuine "no matches".
    pub fn search(
        &self,
        query: &str,
        public_only: bool,
        limit: usize,
    ) -> Option<Vec<SearchHit>> {
        let engine = self.engine.as_ref()?;
        let parsed = ParsedQuery::parse(query.trim());
        if parsed.is_empty() {
            return Some(Vec::new());
        }
        match engine.search(&parsed, public_only, limit) {
            Ok(hits) => Some(hits),
            Err(e) => {
                warn!(engine = engine.name(), "search failed: {e}");
                None
            }
        }
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("engine", &self.engine_name())
            .finish()
    }
}

/// Which path produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum SearchSource {
    Engine(&'static str),
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub source: SearchSource,
    pub hits: Vec<SearchHit>,
}

/// Run `query` against the engine, falling back to the scanner when the
/// engine is disabled or not available.
///
/// `limit` bounds the documents requested from the engine; the scanner has
/// its own hit cap.
pub fn execute_search(
    query: &str,
    public_only: bool,
    limit: usize,
    index: &SearchIndex,
    scanner: &FallbackScanner<'_>,
) -> Result<SearchOutcome> {
    if let Some(hits) = index.search(query, public_only, limit) {
        let name = index.engine_name().unwrap_or("engine");
        return Ok(SearchOutcome {
            source: SearchSource::Engine(name),
            hits,
        });
    }
    if index.is_enabled() {
        debug!("engine not available, using fallback scanner");
    }
    Ok(SearchOutcome {
        source: SearchSource::Fallback,
        hits: scanner.search(query, public_only)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// In-memory engine that records calls, optionally failing every one.
    #[derive(Default)]
    pub(crate) struct MemoryEngine {
        pub docs: Mutex<Vec<(String, String, bool)>>,
        pub fail: bool,
    }

    impl MemoryEngine {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn check(&self) -> std::result::Result<(), EngineError> {
            if self.fail {
                Err(EngineError::Decode("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    impl SearchEngine for MemoryEngine {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn index_document(
            &self,
            filename: &str,
            content: &str,
            is_public: bool,
        ) -> std::result::Result<(), EngineError> {
            self.check()?;
            let mut docs = self.docs.lock().unwrap();
            docs.retain(|(name, _, _)| name != filename);
            docs.push((filename.into(), content.into(), is_public));
            Ok(())
        }

        fn update_visibility(
            &self,
            filename: &str,
            is_public: bool,
        ) -> std::result::Result<(), EngineError> {
            self.check()?;
            for doc in self.docs.lock().unwrap().iter_mut() {
                if doc.0 == filename {
                    doc.2 = is_public;
                }
            }
            Ok(())
        }

        fn delete_document(
            &self,
            filename: &str,
        ) -> std::result::Result<(), EngineError> {
            self.check()?;
            self.docs.lock().unwrap().retain(|(name, _, _)| name != filename);
            Ok(())
        }

        fn search(
            &self,
            query: &ParsedQuery,
            public_only: bool,
            limit: usize,
        ) -> std::result::Result<Vec<SearchHit>, EngineError> {
            self.check()?;
            let needles = query.needles();
            Ok(self
                .docs
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, _, public)| !public_only || *public)
                .filter(|(_, content, _)| {
                    let content = content.to_lowercase();
                    needles.iter().all(|n| content.contains(&n.to_lowercase()))
                })
                .take(limit)
                .map(|(name, _, _)| SearchHit::new("", name.as_str()))
                .collect())
        }
    }

    #[test]
    fn disabled_index_is_not_available() {
        let index = SearchIndex::disabled();
        assert!(!index.is_enabled());
        assert!(!index.index_document("a.md", "text", true));
        index.update_visibility("a.md", false);
        index.delete_document("a.md");
        assert_eq!(index.search("text", false, 10), None);
    }

    #[test]
    fn failing_engine_is_not_available() {
        let index = SearchIndex::new(Box::new(MemoryEngine::failing()));
        assert!(!index.index_document("a.md", "text", true));
        index.delete_document("a.md");
        assert_eq!(index.search("text", false, 10), None);
    }

    #[test]
    fn blank_query_is_an_empty_result() {
        let index = SearchIndex::new(Box::new(MemoryEngine::failing()));
        assert_eq!(index.search("   ", false, 10), Some(vec![]));
    }

    #[test]
    fn index_then_delete_leaves_nothing() {
        let index = SearchIndex::new(Box::new(MemoryEngine::default()));
        assert!(index.index_document("a.md", "hello world", true));
        assert_eq!(index.search("hello", false, 10).unwrap().len(), 1);

        index.delete_document("a.md");
        index.delete_document("a.md");
        assert_eq!(index.search("hello", false, 10), Some(vec![]));
    }

    #[test]
    fn public_only_respects_visibility_updates() {
        let index = SearchIndex::new(Box::new(MemoryEngine::default()));
        index.index_document("a.md", "hello", true);
        index.update_visibility("a.md", false);

        assert!(index.search("hello", true, 10).unwrap().is_empty());
        assert_eq!(index.search("hello", false, 10).unwrap().len(), 1);
    }
}
