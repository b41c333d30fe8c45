use std::path::Path;

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::TopDocs,
    doc,
    query::{BooleanQuery, Occur, PhraseQuery, Query, RegexQuery, TermQuery},
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        TextAnalyzer,
        TokenStream,
    },
};
use tracing::debug;

use crate::{
    query::ParsedQuery,
    search::{EngineError, SearchEngine, SearchHit},
    text_util::{self, FRAGMENT_SIZE, MAX_FRAGMENTS},
};

/// Field names used in the schema.
pub mod fields {
    pub const FILENAME: &str = "filename";
    pub const CONTENT: &str = "content";
    pub const IS_PUBLIC: &str = "is_public";
}

const TOKENIZER: &str = "lower_simple";
const WRITER_MEMORY: usize = 15_000_000;
/// Tokens of this many bytes or more are dropped at indexing time.
const MAX_TOKEN_BYTES: usize = 40;

/// Embedded Tantivy index keyed by filename, used as a local
/// [`SearchEngine`] when no remote cluster is configured.
pub struct TantivyEngine {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
struct SchemaFields {
    filename: Field,
    content: Field,
    is_public: Field,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let filename = builder.add_text_field(fields::FILENAME, STRING | STORED);
    let content_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let content = builder.add_text_field(fields::CONTENT, content_opts);
    let is_public = builder.add_bool_field(fields::IS_PUBLIC, INDEXED | STORED);

    (
        builder.build(),
        SchemaFields {
            filename,
            content,
            is_public,
        },
    )
}

fn register_tokenizers(index: &Index) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TOKENIZER, analyzer);
}

impl TantivyEngine {
    /// Open or create an index at the given directory.
    pub fn open(dir: &Path) -> Result<Self, EngineError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let (schema, fields) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        };

        Self::from_index(index, fields)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram() -> Result<Self, EngineError> {
        let (schema, fields) = build_schema();
        Self::from_index(Index::create_in_ram(schema), fields)
    }

    fn from_index(
        index: Index,
        fields: SchemaFields,
    ) -> Result<Self, EngineError> {
        register_tokenizers(&index);
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    fn writer(&self) -> Result<IndexWriter, EngineError> {
        Ok(self.index.writer(WRITER_MEMORY)?)
    }

    /// Query-side tokens. A token the index would have dropped can never
    /// match, so it is an error rather than an empty result.
    fn tokens(&self, text: &str) -> Result<Vec<String>, EngineError> {
        let mut analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .build();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        stream.process(&mut |token| tokens.push(token.text.clone()));
        if let Some(long) = tokens.iter().find(|t| t.len() >= MAX_TOKEN_BYTES) {
            return Err(EngineError::Query(format!(
                "token of {} bytes is not indexed: {long}",
                long.len()
            )));
        }
        Ok(tokens)
    }

    fn filename_term(&self, filename: &str) -> Term {
        Term::from_field_text(self.fields.filename, filename)
    }

    fn replace(
        &self,
        writer: &mut IndexWriter,
        filename: &str,
        content: &str,
        is_public: bool,
    ) -> Result<(), EngineError> {
        let f = self.fields;
        writer.delete_term(self.filename_term(filename));
        writer.add_document(doc!(
            f.filename => filename,
            f.content => content,
            f.is_public => is_public,
        ))?;
        writer.commit()?;
        Ok(())
    }

    /// Stored content of `filename`, if it is indexed.
    fn stored_content(
        &self,
        filename: &str,
    ) -> Result<Option<String>, EngineError> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            self.filename_term(filename),
            IndexRecordOption::Basic,
        );
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        let Some((_, address)) = top.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(address)?;
        Ok(Some(extract_text(&doc, self.fields.content)))
    }

    /// The content clause for `query`, or `None` when nothing in it can
    /// match (for example a phrase made only of punctuation).
    fn content_query(
        &self,
        query: &ParsedQuery,
    ) -> Result<Option<Box<dyn Query>>, EngineError> {
        let field = self.fields.content;
        match query {
            ParsedQuery::Phrase(phrase) => {
                let terms: Vec<Term> = self
                    .tokens(phrase)?
                    .iter()
                    .map(|t| Term::from_field_text(field, t))
                    .collect();
                Ok(match terms.len() {
                    0 => None,
                    1 => Some(Box::new(TermQuery::new(
                        terms[0].clone(),
                        IndexRecordOption::WithFreqs,
                    ))),
                    _ => Some(Box::new(PhraseQuery::new(terms))),
                })
            }
            ParsedQuery::Terms(tokens) => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for token in tokens {
                    for sub in self.tokens(token)? {
                        let pattern = format!(".*{}.*", regex::escape(&sub));
                        let regex = RegexQuery::from_pattern(&pattern, field)
                            .map_err(|e| EngineError::Query(e.to_string()))?;
                        clauses.push((Occur::Must, Box::new(regex)));
                    }
                }
                if clauses.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Box::new(BooleanQuery::new(clauses))))
            }
        }
    }
}

impl SearchEngine for TantivyEngine {
    fn name(&self) -> &'static str {
        "tantivy"
    }

    fn index_document(
        &self,
        filename: &str,
        content: &str,
        is_public: bool,
    ) -> Result<(), EngineError> {
        let mut writer = self.writer()?;
        self.replace(&mut writer, filename, content, is_public)
    }

    fn update_visibility(
        &self,
        filename: &str,
        is_public: bool,
    ) -> Result<(), EngineError> {
        let Some(content) = self.stored_content(filename)? else {
            debug!(filename, "visibility update for unindexed document");
            return Ok(());
        };
        let mut writer = self.writer()?;
        self.replace(&mut writer, filename, &content, is_public)
    }

    fn delete_document(&self, filename: &str) -> Result<(), EngineError> {
        let mut writer = self.writer()?;
        writer.delete_term(self.filename_term(filename));
        writer.commit()?;
        Ok(())
    }

    fn search(
        &self,
        query: &ParsedQuery,
        public_only: bool,
        limit: usize,
    ) -> Result<Vec<SearchHit>, EngineError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(content_query) = self.content_query(query)? else {
            return Ok(Vec::new());
        };

        let mut clauses = vec![(Occur::Must, content_query)];
        if public_only {
            let term = Term::from_field_bool(self.fields.is_public, true);
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }
        let combined = BooleanQuery::new(clauses);

        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&combined, &TopDocs::with_limit(limit))?;

        let needles = query.needles();
        let mut hits = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let filename = extract_text(&doc, self.fields.filename);
            let content = extract_text(&doc, self.fields.content);
            let fragments = text_util::fragments(
                &content,
                &needles,
                FRAGMENT_SIZE,
                MAX_FRAGMENTS,
            );
            if fragments.is_empty() {
                hits.push(SearchHit::new("", filename));
            } else {
                hits.extend(
                    fragments
                        .into_iter()
                        .map(|f| SearchHit::new(f, filename.as_str())),
                );
            }
        }
        Ok(hits)
    }
}

impl std::fmt::Debug for TantivyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyEngine").finish_non_exhaustive()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}
