//! thedocs - a self-hosted markdown document index with full-text search.
//!
//! Uploaded markdown files live in a flat directory next to a CSV table of
//! per-document metadata (title, description, visibility, dates). Content
//! search goes to [Elasticsearch](https://www.elastic.co/elasticsearch) or
//! an embedded [Tantivy](https://github.com/quickwit-oss/tantivy) index when
//! one is configured, and to a direct scan of the files otherwise. Missing
//! titles and descriptions can be generated by a language model.
//!
//! # Quick start
//!
//! ```no_run
//! use thedocs::{DataDir, Library, SearchIndex};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let library =
//!     Library::open(data_dir, SearchIndex::disabled(), None).unwrap();
//!
//! library
//!     .upload("notes.md", b"# Notes\n\nhello world", "Notes", "", true)
//!     .unwrap();
//!
//! let outcome = library.search("\"hello world\"", true, 50).unwrap();
//! for hit in &outcome.hits {
//!     println!("{}: {}", hit.filename, hit.snippet);
//! }
//! ```

pub mod config;
pub mod data_dir;
pub mod elasticsearch;
pub mod enrichment;
pub mod error;
pub mod incremental;
pub mod ingestion;
pub mod library;
pub mod query;
pub mod record;
pub mod record_store;
pub mod repository;
pub mod scanner;
pub mod search;
pub mod summarizer;
pub mod tantivy_index;
pub mod text_util;

pub use config::Settings;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use library::Library;
pub use record::{DocumentRecord, MetadataUpdate};
pub use record_store::RecordStore;
pub use repository::FileRepository;
pub use search::SearchIndex;
