use std::{path::PathBuf, time::Duration};

use tracing::{info, warn};

use crate::{
    data_dir::DataDir,
    elasticsearch::{self, ElasticsearchConfig, ElasticsearchEngine},
    error::Result,
    library::Library,
    search::SearchIndex,
    summarizer::{self, OpenAiConfig, OpenAiSummarizer, Summarizer},
    tantivy_index::TantivyEngine,
};

/// Runtime settings. Every option can also come from the environment.
#[derive(Debug, Clone, clap::Args)]
pub struct Settings {
    /// Storage root (defaults to the XDG data directory)
    #[arg(long, env = "THEDOCS_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Elasticsearch base URL; search falls back to scanning when unset
    #[arg(long, env = "ELASTICSEARCH_URL", global = true)]
    pub elasticsearch_url: Option<String>,

    /// Elasticsearch index name
    #[arg(
        long,
        env = "ELASTICSEARCH_INDEX",
        default_value = elasticsearch::DEFAULT_INDEX,
        global = true
    )]
    pub elasticsearch_index: String,

    #[arg(long, env = "ELASTICSEARCH_USERNAME", global = true)]
    pub elasticsearch_username: Option<String>,

    #[arg(
        long,
        env = "ELASTICSEARCH_PASSWORD",
        hide_env_values = true,
        global = true
    )]
    pub elasticsearch_password: Option<String>,

    /// Use the embedded index under the data directory when no
    /// Elasticsearch URL is set
    #[arg(
        long,
        env = "THEDOCS_LOCAL_INDEX",
        value_parser = clap::builder::FalseyValueParser::new(),
        global = true
    )]
    pub local_index: bool,

    /// OpenAI API key; enrichment is disabled when unset
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    #[arg(
        long,
        env = "OPENAI_MODEL",
        default_value = summarizer::DEFAULT_MODEL,
        global = true
    )]
    pub openai_model: String,

    #[arg(
        long,
        env = "OPENAI_BASE_URL",
        default_value = summarizer::DEFAULT_BASE_URL,
        global = true
    )]
    pub openai_base_url: String,

    /// Timeout for every search engine and summarizer request
    #[arg(
        long,
        env = "THEDOCS_HTTP_TIMEOUT",
        value_name = "SECS",
        default_value_t = 30,
        global = true
    )]
    pub http_timeout: u64,

    /// How long to wait for the index table lock
    #[arg(
        long,
        env = "THEDOCS_LOCK_TIMEOUT",
        value_name = "SECS",
        default_value_t = 10,
        global = true
    )]
    pub lock_timeout: u64,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Settings {
    pub fn resolve_data_dir(&self) -> Result<DataDir> {
        DataDir::resolve(self.data_dir.as_deref())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout)
    }

    pub fn elasticsearch(&self) -> Option<ElasticsearchConfig> {
        Some(ElasticsearchConfig {
            url: non_blank(&self.elasticsearch_url)?,
            index: self.elasticsearch_index.clone(),
            username: non_blank(&self.elasticsearch_username),
            password: non_blank(&self.elasticsearch_password),
            timeout: self.http_timeout(),
        })
    }

    pub fn openai(&self) -> Option<OpenAiConfig> {
        Some(OpenAiConfig {
            api_key: non_blank(&self.openai_api_key)?,
            model: self.openai_model.clone(),
            base_url: self.openai_base_url.clone(),
            timeout: self.http_timeout(),
        })
    }

    /// The configured search engine. An engine that cannot be set up is
    /// logged and treated as absent.
    pub fn search_index(&self, data_dir: &DataDir) -> Result<SearchIndex> {
        if let Some(config) = self.elasticsearch() {
            return Ok(match ElasticsearchEngine::new(&config) {
                Ok(engine) => SearchIndex::new(Box::new(engine)),
                Err(e) => {
                    warn!(
                        "elasticsearch unavailable, search will scan files: {e}"
                    );
                    SearchIndex::disabled()
                }
            });
        }
        if self.local_index {
            return Ok(match TantivyEngine::open(&data_dir.tantivy_dir()?) {
                Ok(engine) => {
                    info!("using embedded index");
                    SearchIndex::new(Box::new(engine))
                }
                Err(e) => {
                    warn!(
                        "embedded index unavailable, \
                         search will scan files: {e}"
                    );
                    SearchIndex::disabled()
                }
            });
        }
        Ok(SearchIndex::disabled())
    }

    pub fn summarizer(&self) -> Option<Box<dyn Summarizer>> {
        let config = self.openai()?;
        match OpenAiSummarizer::new(&config) {
            Ok(summarizer) => Some(Box::new(summarizer)),
            Err(e) => {
                warn!("summarizer unavailable: {e}");
                None
            }
        }
    }

    pub fn open_library(&self) -> Result<Library> {
        let data_dir = self.resolve_data_dir()?;
        let index = self.search_index(&data_dir)?;
        Ok(Library::open(data_dir, index, self.summarizer())?
            .with_lock_timeout(self.lock_timeout()))
    }
}
