use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{
    StatusCode,
    blocking::{Client, RequestBuilder, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
    query::ParsedQuery,
    search::{EngineError, SearchEngine, SearchHit},
    text_util::{FRAGMENT_SIZE, MAX_FRAGMENTS},
};

pub const DEFAULT_INDEX: &str = "thedocs";

/// Escaped in index names and document ids placed in URL paths.
const PATH_SEGMENT: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Characters with meaning in `query_string` syntax.
const RESERVED: &[char] = &[
    '+', '-', '=', '&', '|', '>', '<', '!', '(', ')', '{', '}', '[', ']', '^',
    '"', '~', ':', '/', '\\',
];

/// Connection settings for a remote Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
    /// Basic auth, used only when both halves are present.
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

/// [`SearchEngine`] backed by an Elasticsearch index over its REST API.
pub struct ElasticsearchEngine {
    client: Client,
    base: String,
    index: String,
    auth: Option<(String, String)>,
    index_ready: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Hits,
}

#[derive(Debug, Default, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: Source,
    #[serde(default)]
    highlight: Highlight,
}

#[derive(Debug, Default, Deserialize)]
struct Source {
    #[serde(default)]
    filename: String,
}

#[derive(Debug, Default, Deserialize)]
struct Highlight {
    #[serde(default)]
    content: Vec<String>,
}

impl ElasticsearchEngine {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, EngineError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let auth = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        info!(url = %config.url, index = %config.index, "using elasticsearch");
        Ok(Self {
            client,
            base: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            auth,
            index_ready: AtomicBool::new(false),
        })
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base, encode(&self.index))
    }

    fn doc_url(&self, endpoint: &str, filename: &str) -> String {
        format!("{}/{endpoint}/{}", self.index_url(), encode(filename))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, EngineError> {
        let request = match &self.auth {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        };
        Ok(request.send()?)
    }

    /// Create the index with its mapping the first time it is needed.
    fn ensure_index(&self) -> Result<(), EngineError> {
        if self.index_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let response = self.send(self.client.head(self.index_url()))?;
        if response.status() == StatusCode::NOT_FOUND {
            let body = json!({
                "mappings": {
                    "properties": {
                        "filename": { "type": "keyword" },
                        "content": { "type": "text" },
                        "is_public": { "type": "boolean" },
                    }
                }
            });
            let created =
                self.send(self.client.put(self.index_url()).json(&body))?;
            match check(created) {
                Ok(_) => {
                    info!(index = %self.index, "created elasticsearch index")
                }
                // Another writer created it in between.
                Err(EngineError::Status { body, .. })
                    if body.contains("resource_already_exists_exception") => {}
                Err(e) => return Err(e),
            }
        } else {
            check(response)?;
        }
        self.index_ready.store(true, Ordering::Release);
        Ok(())
    }
}

impl SearchEngine for ElasticsearchEngine {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    fn index_document(
        &self,
        filename: &str,
        content: &str,
        is_public: bool,
    ) -> Result<(), EngineError> {
        self.ensure_index()?;
        let body = json!({
            "filename": filename,
            "content": content,
            "is_public": is_public,
        });
        let request = self
            .client
            .put(self.doc_url("_doc", filename))
            .query(&[("refresh", "true")])
            .json(&body);
        check(self.send(request)?)?;
        Ok(())
    }

    fn update_visibility(
        &self,
        filename: &str,
        is_public: bool,
    ) -> Result<(), EngineError> {
        self.ensure_index()?;
        let request = self
            .client
            .post(self.doc_url("_update", filename))
            .query(&[("refresh", "true")])
            .json(&json!({ "doc": { "is_public": is_public } }));
        check(self.send(request)?)?;
        Ok(())
    }

    fn delete_document(&self, filename: &str) -> Result<(), EngineError> {
        self.ensure_index()?;
        let request = self
            .client
            .delete(self.doc_url("_doc", filename))
            .query(&[("refresh", "true")]);
        let response = self.send(request)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(filename, "document already absent from elasticsearch");
            return Ok(());
        }
        check(response)?;
        Ok(())
    }

    fn search(
        &self,
        query: &ParsedQuery,
        public_only: bool,
        limit: usize,
    ) -> Result<Vec<SearchHit>, EngineError> {
        self.ensure_index()?;
        let body = search_body(query, public_only, limit);
        let request = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .json(&body);
        let response = check(self.send(request)?)?;
        let parsed: SearchResponse = response
            .json()
            .map_err(|e| EngineError::Decode(e.to_string()))?;

        let mut hits = Vec::new();
        for hit in parsed.hits.hits {
            if hit.highlight.content.is_empty() {
                hits.push(SearchHit::new("", hit.source.filename));
            } else {
                for fragment in hit.highlight.content {
                    hits.push(SearchHit::new(
                        fragment,
                        hit.source.filename.as_str(),
                    ));
                }
            }
        }
        Ok(hits)
    }
}

impl std::fmt::Debug for ElasticsearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchEngine")
            .field("base", &self.base)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// The `_search` request body for `query`.
pub fn search_body(
    query: &ParsedQuery,
    public_only: bool,
    limit: usize,
) -> Value {
    let clause = match query {
        ParsedQuery::Phrase(phrase) => {
            json!({ "match_phrase": { "content": phrase } })
        }
        ParsedQuery::Terms(tokens) => {
            let joined = tokens
                .iter()
                .map(|t| format!("*{}*", escape_query_string(t)))
                .collect::<Vec<_>>()
                .join(" ");
            json!({
                "query_string": {
                    "query": joined,
                    "fields": ["content"],
                    "default_operator": "AND",
                    "analyze_wildcard": true,
                }
            })
        }
    };

    let mut bool_query = json!({ "must": [clause] });
    if public_only {
        bool_query["filter"] = json!([{ "term": { "is_public": true } }]);
    }

    json!({
        "query": { "bool": bool_query },
        "highlight": {
            "fields": {
                "content": {
                    "fragment_size": FRAGMENT_SIZE,
                    "number_of_fragments": MAX_FRAGMENTS,
                }
            },
            "pre_tags": [""],
            "post_tags": [""],
        },
        "size": limit,
    })
}

/// Backslash-escape `query_string` operators in a single token.
pub fn escape_query_string(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

fn check(response: Response) -> Result<Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(EngineError::Status {
        status: status.as_u16(),
        body,
    })
}
