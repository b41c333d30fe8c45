use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{.*\}").expect("json block pattern is a valid regex")
});
static TITLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)title\s*:\s*(.+)").expect("title pattern is a valid regex")
});
static DESCRIPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)description\s*:\s*(.+)")
        .expect("description pattern is a valid regex")
});

#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("summarizer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("summarizer returned no text")]
    Empty,
}

/// Turns a prompt into free-form response text.
pub trait Summarizer: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, SummarizerError>;
}

/// Title and description extracted from a summarizer response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedMetadata {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// [`Summarizer`] calling the OpenAI Responses API.
#[derive(Debug)]
pub struct OpenAiSummarizer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl OpenAiSummarizer {
    pub fn new(config: &OpenAiConfig) -> Result<Self, SummarizerError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/responses",
                config.base_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

impl Summarizer for OpenAiSummarizer {
    fn complete(&self, prompt: &str) -> Result<String, SummarizerError> {
        debug!(model = %self.model, chars = prompt.len(), "requesting summary");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": prompt }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SummarizerError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let body: ResponsesBody = response.json()?;
        let text: String = body
            .output
            .iter()
            .flat_map(|item| &item.content)
            .filter(|c| c.kind == "output_text")
            .map(|c| c.text.as_str())
            .collect();
        if text.trim().is_empty() {
            return Err(SummarizerError::Empty);
        }
        Ok(text)
    }
}

/// Pull a title and description out of a response.
///
/// The first brace-delimited block is tried as a JSON object; failing that,
/// `title:` and `description:` labeled lines are used. Returns `None` when
/// neither yields anything.
pub fn parse_metadata(text: &str) -> Option<GeneratedMetadata> {
    if let Some(parsed) = JSON_BLOCK
        .find(text)
        .and_then(|block| {
            serde_json::from_str::<serde_json::Value>(block.as_str()).ok()
        })
    {
        let field = |key: &str| match parsed.get(key) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let metadata = GeneratedMetadata {
            title: field("title"),
            description: field("description"),
        };
        if !metadata.title.is_empty() || !metadata.description.is_empty() {
            return Some(metadata);
        }
    }

    let labeled = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };
    let title = labeled(&TITLE_LINE);
    let description = labeled(&DESCRIPTION_LINE);
    if title.is_none() && description.is_none() {
        return None;
    }
    Some(GeneratedMetadata {
        title: title.unwrap_or_default(),
        description: description.unwrap_or_default(),
    })
}
