use std::sync::LazyLock;

use regex::Regex;

static PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)""#).expect("phrase pattern is a valid regex")
});

/// A search query after the quoted-phrase check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedQuery {
    /// The first double-quoted substring, matched as one contiguous run.
    Phrase(String),
    /// Whitespace-separated tokens, all required.
    Terms(Vec<String>),
}

impl ParsedQuery {
    pub fn parse(query: &str) -> Self {
        if let Some(phrase) = PHRASE
            .captures(query)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|p| !p.is_empty())
        {
            return Self::Phrase(phrase.to_string());
        }
        Self::Terms(query.split_whitespace().map(str::to_string).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Phrase(phrase) => phrase.is_empty(),
            Self::Terms(tokens) => tokens.is_empty(),
        }
    }

    /// Strings whose occurrences should be highlighted.
    pub fn needles(&self) -> Vec<String> {
        match self {
            Self::Phrase(phrase) => vec![phrase.clone()],
            Self::Terms(tokens) => tokens.clone(),
        }
    }
}

/// The single term the fallback scanner looks for: the quoted phrase if
/// there is one, else the whole trimmed query.
pub fn scan_term(query: &str) -> String {
    match ParsedQuery::parse(query) {
        ParsedQuery::Phrase(phrase) => phrase,
        ParsedQuery::Terms(_) => query.trim().to_string(),
    }
}
