use serde::Serialize;

/// Column order of the persisted index table.
pub const COLUMNS: [&str; 6] = [
    "filename",
    "title",
    "description",
    "is_public",
    "date_uploaded",
    "updated_at",
];

/// Metadata kept for every uploaded or synced document, keyed by filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub filename: String,
    pub title: String,
    pub description: String,
    pub is_public: bool,
    /// Calendar date, `YYYY-MM-DD`.
    pub date_uploaded: String,
    /// Timestamp of the last mutation, `YYYY-MM-DD HH:MM:SS`.
    pub updated_at: String,
}

impl DocumentRecord {
    /// Build a fresh record stamped with the current time. A missing upload
    /// date defaults to today.
    pub fn new(
        filename: &str,
        title: &str,
        description: &str,
        is_public: bool,
        date_uploaded: Option<&str>,
    ) -> Self {
        Self {
            filename: filename.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            is_public,
            date_uploaded: date_uploaded
                .map(str::to_string)
                .unwrap_or_else(today),
            updated_at: timestamp(),
        }
    }

    /// Whether the record still lacks a title or a description.
    pub fn is_missing_metadata(&self) -> bool {
        self.title.is_empty() || self.description.is_empty()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = timestamp();
    }

    pub(crate) fn to_row(&self) -> [&str; 6] {
        [
            &self.filename,
            &self.title,
            &self.description,
            format_bool(self.is_public),
            &self.date_uploaded,
            &self.updated_at,
        ]
    }
}

/// A partial metadata change. `None` leaves the field untouched, and so does
/// an empty string: a stored value is never cleared through an update.
///
/// ```
/// use thedocs::record::MetadataUpdate;
///
/// let update = MetadataUpdate::title("Quarterly report");
/// assert_eq!(update.title.as_deref(), Some("Quarterly report"));
/// assert!(update.description.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl MetadataUpdate {
    pub fn title(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            description: None,
        }
    }

    pub fn description(description: &str) -> Self {
        Self {
            title: None,
            description: Some(description.to_string()),
        }
    }

    /// True when applying this update would change nothing.
    pub fn is_empty(&self) -> bool {
        non_empty(&self.title).is_none()
            && non_empty(&self.description).is_none()
    }

    /// Apply the provided non-empty fields to `record` and refresh its
    /// `updated_at`.
    pub(crate) fn apply_to(&self, record: &mut DocumentRecord) {
        if let Some(title) = non_empty(&self.title) {
            record.title = title.to_string();
        }
        if let Some(description) = non_empty(&self.description) {
            record.description = description.to_string();
        }
        record.touch();
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

pub fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn format_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Parse a persisted boolean. Blank or unrecognised tokens fall back to
/// `default`.
pub(crate) fn parse_bool(value: Option<&str>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => true,
        "false" | "0" | "no" | "n" => false,
        _ => default,
    }
}
