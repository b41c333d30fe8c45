use std::{
    fs::OpenOptions,
    io::{ErrorKind, Write},
    path::{Component, Path, PathBuf},
};

use tracing::debug;

use crate::error::{Error, Result};

/// File extensions accepted for documents, lower-case.
pub const ALLOWED_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Stem used when sanitizing leaves nothing behind.
const PLACEHOLDER_STEM: &str = "document";

/// Flat directory of markdown files referenced by the record store.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `bytes` under the sanitized form of `original_name`, returning
    /// the final filename.
    ///
    /// On collision `-1`, `-2`, ... is appended to the stem. The existence
    /// check and the create are one `create_new` open, so concurrent saves of
    /// the same name always land in distinct files.
    pub fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        let (stem, ext) = sanitize(original_name)?;
        std::fs::create_dir_all(&self.root)?;

        let mut attempt = 0u32;
        loop {
            let filename = if attempt == 0 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}-{attempt}.{ext}")
            };
            let path = self.root.join(&filename);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let written =
                        file.write_all(bytes).and_then(|()| file.sync_all());
                    if let Err(e) = written {
                        let _ = std::fs::remove_file(&path);
                        return Err(e.into());
                    }
                    debug!(
                        original = original_name,
                        %filename,
                        "saved document"
                    );
                    return Ok(filename);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove `filename`. Returns whether a file was present.
    pub fn delete(&self, filename: &str) -> Result<bool> {
        let path = self.resolve(filename)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All document files directly under the root, sorted by name. A missing
    /// root is an empty repository.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string)
            else {
                continue;
            };
            if name.starts_with('.') || !is_supported(Path::new(&name)) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.resolve(filename).is_ok_and(|path| path.is_file())
    }

    /// Read a document as text, replacing invalid UTF-8.
    pub fn read(&self, filename: &str) -> Result<String> {
        let path = self.resolve(filename)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::not_found("file", filename))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Map a stored filename to its path under the root.
    ///
    /// Anything other than a single normal path component is rejected, and
    /// an existing file must canonicalize to a location inside the root.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let invalid = || Error::InvalidPath(filename.to_string());

        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(invalid()),
        }
        if filename.contains(['/', '\\']) {
            return Err(invalid());
        }

        let path = self.root.join(filename);
        if path.exists() {
            let root = self.root.canonicalize()?;
            let resolved = path.canonicalize()?;
            if !resolved.starts_with(&root) {
                return Err(invalid());
            }
        }
        Ok(path)
    }
}

/// Sanitize a caller-supplied name into the filename it would be stored
/// under before collision handling.
///
/// ```
/// use thedocs::repository::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../My Report!.MD").unwrap(), "my_report.md");
/// assert!(sanitize_filename("notes.txt").is_err());
/// ```
pub fn sanitize_filename(original_name: &str) -> Result<String> {
    let (stem, ext) = sanitize(original_name)?;
    Ok(format!("{stem}.{ext}"))
}

fn sanitize(original_name: &str) -> Result<(String, String)> {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            (stem, ext.to_ascii_lowercase())
        }
        _ => return Err(Error::UnsupportedType(original_name.to_string())),
    };
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(Error::UnsupportedType(original_name.to_string()));
    }

    let mut cleaned = String::with_capacity(stem.len());
    let mut in_run = false;
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            cleaned.push(c.to_ascii_lowercase());
            in_run = false;
        } else if !in_run {
            cleaned.push('_');
            in_run = true;
        }
    }
    let cleaned = cleaned.trim_matches('_');
    let stem = if cleaned.is_empty() {
        PLACEHOLDER_STEM.to_string()
    } else {
        cleaned.to_string()
    };
    Ok((stem, ext))
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        })
}
