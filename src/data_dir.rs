use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    record_store::RecordStore,
};

/// The storage root and the fixed layout below it.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir or THEDOCS_DATA_DIR)
    /// 2. The XDG data directory (~/.local/share/thedocs/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else {
            xdg::BaseDirectories::with_prefix("thedocs")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    /// Create every directory of the layout and an empty index table if
    /// none exists yet. The table is created under the store lock.
    pub fn ensure_layout(&self) -> Result<()> {
        let dirs =
            [self.markdown_dir(), self.database_dir(), self.prompts_dir()];
        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|_| Error::DataDir(dir))?;
        }
        RecordStore::open(self).ensure_table()?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn markdown_dir(&self) -> PathBuf {
        self.root.join("markdown_files")
    }

    pub fn database_dir(&self) -> PathBuf {
        self.root.join("database")
    }

    pub fn index_table(&self) -> PathBuf {
        self.database_dir().join("index.csv")
    }

    pub fn index_lock(&self) -> PathBuf {
        self.database_dir().join("index.csv.lock")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.root.join("prompts")
    }

    pub fn summarize_prompt(&self) -> PathBuf {
        self.prompts_dir().join("summarize_markdown.md")
    }

    pub fn tantivy_dir(&self) -> Result<PathBuf> {
        let path = self.root.join("tantivy");
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }
}
