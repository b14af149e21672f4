//! Category-tagged document loading.
//!
//! Every immediate subdirectory of the root is a category; every matching file
//! below it (recursively) becomes a [`Document`] tagged with that category and
//! its file metadata. A category with an unreadable file is skipped as a whole.

use chrono::{DateTime, Local};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{keys, Document, Meta, MetaValue};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub struct DocumentLoader {
    root: PathBuf,
    extension: String,
}

impl DocumentLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), extension: "txt".to_string() }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Load all documents under the root. Order of the result is unspecified.
    ///
    /// Fails with [`Error::NotFound`] if the root does not exist. An empty
    /// result is not an error.
    pub fn load(&self) -> Result<Vec<Document>> {
        if !self.root.exists() {
            return Err(Error::NotFound(format!("The specified path '{}' does not exist.", self.root.display())));
        }
        let mut documents = Vec::new();
        for (category, category_path) in self.category_dirs()? {
            match self.load_category(&category, &category_path) {
                Ok(docs) => {
                    debug!(category = %category, count = docs.len(), "loaded category");
                    documents.extend(docs);
                }
                Err(e) => warn!(category = %category, path = %category_path.display(), error = %e, "skipping category"),
            }
        }
        if documents.is_empty() {
            warn!(root = %self.root.display(), "No documents loaded.");
        } else {
            info!(root = %self.root.display(), count = documents.len(), "loaded documents");
        }
        Ok(documents)
    }

    fn category_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() { continue; }
            let name = entry.file_name().to_string_lossy().to_string();
            dirs.push((name, entry.path()));
        }
        dirs.sort();
        Ok(dirs)
    }

    fn load_category(&self, category: &str, dir: &Path) -> Result<Vec<Document>> {
        let files = self.list_files(dir)?;
        files.par_iter().map(|path| read_document(path, category)).collect()
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|e| Error::Operation(format!("failed to walk {}: {}", dir.display(), e)))?;
            if !entry.file_type().is_file() { continue; }
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some(self.extension.as_str()) {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }
}

fn read_document(path: &Path, category: &str) -> Result<Document> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Operation(format!("failed to read {}: {}", path.display(), e)))?;
    Document::new(content, file_metadata(path, category)?)
}

/// `source`, `path`, `category`, `created` and `modified` for a file on disk.
/// Falls back to the modification time where the platform has no creation time.
pub fn file_metadata(path: &Path, category: &str) -> Result<Meta> {
    let stat = fs::metadata(path)?;
    let modified = stat.modified()?;
    let created = stat.created().unwrap_or(modified);
    let source = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

    let mut meta = Meta::new();
    meta.insert(keys::SOURCE.to_string(), MetaValue::from(source));
    meta.insert(keys::PATH.to_string(), MetaValue::from(path.to_string_lossy().to_string()));
    meta.insert(keys::CATEGORY.to_string(), MetaValue::from(category));
    meta.insert(keys::CREATED.to_string(), MetaValue::from(format_timestamp(created)));
    meta.insert(keys::MODIFIED.to_string(), MetaValue::from(format_timestamp(modified)));
    Ok(meta)
}

fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_iso_like() {
        let ts = format_timestamp(SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(1_500));
        assert_eq!(ts.len(), "1970-01-01T00:00:01.500000".len());
        assert!(ts.ends_with(".500000"));
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn extension_is_normalised() {
        let loader = DocumentLoader::new("/tmp").with_extension(".md");
        assert_eq!(loader.extension, "md");
    }
}
