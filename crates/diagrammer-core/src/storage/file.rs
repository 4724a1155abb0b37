//! File-based storage implementation for native platforms.

use super::{BoxFuture, DocumentRecord, Storage, StorageError, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};

fn io_error(action: &str, path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Io(format!("cannot {action} {}: {err}", path.display()))
}

/// Stores each document as a JSON file named after its percent-encoded id,
/// so distinct ids never share a file.
#[derive(Debug)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `base_path`, creating the directory
    /// if needed.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        fs::create_dir_all(&base_path).map_err(|e| io_error("create", &base_path, e))?;
        Ok(Self { base_path })
    }

    /// Storage under the user's data directory.
    ///
    /// On Unix: `~/.local/share/diagrammer/documents/`
    /// On Windows: `%LOCALAPPDATA%\diagrammer\documents\`
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("no data or home directory".into()))?;
        Self::new(base.join("diagrammer").join("documents"))
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", urlencoding::encode(id)))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl Storage for FileStorage {
    fn save(&self, record: &DocumentRecord) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.document_path(&record.id);
        let json = record.to_json();
        Box::pin(async move {
            fs::write(&path, json?).map_err(|e| io_error("write", &path, e))
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<Option<DocumentRecord>>> {
        let path = self.document_path(id);
        Box::pin(async move {
            let json = match fs::read_to_string(&path) {
                Ok(json) => json,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(io_error("read", &path, e)),
            };
            DocumentRecord::from_json(&json).map(Some).map_err(|e| {
                StorageError::Serialization(format!("{}: {e}", path.display()))
            })
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.document_path(id);
        Box::pin(async move {
            match fs::remove_file(&path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_error("delete", &path, e)),
                _ => Ok(()),
            }
        })
    }

    /// Lists the ids decoded from the JSON file names.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        let base = self.base_path.clone();
        Box::pin(async move {
            let entries = match fs::read_dir(&base) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
                Err(e) => return Err(io_error("list", &base, e)),
            };

            let mut ids: Vec<String> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
                .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
                .filter_map(|stem| match urlencoding::decode(&stem) {
                    Ok(id) => Some(id.into_owned()),
                    Err(e) => {
                        log::warn!("Skipping document file {stem}.json: {e}");
                        None
                    }
                })
                .collect();
            ids.sort();
            Ok(ids)
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let path = self.document_path(id);
        Box::pin(async move { Ok(path.is_file()) })
    }
}
