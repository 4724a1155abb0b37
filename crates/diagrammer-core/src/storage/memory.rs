//! In-memory storage implementation.

use super::{BoxFuture, DocumentRecord, Storage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;

type Documents = HashMap<String, DocumentRecord>;

/// Process-local storage; contents vanish with the value.
///
/// The engine's default backend, also handy in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: RwLock<Documents>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Documents) -> T) -> StorageResult<T> {
        let documents = self.documents.read().map_err(|e| poisoned(&e))?;
        Ok(f(&documents))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Documents) -> T) -> StorageResult<T> {
        let mut documents = self.documents.write().map_err(|e| poisoned(&e))?;
        Ok(f(&mut documents))
    }
}

fn poisoned(err: &dyn std::fmt::Display) -> StorageError {
    StorageError::Other(format!("document map poisoned: {err}"))
}

impl Storage for MemoryStorage {
    fn save(&self, record: &DocumentRecord) -> BoxFuture<'_, StorageResult<()>> {
        let record = record.clone();
        Box::pin(async move {
            self.write(|documents| {
                documents.insert(record.id.clone(), record);
            })
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<Option<DocumentRecord>>> {
        let result = self.read(|documents| documents.get(id).cloned());
        Box::pin(async move { result })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let result = self.write(|documents| {
            documents.remove(id);
        });
        Box::pin(async move { result })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            self.read(|documents| {
                let mut ids: Vec<String> = documents.keys().cloned().collect();
                ids.sort();
                ids
            })
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let result = self.read(|documents| documents.contains_key(id));
        Box::pin(async move { result })
    }
}
