//! IndexedDB storage implementation for WebAssembly.
//!
//! One object store, `documents`, maps document ids to the record's JSON
//! text.

use super::{BoxFuture, DocumentRecord, Storage, StorageError, StorageResult};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{IdbDatabase, IdbObjectStore, IdbRequest, IdbTransactionMode};

const DATABASE: &str = "diagrammer";
const SCHEMA_VERSION: u32 = 1;
const DOCUMENTS: &str = "documents";

fn js_error(context: &str, value: JsValue) -> StorageError {
    StorageError::Other(format!("{context}: {value:?}"))
}

/// Documents in the browser's IndexedDB.
///
/// Not Send/Sync: IndexedDB handles live on the main thread.
#[derive(Debug, Default)]
pub struct IndexedDbStorage {
    /// Opened on first use and reused afterwards.
    connection: Rc<RefCell<Option<IdbDatabase>>>,
}

impl IndexedDbStorage {
    pub fn new() -> Self {
        Self::default()
    }

    async fn connection(&self) -> StorageResult<IdbDatabase> {
        if let Some(db) = self.connection.borrow().as_ref() {
            return Ok(db.clone());
        }

        let factory = web_sys::window()
            .ok_or_else(|| StorageError::Other("no window object".into()))?
            .indexed_db()
            .map_err(|e| js_error("IndexedDB unavailable", e))?
            .ok_or_else(|| StorageError::Other("IndexedDB unavailable".into()))?;
        let request = factory
            .open_with_u32(DATABASE, SCHEMA_VERSION)
            .map_err(|e| js_error("cannot open database", e))?;

        let on_upgrade = Closure::once(Box::new(create_schema) as Box<dyn FnOnce(_)>);
        request.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));
        on_upgrade.forget();

        let db: IdbDatabase = settle(&request).await?;
        self.connection.replace(Some(db.clone()));
        log::debug!("Opened IndexedDB database {}", DATABASE);
        Ok(db)
    }

    async fn documents(&self, mode: IdbTransactionMode) -> StorageResult<IdbObjectStore> {
        let db = self.connection().await?;
        db.transaction_with_str_and_mode(DOCUMENTS, mode)
            .and_then(|tx| tx.object_store(DOCUMENTS))
            .map_err(|e| js_error("cannot open document store", e))
    }
}

fn create_schema(event: web_sys::IdbVersionChangeEvent) {
    let db = event
        .target()
        .and_then(|target| target.dyn_into::<IdbRequest>().ok())
        .and_then(|request| request.result().ok())
        .and_then(|result| result.dyn_into::<IdbDatabase>().ok());
    match db {
        Some(db) if !db.object_store_names().contains(DOCUMENTS) => {
            if let Err(e) = db.create_object_store(DOCUMENTS) {
                log::error!("Cannot create document store: {:?}", e);
            }
        }
        Some(_) => {}
        None => log::error!("IndexedDB upgrade fired without a database"),
    }
}

impl Storage for IndexedDbStorage {
    fn save(&self, record: &DocumentRecord) -> BoxFuture<'_, StorageResult<()>> {
        let key = JsValue::from_str(&record.id);
        let json = record.to_json();
        Box::pin(async move {
            let value = JsValue::from_str(&json?);
            let store = self.documents(IdbTransactionMode::Readwrite).await?;
            let request = store
                .put_with_key(&value, &key)
                .map_err(|e| js_error("put failed", e))?;
            settle::<JsValue>(&request).await.map(drop)
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<Option<DocumentRecord>>> {
        let key = JsValue::from_str(id);
        Box::pin(async move {
            let store = self.documents(IdbTransactionMode::Readonly).await?;
            let request = store.get(&key).map_err(|e| js_error("get failed", e))?;
            let stored: JsValue = settle(&request).await?;
            if stored.is_undefined() || stored.is_null() {
                return Ok(None);
            }
            match stored.as_string() {
                Some(json) => DocumentRecord::from_json(&json).map(Some),
                None => Err(StorageError::Serialization("stored value is not text".into())),
            }
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let key = JsValue::from_str(id);
        Box::pin(async move {
            let store = self.documents(IdbTransactionMode::Readwrite).await?;
            let request = store.delete(&key).map_err(|e| js_error("delete failed", e))?;
            settle::<JsValue>(&request).await.map(drop)
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let store = self.documents(IdbTransactionMode::Readonly).await?;
            let request = store
                .get_all_keys()
                .map_err(|e| js_error("key listing failed", e))?;
            let keys: js_sys::Array = settle(&request).await?;
            let mut ids: Vec<String> = keys.iter().filter_map(|key| key.as_string()).collect();
            ids.sort();
            Ok(ids)
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let key = JsValue::from_str(id);
        Box::pin(async move {
            let store = self.documents(IdbTransactionMode::Readonly).await?;
            let request = store
                .count_with_key(&key)
                .map_err(|e| js_error("count failed", e))?;
            let count: JsValue = settle(&request).await?;
            Ok(count.as_f64().is_some_and(|n| n > 0.0))
        })
    }
}

/// Resolve once `request` fires `success` (or fail on `error`).
async fn settle<T: JsCast>(request: &IdbRequest) -> StorageResult<T> {
    let promise = js_sys::Promise::new(&mut |resolve, reject| {
        let on_success = Closure::once(Box::new(move |event: web_sys::Event| {
            let result = event
                .target()
                .and_then(|target| target.dyn_into::<IdbRequest>().ok())
                .and_then(|request| request.result().ok())
                .unwrap_or(JsValue::UNDEFINED);
            if let Err(e) = resolve.call1(&JsValue::NULL, &result) {
                log::error!("Cannot resolve IndexedDB request: {:?}", e);
            }
        }) as Box<dyn FnOnce(_)>);
        let on_error = Closure::once(Box::new(move |_: web_sys::Event| {
            if let Err(e) = reject.call1(&JsValue::NULL, &JsValue::from_str("request failed")) {
                log::error!("Cannot reject IndexedDB request: {:?}", e);
            }
        }) as Box<dyn FnOnce(_)>);

        request.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        request.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        on_success.forget();
        on_error.forget();
    });

    let value = JsFuture::from(promise)
        .await
        .map_err(|e| js_error("IndexedDB request failed", e))?;
    value
        .dyn_into::<T>()
        .map_err(|_| StorageError::Other("unexpected IndexedDB result type".into()))
}
