use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::{Map, Value};

use super::ID_FIELD;
use crate::error::{MonitorError, Result};

/// Minimal document store: JSON objects keyed by a string `_id`.
pub trait DocumentStore: Send + Sync {
    /// Returns the first document whose top-level fields equal every field of `filter`.
    fn find_one(&self, filter: &Value) -> Result<Option<Value>>;

    /// Stores a new document, assigning an `_id` when missing, and returns it.
    fn insert(&self, document: Value) -> Result<Value>;

    /// Replaces the document with `id`; returns `false` if there is none.
    fn update(&self, id: &str, document: Value) -> Result<bool>;

    /// Reclaims space used by superseded revisions.
    fn compact(&self) -> Result<()>;

    fn count(&self) -> Result<usize>;
}

fn matches_filter(document: &Value, filter: &Value) -> bool {
    match (document.as_object(), filter.as_object()) {
        (Some(fields), Some(wanted)) => wanted
            .iter()
            .all(|(key, value)| fields.get(key) == Some(value)),
        _ => false,
    }
}

fn with_id(document: Value, id: &str) -> Result<Value> {
    let Value::Object(mut fields) = document else {
        return Err(MonitorError::Store("Documents must be JSON objects".into()));
    };
    fields.insert(ID_FIELD.to_string(), Value::from(id));
    Ok(Value::Object(fields))
}

fn document_id(document: &Value) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Append-only newline-delimited JSON file.
///
/// Every insert or update appends the full document; on load a later line
/// supersedes earlier lines with the same `_id`. [`DocumentStore::compact`]
/// rewrites the file with one line per live document.
pub struct JsonFileStore {
    path: PathBuf,
    documents: Mutex<IndexMap<String, Value>>,
    sequence: AtomicU64,
}

impl JsonFileStore {
    /// Opens (or creates) the store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be read or created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut documents = IndexMap::new();
        if path.exists() {
            for (index, line) in fs::read_to_string(path)?.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(document) => match document_id(&document) {
                        Some(id) => {
                            documents.insert(id.to_string(), document);
                        }
                        None => warn!("Skipping document without id at {}:{}", path.display(), index + 1),
                    },
                    Err(e) => warn!("Skipping corrupt line {}:{}: {e}", path.display(), index + 1),
                }
            }
            debug!("Loaded {} documents from {}", documents.len(), path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            documents: Mutex::new(documents),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn documents(&self) -> MutexGuard<'_, IndexMap<String, Value>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{:x}{:04x}", Utc::now().timestamp_millis(), sequence)
    }

    fn append(&self, document: &Value) -> Result<()> {
        let mut line = serde_json::to_string(document)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl DocumentStore for JsonFileStore {
    fn find_one(&self, filter: &Value) -> Result<Option<Value>> {
        Ok(self
            .documents()
            .values()
            .find(|document| matches_filter(document, filter))
            .cloned())
    }

    fn insert(&self, document: Value) -> Result<Value> {
        let id = match document_id(&document) {
            Some(id) => id.to_string(),
            None => self.next_id(),
        };
        let document = with_id(document, &id)?;

        let mut documents = self.documents();
        self.append(&document)?;
        documents.insert(id, document.clone());
        Ok(document)
    }

    fn update(&self, id: &str, document: Value) -> Result<bool> {
        let mut documents = self.documents();
        if !documents.contains_key(id) {
            return Ok(false);
        }

        let document = with_id(document, id)?;
        self.append(&document)?;
        documents.insert(id.to_string(), document);
        Ok(true)
    }

    fn compact(&self) -> Result<()> {
        let documents = self.documents();

        let mut contents = String::new();
        for document in documents.values() {
            contents.push_str(&serde_json::to_string(document)?);
            contents.push('\n');
        }

        let staging = self.path.with_extension("compacting");
        fs::write(&staging, contents)?;
        fs::rename(&staging, &self.path)?;

        debug!("Compacted {} to {} documents", self.path.display(), documents.len());
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.documents().len())
    }
}

/// In-process store used where nothing needs to survive a restart.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<Vec<Value>>,
    sequence: AtomicU64,
}

impl MemoryStore {
    fn documents(&self) -> MutexGuard<'_, Vec<Value>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DocumentStore for MemoryStore {
    fn find_one(&self, filter: &Value) -> Result<Option<Value>> {
        Ok(self
            .documents()
            .iter()
            .find(|document| matches_filter(document, filter))
            .cloned())
    }

    fn insert(&self, document: Value) -> Result<Value> {
        let id = match document_id(&document) {
            Some(id) => id.to_string(),
            None => format!("mem-{}", self.sequence.fetch_add(1, Ordering::Relaxed)),
        };
        let document = with_id(document, &id)?;
        self.documents().push(document.clone());
        Ok(document)
    }

    fn update(&self, id: &str, document: Value) -> Result<bool> {
        let mut documents = self.documents();
        let Some(slot) = documents
            .iter_mut()
            .find(|existing| document_id(existing) == Some(id))
        else {
            return Ok(false);
        };
        *slot = with_id(document, id)?;
        Ok(true)
    }

    fn compact(&self) -> Result<()> {
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.documents().len())
    }
}

/// Empty filter: matches any document.
pub fn any_document() -> Value {
    Value::Object(Map::new())
}
