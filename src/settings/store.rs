use log::{debug, warn};

use super::document::{any_document, DocumentStore};
use super::model::Settings;
use super::ID_FIELD;
use crate::error::Result;

/// Keeps exactly one settings record in the backing document store.
pub struct SettingsStore {
    store: Box<dyn DocumentStore>,
}

impl SettingsStore {
    pub fn new(store: Box<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Returns the stored settings, or `None` when nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds an invalid record.
    pub fn get(&self) -> Result<Option<Settings>> {
        self.store
            .find_one(&any_document())?
            .map(Settings::from_document)
            .transpose()
    }

    /// Like [`get`](Self::get), but falls back to defaults on absence or failure.
    pub fn load_or_default(&self) -> Settings {
        match self.get() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                debug!("No stored settings, using defaults");
                Settings::default()
            }
            Err(e) => {
                warn!("Failed to read settings, using defaults: {e}");
                Settings::default()
            }
        }
    }

    /// Overwrites the stored record wholesale, inserting it if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or the compaction fails.
    pub fn save(&self, settings: &Settings) -> Result<Settings> {
        let settings = settings.clone().normalized();
        let document = serde_json::to_value(&settings)?;

        let existing_id = match self.store.find_one(&any_document()) {
            Ok(existing) => existing.and_then(|document| {
                document
                    .get(ID_FIELD)
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string)
            }),
            Err(e) => {
                warn!("Settings lookup failed, inserting a new record: {e}");
                None
            }
        };

        let updated = match existing_id {
            Some(id) => self.store.update(&id, document.clone())?,
            None => false,
        };
        if !updated {
            self.store.insert(document)?;
        }

        self.store.compact()?;
        debug!("Settings saved");

        Ok(settings)
    }
}
