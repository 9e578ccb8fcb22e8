mod document;
mod model;
mod store;

pub use document::{DocumentStore, JsonFileStore, MemoryStore};
pub use model::Settings;
pub use store::SettingsStore;

/// Key under which document stores keep a document's identity.
pub(crate) const ID_FIELD: &str = "_id";
