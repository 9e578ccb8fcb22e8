use serde::{Deserialize, Serialize};

use crate::monitor::Snapshot;
use crate::settings::Settings;
use crate::status::PipelineStatus;

/// Events pushed to subscribers.
///
/// On the wire: `{"event": "pipelines:updated", "payload": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    #[serde(rename = "pipelines:names")]
    PipelinesNames(Vec<String>),
    #[serde(rename = "pipelines:updated")]
    PipelinesUpdated(Vec<PipelineStatus>),
    #[serde(rename = "settings:updated")]
    SettingsUpdated(Settings),
    /// Sent only to the subscriber whose settings update could not be saved.
    #[serde(rename = "settings:error")]
    SettingsError(String),
}

impl Event {
    pub fn pipelines_updated(snapshot: &Snapshot) -> Self {
        Self::PipelinesUpdated(snapshot.values().cloned().collect())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PipelinesNames(_) => "pipelines:names",
            Self::PipelinesUpdated(_) => "pipelines:updated",
            Self::SettingsUpdated(_) => "settings:updated",
            Self::SettingsError(_) => "settings:error",
        }
    }
}

/// Requests sent by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "settings:update")]
    SettingsUpdate(Settings),
    #[serde(rename = "pipelines:get")]
    PipelinesGet,
}
