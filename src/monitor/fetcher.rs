use std::sync::Arc;

use log::{debug, error};

use super::state::MonitorState;
use crate::gocd::{resolve_pipeline_status, GoCdClient};
use crate::status::PipelineStatus;

/// Fetches one pipeline's history and never fails: on error it answers with
/// the last status the snapshot holds for that pipeline.
pub struct HistoryFetcher {
    client: Arc<GoCdClient>,
    state: Arc<MonitorState>,
}

impl HistoryFetcher {
    pub fn new(client: Arc<GoCdClient>, state: Arc<MonitorState>) -> Self {
        Self { client, state }
    }

    /// Returns the fresh status of `name`, or the last known one on failure.
    ///
    /// `None` means there is no data for the pipeline yet.
    pub async fn fetch(&self, name: &str) -> Option<PipelineStatus> {
        match self.client.fetch_history(name).await {
            Ok(runs) => {
                debug!("Fetched {} runs of {name}", runs.len());
                resolve_pipeline_status(name, &runs)
            }
            Err(e) => {
                error!("Failed to fetch history of pipeline {name}: {e}");
                self.state.last_known(name)
            }
        }
    }
}
