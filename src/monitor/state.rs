use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::status::PipelineStatus;

/// Latest status per pipeline, in pipeline-list order.
pub type Snapshot = IndexMap<String, PipelineStatus>;

/// Values shared between the aggregator and the subscriber registry.
///
/// Both are replaced as whole values; readers hold an `Arc` to whichever
/// version was current when they looked.
#[derive(Default)]
pub struct MonitorState {
    snapshot: RwLock<Arc<Snapshot>>,
    names: RwLock<Arc<Vec<String>>>,
}

impl MonitorState {
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace_snapshot(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        snapshot
    }

    pub fn pipeline_names(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.names.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_pipeline_names(&self, names: Vec<String>) {
        *self.names.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(names);
    }

    /// Last known status of `name`, if any cycle produced one.
    pub fn last_known(&self, name: &str) -> Option<PipelineStatus> {
        self.snapshot().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::BuildStatus;

    fn status(name: &str, counter: u64) -> PipelineStatus {
        PipelineStatus {
            name: name.to_string(),
            status: BuildStatus::Passed,
            health: 0,
            buildtime: 0,
            author: "Unknown".to_string(),
            counter,
            stage_results: vec![],
        }
    }

    #[test]
    fn test_readers_keep_their_version_across_swaps() {
        let state = MonitorState::default();
        state.replace_snapshot(Snapshot::from([("a".to_string(), status("a", 1))]));

        let before = state.snapshot();
        state.replace_snapshot(Snapshot::from([("a".to_string(), status("a", 2))]));

        assert_eq!(before["a"].counter, 1);
        assert_eq!(state.snapshot()["a"].counter, 2);
        assert_eq!(state.last_known("a").unwrap().counter, 2);
        assert!(state.last_known("b").is_none());
    }

    #[test]
    fn test_pipeline_names_start_empty() {
        let state = MonitorState::default();
        assert!(state.pipeline_names().is_empty());

        state.set_pipeline_names(vec!["build".into()]);
        assert_eq!(*state.pipeline_names(), vec!["build".to_string()]);
    }
}
