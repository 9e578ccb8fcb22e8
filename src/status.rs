use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized status shared by stages and pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Building,
    Paused,
    Failed,
    Passed,
    Cancelled,
    #[default]
    Unknown,
}

impl BuildStatus {
    /// Maps an upstream result field ("Passed", "Failed", ...) case-insensitively.
    pub fn from_result(result: &str) -> Self {
        match result.to_lowercase().as_str() {
            "building" => Self::Building,
            "paused" => Self::Paused,
            "failed" => Self::Failed,
            "passed" => Self::Passed,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

/// Lifecycle state of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobState {
    Scheduled,
    Assigned,
    Preparing,
    Building,
    Completing,
    Passed,
    Failed,
    Cancelled,
    #[default]
    Unknown,
}

impl JobState {
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::Scheduled | Self::Assigned | Self::Preparing | Self::Building | Self::Completing
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub name: String,
    pub state: JobState,
    /// Epoch milliseconds
    pub scheduled_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub name: String,
    pub counter: u64,
    pub status: BuildStatus,
    pub job_results: Vec<JobResult>,
}

/// Normalized view of one pipeline, rebuilt from scratch on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub name: String,
    pub status: BuildStatus,
    /// Failed runs among the fetched history
    pub health: usize,
    /// Latest job schedule time of the newest run, epoch milliseconds
    pub buildtime: i64,
    pub author: String,
    pub counter: u64,
    pub stage_results: Vec<StageResult>,
}

/// One-shot report printed by the `status` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusReport {
    pub server: String,
    pub collected_at: DateTime<Utc>,
    pub total_pipelines: usize,
    pub pipelines: Vec<PipelineStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_status_from_result_is_case_insensitive() {
        assert_eq!(BuildStatus::from_result("Passed"), BuildStatus::Passed);
        assert_eq!(BuildStatus::from_result("FAILED"), BuildStatus::Failed);
        assert_eq!(BuildStatus::from_result("cancelled"), BuildStatus::Cancelled);
        assert_eq!(BuildStatus::from_result("Unknown"), BuildStatus::Unknown);
        assert_eq!(BuildStatus::from_result("Rescheduled"), BuildStatus::Unknown);
    }

    #[test]
    fn test_in_progress_job_states() {
        assert!(JobState::Scheduled.is_in_progress());
        assert!(JobState::Building.is_in_progress());
        assert!(JobState::Completing.is_in_progress());
        assert!(!JobState::Passed.is_in_progress());
        assert!(!JobState::Unknown.is_in_progress());
    }

    #[test]
    fn test_pipeline_status_serializes_camel_case() {
        let status = PipelineStatus {
            name: "deploy".to_string(),
            status: BuildStatus::Building,
            health: 1,
            buildtime: 300,
            author: "Jane Doe".to_string(),
            counter: 42,
            stage_results: vec![StageResult {
                name: "build".to_string(),
                counter: 1,
                status: BuildStatus::Building,
                job_results: vec![JobResult {
                    name: "compile".to_string(),
                    state: JobState::Building,
                    scheduled_at: 300,
                }],
            }],
        };

        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["status"], "building");
        assert_eq!(json["stageResults"][0]["jobResults"][0]["scheduledAt"], 300);
        assert_eq!(json["stageResults"][0]["jobResults"][0]["state"], "Building");
    }
}
