//! Raw shapes of the GoCD pipeline history API.
//!
//! Every field tolerates being absent or `null` so that one odd record
//! degrades to zero values instead of failing the whole history.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::status::JobState;

/// Body of `GET /go/api/pipelines/{name}/history`.
#[derive(Debug, Default, Deserialize)]
pub struct PipelineHistory {
    #[serde(default, deserialize_with = "nullable")]
    pub pipelines: Vec<PipelineRun>,
}

/// One historical run of a pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineRun {
    #[serde(deserialize_with = "lenient_u64")]
    pub counter: u64,
    #[serde(deserialize_with = "nullable")]
    pub stages: Vec<RawStage>,
    pub build_cause: Option<BuildCause>,
}

impl PipelineRun {
    pub fn has_failed_stage(&self) -> bool {
        self.stages.iter().any(RawStage::is_failed)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildCause {
    pub approver: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub material_revisions: Vec<MaterialRevision>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MaterialRevision {
    #[serde(deserialize_with = "nullable")]
    pub modifications: Vec<Modification>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Modification {
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStage {
    pub name: Option<String>,
    /// GoCD reports stage counters as strings, older servers as numbers.
    #[serde(deserialize_with = "lenient_u64")]
    pub counter: u64,
    pub result: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub can_run: bool,
    pub approved_by: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub jobs: Vec<RawJob>,
}

impl RawStage {
    pub fn result_is(&self, expected: &str) -> bool {
        self.result
            .as_deref()
            .is_some_and(|result| result.eq_ignore_ascii_case(expected))
    }

    pub fn is_failed(&self) -> bool {
        self.result_is("Failed")
    }

    pub fn has_job_in_progress(&self) -> bool {
        self.jobs.iter().any(|job| job.job_state().is_in_progress())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawJob {
    pub name: Option<String>,
    pub state: Option<String>,
    pub result: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub scheduled_date: i64,
}

impl RawJob {
    /// In-progress states are reported as-is; a completed job reports its result.
    pub fn job_state(&self) -> JobState {
        match self.state.as_deref().unwrap_or_default() {
            "Scheduled" => JobState::Scheduled,
            "Assigned" => JobState::Assigned,
            "Preparing" => JobState::Preparing,
            "Building" => JobState::Building,
            "Completing" => JobState::Completing,
            "Completed" => match self.result.as_deref().unwrap_or_default() {
                "Passed" => JobState::Passed,
                "Failed" => JobState::Failed,
                "Cancelled" => JobState::Cancelled,
                _ => JobState::Unknown,
            },
            _ => JobState::Unknown,
        }
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_u64().unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64))
            .unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    })
}
