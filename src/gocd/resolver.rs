//! Turns a pipeline's raw run history into one [`PipelineStatus`].
//!
//! The resolver is pure: it never fails for structurally valid input and
//! degrades malformed stage or job lists to `unknown` and zero values.

use super::types::{PipelineRun, RawJob, RawStage};
use crate::status::{BuildStatus, JobResult, PipelineStatus, StageResult};

/// Maximum number of runs considered per pipeline.
pub const HISTORY_DEPTH: usize = 5;

const UNKNOWN_AUTHOR: &str = "Unknown";

/// Author names GoCD uses for automated or anonymous triggers.
const NON_PERSON_AUTHORS: [&str; 5] = ["", "Unknown", "changes", "anonymous", "timer"];

/// Resolves the status of `name` from its runs, newest first.
///
/// Returns `None` when there are no runs yet.
pub fn resolve_pipeline_status(name: &str, runs: &[PipelineRun]) -> Option<PipelineStatus> {
    let runs = &runs[..runs.len().min(HISTORY_DEPTH)];
    let latest = runs.first()?;

    Some(PipelineStatus {
        name: name.to_string(),
        status: resolve_run_status(latest),
        health: runs.iter().filter(|run| run.has_failed_stage()).count(),
        buildtime: latest_schedule_time(latest),
        author: resolve_author(latest),
        counter: latest.counter,
        stage_results: latest.stages.iter().map(resolve_stage).collect(),
    })
}

fn resolve_stage(stage: &RawStage) -> StageResult {
    StageResult {
        name: stage.name.clone().unwrap_or_default(),
        counter: stage.counter,
        status: resolve_stage_status(stage),
        job_results: stage.jobs.iter().map(resolve_job).collect(),
    }
}

fn resolve_job(job: &RawJob) -> JobResult {
    JobResult {
        name: job.name.clone().unwrap_or_default(),
        state: job.job_state(),
        scheduled_at: job.scheduled_date,
    }
}

fn resolve_stage_status(stage: &RawStage) -> BuildStatus {
    if stage.result_is("Cancelled") {
        BuildStatus::Cancelled
    } else if stage.has_job_in_progress() {
        BuildStatus::Building
    } else {
        stage
            .result
            .as_deref()
            .map_or(BuildStatus::Unknown, BuildStatus::from_result)
    }
}

fn resolve_run_status(run: &PipelineRun) -> BuildStatus {
    if run.stages.is_empty() {
        return BuildStatus::Unknown;
    }

    if run.stages.iter().any(RawStage::has_job_in_progress) {
        BuildStatus::Building
    } else if run.stages.iter().all(|stage| !stage.can_run) {
        BuildStatus::Paused
    } else if run.has_failed_stage() {
        BuildStatus::Failed
    } else {
        BuildStatus::Passed
    }
}

fn latest_schedule_time(run: &PipelineRun) -> i64 {
    run.stages
        .iter()
        .flat_map(|stage| &stage.jobs)
        .map(|job| job.scheduled_date)
        .max()
        .unwrap_or(0)
}

/// First committer of the run, then the build approver, then the first
/// stage approver; automated triggers never count as an author.
fn resolve_author(run: &PipelineRun) -> String {
    let cause = run.build_cause.as_ref();

    let committer = cause
        .and_then(|cause| cause.material_revisions.first())
        .and_then(|revision| revision.modifications.first())
        .and_then(|modification| modification.user_name.as_deref())
        .map(strip_email);

    let approver = cause.and_then(|cause| cause.approver.as_deref());

    let stage_approver = run
        .stages
        .iter()
        .filter_map(|stage| stage.approved_by.as_deref())
        .find(|name| is_person(name));

    [committer, approver, stage_approver]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| is_person(name))
        .map_or_else(|| UNKNOWN_AUTHOR.to_string(), ToString::to_string)
}

/// "Jane Doe <jane@x.com>" -> "Jane Doe"
fn strip_email(user_name: &str) -> &str {
    user_name
        .split_once('<')
        .map_or(user_name, |(name, _)| name)
        .trim()
}

fn is_person(name: &str) -> bool {
    !NON_PERSON_AUTHORS.contains(&name.trim())
}
