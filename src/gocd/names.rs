use indexmap::IndexSet;
use regex::Regex;

use crate::error::{MonitorError, Result};

/// Every pipeline in `pipelines.xml` links to its own stages feed.
const STAGES_FEED_PATTERN: &str = r#"go/api/pipelines/([^/"'<>\s]+)/stages\.xml"#;

/// Extracts pipeline names from the pipelines listing, keeping first-seen order.
pub fn extract_pipeline_names(listing: &str) -> Result<Vec<String>> {
    let pattern = Regex::new(STAGES_FEED_PATTERN)
        .map_err(|e| MonitorError::Config(format!("Invalid pipeline name pattern: {e}")))?;

    let names: IndexSet<String> = pattern
        .captures_iter(listing)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str().to_string())
        .collect();

    Ok(names.into_iter().collect())
}
