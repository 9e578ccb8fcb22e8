mod client;
mod names;
mod resolver;
mod types;

pub use client::GoCdClient;
pub use resolver::{resolve_pipeline_status, HISTORY_DEPTH};
