mod aggregator;
mod fetcher;
mod state;

pub use aggregator::PollingAggregator;
pub use state::{MonitorState, Snapshot};
