pub mod cluster;
pub mod config;
pub mod distance;
pub mod features;
pub mod pipeline;
pub mod preprocess;
pub mod report;

pub use config::{Config, RunMode};
pub use pipeline::{run_dedupe, RunSummary};
