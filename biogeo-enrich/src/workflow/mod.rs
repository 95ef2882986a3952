//! Batch workflow: pipeline orchestration and run statistics

pub mod pipeline;
pub mod statistics;

pub use pipeline::{parse_input, BatchReport, PipelineOrchestrator};
pub use statistics::BatchSummary;
