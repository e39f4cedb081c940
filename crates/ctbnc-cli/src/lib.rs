//! Library half of the `ctbnc` binary: config loading, the train/evaluate
//! pipeline and JSON report types.

pub mod config;
pub mod pipeline;
pub mod report;

pub use config::CliConfig;
pub use pipeline::{evaluate, train, Evaluation, TrainedModel};
pub use report::{ClassifyReport, LearnReport};
