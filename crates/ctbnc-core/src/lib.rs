//! # CTBNC Core
//!
//! Continuous-time Bayesian network classifiers: model representation,
//! maximum-likelihood parameter learning, trajectory classification and
//! simulation.

pub mod engine;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use engine::cim::Cim;
pub use engine::classify::{
    ClassificationResult, Classifier, ClassifierConfig, DecisionRule, QueryTimes,
    ThresholdDecider,
};
pub use engine::errors::CtbnError;
pub use engine::evidence::EvidenceContext;
pub use engine::indexing::{IndexingRegistry, NodeId, NodeIndexing};
pub use engine::learning::{LearningConfig, LearningResult, MleLearner, ParameterLearner};
pub use engine::model::{AdjacencyMatrix, CtbnModel};
pub use engine::node::{CtNode, NodeKind};
pub use engine::sampling::{sample_trajectory, TrajectorySampler};
pub use engine::trajectory::{DenseTrajectory, Trajectory, Transition};
pub use metrics::ClassificationMetrics;
pub use storage::{load_csv_dataset, CsvLayout, Dataset};
