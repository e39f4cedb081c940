//! Serializable views of training and evaluation output.

use std::collections::BTreeMap;

use ctbnc_core::NodeKind;
use serde::Serialize;

use crate::pipeline::{metric_values, Evaluation, TrainedModel};

#[derive(Debug, Clone, Serialize)]
pub struct LearnReport {
    pub model: String,
    pub trajectories: usize,
    pub transitions: usize,
    pub nodes: Vec<NodeReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub kind: NodeKind,
    pub states: Vec<String>,
    pub parents: Vec<String>,
    /// One matrix per parent entry, in mixed-radix entry order.
    pub cims: Vec<Vec<Vec<f64>>>,
}

impl LearnReport {
    pub fn new(trained: &TrainedModel) -> Self {
        let model = &trained.model;
        let indexing = model.indexing();
        let nodes = model
            .nodes()
            .iter()
            .map(|node| NodeReport {
                name: node.name().to_string(),
                kind: node.kind(),
                states: node.states().to_vec(),
                parents: node
                    .parents()
                    .iter()
                    .filter_map(|&p| indexing.name_of(p).map(str::to_string))
                    .collect(),
                cims: node.cims().iter().map(|cim| cim.to_rows()).collect(),
            })
            .collect();
        Self {
            model: model.name().to_string(),
            trajectories: trained.learning.trajectories_used(),
            transitions: trained.learning.transitions_observed(),
            nodes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyReport {
    pub predictions: Vec<PredictionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub file: String,
    pub predicted: String,
    pub actual: Option<String>,
    /// Final class posterior, in class-state order.
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub labelled: usize,
    pub values: BTreeMap<String, f64>,
    /// `confusion[actual][predicted]`.
    pub confusion: Vec<Vec<usize>>,
}

impl ClassifyReport {
    pub fn new(evaluation: &Evaluation) -> Self {
        let class_states = evaluation.test.class_states().unwrap_or(&[]);
        let predictions = evaluation
            .results
            .iter()
            .zip(evaluation.test.names())
            .zip(evaluation.test.class_labels())
            .map(|((result, file), label)| PredictionReport {
                file: file.clone(),
                predicted: result.class_label().to_string(),
                actual: label.and_then(|i| class_states.get(i).cloned()),
                probabilities: result.final_probabilities().to_vec(),
            })
            .collect();
        let metrics = evaluation.metrics.as_ref().map(|m| MetricsReport {
            labelled: m.total(),
            values: metric_values(evaluation).into_iter().collect(),
            confusion: m.confusion_matrix().to_vec(),
        });
        Self {
            predictions,
            metrics,
        }
    }
}
