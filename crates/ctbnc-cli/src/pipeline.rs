//! Train and evaluate steps shared by the `learn` and `classify` commands.

use std::sync::Arc;

use ctbnc_core::metrics::MetricRegistry;
use ctbnc_core::{
    load_csv_dataset, ClassificationMetrics, ClassificationResult, Classifier, CtbnError,
    CtbnModel, Dataset, IndexingRegistry, LearningResult, MleLearner, ParameterLearner,
    QueryTimes, ThresholdDecider,
};
use tracing::info;

use crate::config::CliConfig;

/// Indexing name the training header is registered under.
pub const TRAIN_INDEXING: &str = "train";

/// A `(name, contents)` CSV document.
pub type Document = (String, String);

fn borrowed(documents: &[Document]) -> impl Iterator<Item = (&str, &str)> {
    documents.iter().map(|(name, text)| (name.as_str(), text.as_str()))
}

/// Model learned from a training set.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub dataset: Dataset,
    pub model: CtbnModel,
    pub learning: LearningResult,
}

/// Classifications of a test set plus metrics over its labelled part.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub test: Dataset,
    pub results: Vec<ClassificationResult>,
    /// `None` when no test trajectory carries a class label.
    pub metrics: Option<ClassificationMetrics>,
}

/// Loads `documents` and learns a class-rooted naive Bayes model, or the
/// structure named in the learning config.
pub fn train(documents: &[Document], config: &CliConfig) -> Result<TrainedModel, CtbnError> {
    let registry = IndexingRegistry::new();
    let dataset = load_csv_dataset(
        &registry,
        TRAIN_INDEXING,
        borrowed(documents),
        &config.dataset,
    )?;
    let mut model = dataset.naive_bayes_model("ctbnc")?;
    let learner = MleLearner::new(config.learning.clone())?;
    let learning = learner.learn(&mut model, dataset.trajectories())?;
    info!(
        trajectories = learning.trajectories_used(),
        transitions = learning.transitions_observed(),
        nodes = model.len(),
        "trained model"
    );
    Ok(TrainedModel {
        dataset,
        model,
        learning,
    })
}

/// Classifies `documents` with a trained model.
pub fn evaluate(
    trained: &TrainedModel,
    documents: &[Document],
    config: &CliConfig,
) -> Result<Evaluation, CtbnError> {
    let test = trained
        .dataset
        .load_compatible(borrowed(documents), &config.dataset)?;

    let section = &config.classification;
    let mut classifier = Classifier::new(section.classifier_config());
    if let Some(threshold) = section.threshold {
        let positive = positive_class(&trained.model, section.positive_class.as_deref())?;
        classifier =
            classifier.with_decision_rule(Arc::new(ThresholdDecider::new(positive, threshold)?));
    }
    let query = match section.interval {
        Some(interval) => QueryTimes::Interval(interval),
        None => QueryTimes::Transitions,
    };
    let results = classifier.classify_all(&trained.model, test.trajectories(), &query)?;

    let num_classes = trained.model.class_node()?.cardinality();
    let (predicted, actual): (Vec<usize>, Vec<usize>) = results
        .iter()
        .zip(test.class_labels())
        .filter_map(|(result, label)| label.map(|actual| (result.class_state(), actual)))
        .unzip();
    let metrics = if actual.is_empty() {
        None
    } else {
        Some(ClassificationMetrics::from_labels(
            &predicted,
            &actual,
            num_classes,
        )?)
    };
    info!(
        trajectories = results.len(),
        labelled = actual.len(),
        "evaluated test set"
    );

    Ok(Evaluation {
        test,
        results,
        metrics,
    })
}

/// Named summaries of an evaluation, sorted by metric name.
pub fn metric_values(evaluation: &Evaluation) -> Vec<(String, f64)> {
    match &evaluation.metrics {
        Some(metrics) => MetricRegistry::with_builtins().evaluate_all(metrics),
        None => Vec::new(),
    }
}

fn positive_class(model: &CtbnModel, name: Option<&str>) -> Result<usize, CtbnError> {
    let class = model.class_node()?;
    match name {
        Some(name) => class.require_state_index(name),
        None if class.cardinality() >= 2 => Ok(1),
        None => Err(CtbnError::Construction(format!(
            "threshold needs a positive class but '{}' has a single state",
            class.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAIN: [(&str, &str); 4] = [
        ("a1", "t,class,x\n0,a,0\n2,,1\n2.5,,0\n6,,\n"),
        ("a2", "t,class,x\n0,a,1\n0.5,,0\n5,,1\n5.5,,\n"),
        ("b1", "t,class,x\n0,b,0\n0.2,,1\n0.4,,0\n0.6,,1\n0.8,,0\n1,,\n"),
        ("b2", "t,class,x\n0,b,1\n0.3,,0\n0.5,,1\n0.7,,0\n1,,\n"),
    ];

    fn docs(items: &[(&str, &str)]) -> Vec<Document> {
        items
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect()
    }

    fn config() -> CliConfig {
        CliConfig::from_toml("[learning]\nmxx_prior = 1.0\ntx_prior = 0.1\npx_prior = 1.0")
            .expect("config")
    }

    #[test]
    fn trains_and_evaluates_labelled_files() {
        let config = config();
        let trained = train(&docs(&TRAIN), &config).expect("train");
        assert!(trained.model.is_validated());
        assert_eq!(trained.learning.trajectories_used(), 4);

        let test = docs(&[
            ("slow", "t,class,x\n0,a,0\n3,,1\n3.5,,0\n7,,\n"),
            ("fast", "t,class,x\n0,b,1\n0.2,,0\n0.4,,1\n0.6,,0\n0.8,,\n"),
            ("unknown", "t,class,x\n0,,0\n0.25,,1\n0.5,,\n"),
        ]);
        let evaluation = evaluate(&trained, &test, &config).expect("evaluate");
        let labels: Vec<&str> = evaluation.results.iter().map(|r| r.class_label()).collect();
        assert_eq!(labels, ["a", "b", "b"]);

        let metrics = evaluation.metrics.as_ref().expect("labelled files");
        assert_eq!(metrics.total(), 2);
        assert_eq!(metrics.accuracy(), 1.0);
        let names: Vec<String> = metric_values(&evaluation)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["accuracy", "macro_f1", "macro_precision", "macro_recall"]);
    }

    #[test]
    fn unlabelled_test_set_has_no_metrics() {
        let config = config();
        let trained = train(&docs(&TRAIN), &config).expect("train");
        let test = docs(&[("u", "t,class,x\n0,,0\n1,,\n")]);
        let evaluation = evaluate(&trained, &test, &config).expect("evaluate");
        assert!(evaluation.metrics.is_none());
        assert!(metric_values(&evaluation).is_empty());
    }

    #[test]
    fn unknown_positive_class_is_rejected() {
        let mut config = config();
        config.classification.threshold = Some(0.9);
        config.classification.positive_class = Some("c".into());
        let trained = train(&docs(&TRAIN), &config).expect("train");
        let test = docs(&[("u", "t,class,x\n0,a,0\n1,,\n")]);
        assert!(evaluate(&trained, &test, &config).is_err());
    }

    #[test]
    fn test_states_must_be_known() {
        let config = config();
        let trained = train(&docs(&TRAIN), &config).expect("train");
        let test = docs(&[("odd", "t,class,x\n0,a,7\n1,,\n")]);
        let err = evaluate(&trained, &test, &config).expect_err("unknown state");
        assert!(matches!(err, CtbnError::DataConsistency(_)));
    }
}
