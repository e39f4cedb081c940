//! CSV → learn → classify → metrics, end to end.

use ctbnc_core::metrics::MetricRegistry;
use ctbnc_core::{
    load_csv_dataset, ClassificationMetrics, Classifier, CsvLayout, IndexingRegistry,
    LearningConfig, MleLearner, ParameterLearner, QueryTimes,
};
use ctbnc_tests::assert_close;

/// Class `calm`: `x` rarely leaves `low`. Class `busy`: `x` flips often.
const TRAIN: &[(&str, &str)] = &[
    ("calm_1.csv", "time;label;x\n0;calm;low\n4;;high\n4.5;;low\n10;;\n"),
    ("calm_2.csv", "time;label;x\n0;calm;low\n6;;high\n7;;low\n10;;\n"),
    (
        "busy_1.csv",
        "time;label;x\n0;busy;high\n0.5;;low\n1;;high\n1.5;;low\n2;;high\n2.5;;low\n3;;high\n",
    ),
    (
        "busy_2.csv",
        "time;label;x\n0;busy;low\n0.4;;high\n0.9;;low\n1.5;;high\n2;;low\n2.4;;high\n",
    ),
];

const TEST: &[(&str, &str)] = &[
    ("q_calm.csv", "time;label;x\n0;calm;low\n5;;high\n5.5;;low\n9;;\n"),
    ("q_busy.csv", "time;label;x\n0;busy;high\n0.3;;low\n0.8;;high\n1.2;;low\n1.9;;high\n"),
    ("q_unlabeled.csv", "time;label;x\n0;;low\n0.5;;high\n1;;low\n1.5;;high\n"),
];

fn layout() -> CsvLayout {
    CsvLayout {
        time_column: "time".into(),
        class_column: Some("label".into()),
        delimiter: ';',
    }
}

#[test]
fn csv_dataset_trains_a_working_classifier() {
    let registry = IndexingRegistry::new();
    let train = load_csv_dataset(&registry, "activity", TRAIN.iter().copied(), &layout())
        .expect("train");
    assert_eq!(train.class_states().expect("class"), &["calm", "busy"]);
    assert_eq!(train.states()[1], vec!["low", "high"]);

    let mut model = train.naive_bayes_model("activity").expect("model");
    let learner = MleLearner::new(LearningConfig {
        mxx_prior: 1.0,
        tx_prior: 0.1,
        px_prior: 1.0,
        structure: None,
    })
    .expect("learner");
    let result = learner
        .learn(&mut model, train.trajectories())
        .expect("learn");
    assert_eq!(result.trajectories_used(), 4);

    let test = train.load_compatible(TEST.iter().copied(), &layout()).expect("test");
    let results = Classifier::default()
        .classify_all(&model, test.trajectories(), &QueryTimes::Transitions)
        .expect("classify");
    let labels: Vec<&str> = results.iter().map(|r| r.class_label()).collect();
    assert_eq!(labels, ["calm", "busy", "busy"]);

    let actual: Vec<usize> = test.class_labels().into_iter().flatten().collect();
    let metrics =
        ClassificationMetrics::from_results(&results[..2], &actual, 2).expect("metrics");
    assert_close(metrics.accuracy(), 1.0, 1e-12, "accuracy");
    let summary = MetricRegistry::with_builtins().evaluate_all(&metrics);
    assert!(summary.iter().all(|(_, v)| (*v - 1.0).abs() < 1e-12));
}

#[test]
fn registry_shares_indexings_by_name() {
    let registry = IndexingRegistry::new();
    let a = load_csv_dataset(&registry, "shared", TRAIN[..1].iter().copied(), &layout())
        .expect("a");
    let b = load_csv_dataset(&registry, "shared", TRAIN[2..].iter().copied(), &layout())
        .expect("b");
    assert!(std::sync::Arc::ptr_eq(a.indexing(), b.indexing()));
    assert_eq!(registry.len(), 1);

    let err = load_csv_dataset(
        &registry,
        "shared",
        [("other.csv", "time;label;y\n0;calm;low\n")],
        &layout(),
    )
    .expect_err("different variables under the same name");
    assert!(err.to_string().contains("already registered"));
}
