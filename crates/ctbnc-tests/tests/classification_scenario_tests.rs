//! Generate → classify scenario on a two-class model with sharply
//! different dynamics per class.

use ctbnc_core::{
    sample_trajectory, ClassificationMetrics, Classifier, QueryTimes, TrajectorySampler,
};
use ctbnc_tests::{assert_close, two_class_scenario};
use rand::rngs::StdRng;
use rand::SeedableRng;

const TRIALS: usize = 300;
const HORIZON: f64 = 10.0;

#[test]
fn repeated_generate_classify_is_accurate() {
    let model = two_class_scenario();
    let class_id = model.class_node().expect("class").id();
    let sampler = TrajectorySampler::new(&model).expect("sampler");
    let classifier = Classifier::default();
    let mut rng = StdRng::seed_from_u64(0xC7B4);

    let mut predicted = Vec::with_capacity(TRIALS);
    let mut actual = Vec::with_capacity(TRIALS);
    for _ in 0..TRIALS {
        let trajectory = sampler.generate(HORIZON, &mut rng).expect("sample");
        actual.push(trajectory.transitions()[0].value(class_id).expect("labelled"));

        let result = classifier.classify(&model, &trajectory).expect("classify");
        for (point, p) in result.probabilities().expect("emitted").iter().enumerate() {
            assert_close(p.iter().sum(), 1.0, 1e-4, &format!("sum at point {}", point));
        }
        predicted.push(result.class_state());
    }

    let metrics = ClassificationMetrics::from_labels(&predicted, &actual, 2).expect("metrics");
    assert!(
        metrics.accuracy() > 0.99,
        "accuracy {} over {} trials, confusion {:?}",
        metrics.accuracy(),
        TRIALS,
        metrics.confusion_matrix()
    );
}

#[test]
fn resampled_grid_keeps_distributions_normalized() {
    let model = two_class_scenario();
    let mut rng = StdRng::seed_from_u64(17);
    let classifier = Classifier::default();

    for _ in 0..20 {
        let trajectory = sample_trajectory(&model, HORIZON, &mut rng).expect("sample");
        let result = classifier
            .classify_query(&model, &trajectory, &QueryTimes::Interval(0.25))
            .expect("classify");

        // 0, 0.25, ..., 10 are all inside the span; transitions add more
        assert!(result.len() >= 41);
        for p in result.probabilities().expect("emitted") {
            assert_close(p.iter().sum(), 1.0, 1e-4, "grid sum");
            assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
        }
        let times = result.times();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn unlabeled_trajectories_classify_the_same() {
    let model = two_class_scenario();
    let class_id = model.class_node().expect("class").id();
    let mut rng = StdRng::seed_from_u64(99);
    let trajectory = sample_trajectory(&model, HORIZON, &mut rng).expect("sample");

    let mut transitions = trajectory.transitions().to_vec();
    let mut first = transitions[0].values().to_vec();
    first[class_id.index()] = None;
    transitions[0] = ctbnc_core::Transition::new(transitions[0].time(), first);
    let unlabeled = ctbnc_core::Trajectory::from_transitions(
        std::sync::Arc::clone(trajectory.indexing()),
        transitions,
    )
    .expect("unlabeled");

    let classifier = Classifier::default();
    let labelled = classifier.classify(&model, &trajectory).expect("labelled");
    let blind = classifier.classify(&model, &unlabeled).expect("unlabeled");
    assert_eq!(labelled.log_likelihoods(), blind.log_likelihoods());
    assert_eq!(labelled.class_label(), blind.class_label());
}
