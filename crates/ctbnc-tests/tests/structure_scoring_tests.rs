//! Structure scoring on data sampled from a known chain `class → x → y`.

use ctbnc_core::engine::model_selection::{
    learn_and_score, select_best_structure, StructureCriterion,
};
use ctbnc_core::{sample_trajectory, LearningConfig, MleLearner, Trajectory};
use ctbnc_tests::{chain_scenario, generating_chain_structure, naive_bayes_structure};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sampled_data(count: usize, seed: u64) -> Vec<Trajectory> {
    let model = chain_scenario();
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| sample_trajectory(&model, 20.0, &mut rng).expect("sample"))
        .collect()
}

fn smoothed_learner() -> MleLearner {
    MleLearner::new(LearningConfig {
        mxx_prior: 0.5,
        tx_prior: 0.05,
        px_prior: 1.0,
        structure: None,
    })
    .expect("learner")
}

#[test]
fn generating_structure_wins_under_both_criteria() {
    let data = sampled_data(40, 2024);
    let learner = smoothed_learner();

    for criterion in [StructureCriterion::Aic, StructureCriterion::Bic] {
        let mut chain = chain_scenario().clone_skeleton();
        let (chain_stats, chain_score) = learn_and_score(
            &learner,
            &mut chain,
            &generating_chain_structure(),
            &data,
            criterion,
        )
        .expect("chain");

        let mut naive = chain_scenario().clone_skeleton();
        let (naive_stats, naive_score) = learn_and_score(
            &learner,
            &mut naive,
            &naive_bayes_structure(),
            &data,
            criterion,
        )
        .expect("naive");

        assert!(
            chain_score.score < naive_score.score,
            "{:?}: chain {} vs naive {}",
            criterion,
            chain_score.score,
            naive_score.score
        );

        let best = select_best_structure(
            [
                ("naive_bayes", &naive, &naive_stats),
                ("chain", &chain, &chain_stats),
            ],
            criterion,
        )
        .expect("select");
        assert_eq!(best.name, "chain");
        assert_eq!(best.details, chain_score);
    }
}

#[test]
fn candidates_from_different_data_are_rejected() {
    let learner = smoothed_learner();
    let mut a = chain_scenario().clone_skeleton();
    let (a_stats, _) = learn_and_score(
        &learner,
        &mut a,
        &generating_chain_structure(),
        &sampled_data(5, 1),
        StructureCriterion::Bic,
    )
    .expect("a");
    let mut b = chain_scenario().clone_skeleton();
    let (b_stats, _) = learn_and_score(
        &learner,
        &mut b,
        &generating_chain_structure(),
        &sampled_data(8, 2),
        StructureCriterion::Bic,
    )
    .expect("b");

    let err = select_best_structure(
        [("a", &a, &a_stats), ("b", &b, &b_stats)],
        StructureCriterion::Bic,
    )
    .expect_err("must reject mismatched data");
    assert!(
        err.to_string().contains("share sample size"),
        "unexpected error: {}",
        err
    );
}
