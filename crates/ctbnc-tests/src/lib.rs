//! Shared fixtures for the scenario and property tests.

use std::sync::Arc;

use ctbnc_core::{Cim, CtbnModel, NodeId, NodeIndexing};

pub fn assert_close(actual: f64, expected: f64, tol: f64, label: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{} mismatch: expected {:.15}, got {:.15}, diff={:.3e}",
        label,
        expected,
        actual,
        (actual - expected).abs()
    );
}

/// Generator with the given total exit rate per state, spread evenly over
/// the other states.
pub fn uniform_generator(rates: &[f64]) -> Cim {
    let k = rates.len();
    let rows = rates
        .iter()
        .enumerate()
        .map(|(i, &rate)| {
            (0..k)
                .map(|j| {
                    if i == j {
                        -rate
                    } else {
                        rate / (k as f64 - 1.0)
                    }
                })
                .collect()
        })
        .collect();
    Cim::from_rows(rows).expect("generator")
}

fn states(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Class `{s1, s2}` with a uniform prior and two continuous children whose
/// dynamics differ sharply between the classes:
/// - `x` (3 states) is slow under `s1` and fast under `s2`
/// - `y` (2 states) is fast under `s1` and slow under `s2`
pub fn two_class_scenario() -> CtbnModel {
    let indexing = Arc::new(
        NodeIndexing::new("scenario", ["class", "x", "y"], Some("class")).expect("indexing"),
    );
    let node_states = vec![
        states(&["s1", "s2"]),
        states(&["lo", "mid", "hi"]),
        states(&["off", "on"]),
    ];
    let mut model = CtbnModel::naive_bayes(indexing, "scenario", &node_states).expect("model");
    set_cims(&mut model, 0, vec![Cim::from_rows(vec![vec![0.5, 0.5]]).expect("prior")]);
    set_cims(
        &mut model,
        1,
        vec![
            uniform_generator(&[0.5, 0.8, 0.5]),
            uniform_generator(&[4.0, 6.0, 5.0]),
        ],
    );
    set_cims(
        &mut model,
        2,
        vec![uniform_generator(&[5.0, 4.0]), uniform_generator(&[0.4, 0.6])],
    );
    model.validate().expect("validate");
    model
}

/// Class `{a, b}`, `x` depends on the class only, `y` depends on `x` only:
/// `y` is sluggish while `x = 0` and fast while `x = 1`.
pub fn chain_scenario() -> CtbnModel {
    let indexing =
        Arc::new(NodeIndexing::new("chain", ["class", "x", "y"], Some("class")).expect("indexing"));
    let node_states = vec![states(&["a", "b"]), states(&["0", "1"]), states(&["0", "1"])];
    let mut model = CtbnModel::naive_bayes(indexing, "chain", &node_states).expect("model");
    model
        .set_structure(&generating_chain_structure())
        .expect("structure");

    set_cims(&mut model, 0, vec![Cim::from_rows(vec![vec![0.4, 0.6]]).expect("prior")]);
    set_cims(
        &mut model,
        1,
        vec![uniform_generator(&[1.0, 1.0]), uniform_generator(&[2.0, 0.5])],
    );
    set_cims(
        &mut model,
        2,
        vec![uniform_generator(&[0.2, 0.2]), uniform_generator(&[5.0, 5.0])],
    );
    model.validate().expect("validate");
    model
}

/// `class → x`, `x → y`.
pub fn generating_chain_structure() -> Vec<Vec<bool>> {
    vec![
        vec![false, true, false],
        vec![false, false, true],
        vec![false, false, false],
    ]
}

/// `class → x`, `class → y`.
pub fn naive_bayes_structure() -> Vec<Vec<bool>> {
    vec![
        vec![false, true, true],
        vec![false, false, false],
        vec![false, false, false],
    ]
}

fn set_cims(model: &mut CtbnModel, id: u32, cims: Vec<Cim>) {
    model
        .require_node_mut(NodeId(id))
        .expect("node")
        .set_cims(cims)
        .expect("cims");
}
