//! Classification metrics.
//!
//! [`ClassificationMetrics`] holds the confusion matrix of one evaluation
//! (rows are actual class states, columns predicted) and derives:
//! - accuracy
//! - per-class precision and recall (0 when undefined)
//! - per-class F1
//!
//! A small named registry exposes scalar summaries the way reports consume
//! them: `accuracy`, `macro_precision`, `macro_recall`, `macro_f1`.
//! Registry iteration is sorted by name so reports are deterministic.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::classify::ClassificationResult;
use crate::engine::errors::CtbnError;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassificationMetrics {
    num_classes: usize,
    confusion: Vec<Vec<usize>>,
    total: usize,
}

impl ClassificationMetrics {
    /// Builds the confusion matrix from parallel label lists.
    pub fn from_labels(
        predicted: &[usize],
        actual: &[usize],
        num_classes: usize,
    ) -> Result<Self, CtbnError> {
        if predicted.is_empty() {
            return Err(CtbnError::DataConsistency(
                "metrics need at least one prediction".into(),
            ));
        }
        if predicted.len() != actual.len() {
            return Err(CtbnError::Construction(format!(
                "{} predictions but {} actual labels",
                predicted.len(),
                actual.len()
            )));
        }

        let mut confusion = vec![vec![0usize; num_classes]; num_classes];
        for (i, (&p, &a)) in predicted.iter().zip(actual).enumerate() {
            if p >= num_classes || a >= num_classes {
                return Err(CtbnError::Invariant(format!(
                    "label pair {} (predicted {}, actual {}) out of range for {} classes",
                    i, p, a, num_classes
                )));
            }
            confusion[a][p] += 1;
        }
        Ok(Self {
            num_classes,
            confusion,
            total: predicted.len(),
        })
    }

    /// Scores classification results against the true class states.
    pub fn from_results(
        results: &[ClassificationResult],
        actual: &[usize],
        num_classes: usize,
    ) -> Result<Self, CtbnError> {
        let predicted: Vec<usize> = results.iter().map(ClassificationResult::class_state).collect();
        Self::from_labels(&predicted, actual, num_classes)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// `confusion[actual][predicted]`.
    pub fn confusion_matrix(&self) -> &[Vec<usize>] {
        &self.confusion
    }

    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|c| self.confusion[c][c]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        self.correct() as f64 / self.total as f64
    }

    pub fn precision(&self, class: usize) -> f64 {
        if class >= self.num_classes {
            return 0.0;
        }
        let predicted: usize = self.confusion.iter().map(|row| row[class]).sum();
        ratio(self.confusion[class][class], predicted)
    }

    pub fn recall(&self, class: usize) -> f64 {
        match self.confusion.get(class) {
            Some(row) => ratio(row[class], row.iter().sum()),
            None => 0.0,
        }
    }

    pub fn f1(&self, class: usize) -> f64 {
        let (p, r) = (self.precision(class), self.recall(class));
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    fn macro_average(&self, per_class: impl Fn(usize) -> f64) -> f64 {
        if self.num_classes == 0 {
            return 0.0;
        }
        (0..self.num_classes).map(per_class).sum::<f64>() / self.num_classes as f64
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Scalar summary of a confusion matrix.
pub trait MetricFn: Send + Sync + 'static {
    fn eval(&self, metrics: &ClassificationMetrics) -> f64;
}

struct Accuracy;
struct MacroPrecision;
struct MacroRecall;
struct MacroF1;

impl MetricFn for Accuracy {
    fn eval(&self, metrics: &ClassificationMetrics) -> f64 {
        metrics.accuracy()
    }
}

impl MetricFn for MacroPrecision {
    fn eval(&self, metrics: &ClassificationMetrics) -> f64 {
        metrics.macro_average(|c| metrics.precision(c))
    }
}

impl MetricFn for MacroRecall {
    fn eval(&self, metrics: &ClassificationMetrics) -> f64 {
        metrics.macro_average(|c| metrics.recall(c))
    }
}

impl MetricFn for MacroF1 {
    fn eval(&self, metrics: &ClassificationMetrics) -> f64 {
        metrics.macro_average(|c| metrics.f1(c))
    }
}

/// Named metric implementations.
#[derive(Default, Clone)]
pub struct MetricRegistry {
    inner: BTreeMap<String, Arc<dyn MetricFn>>,
}

impl MetricRegistry {
    pub fn with_builtins() -> Self {
        let mut r = MetricRegistry::default();
        r.register("accuracy", Arc::new(Accuracy));
        r.register("macro_precision", Arc::new(MacroPrecision));
        r.register("macro_recall", Arc::new(MacroRecall));
        r.register("macro_f1", Arc::new(MacroF1));
        r
    }

    pub fn register(&mut self, name: &str, f: Arc<dyn MetricFn>) {
        self.inner.insert(name.to_string(), f);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MetricFn>> {
        self.inner.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    /// Evaluates every registered metric, sorted by name.
    pub fn evaluate_all(&self, metrics: &ClassificationMetrics) -> Vec<(String, f64)> {
        self.inner
            .iter()
            .map(|(name, f)| (name.clone(), f.eval(metrics)))
            .collect()
    }
}
