//! TOML configuration for the `ctbnc` binary.
//!
//! ```toml
//! [dataset]
//! time_column = "t"
//! class_column = "class"
//! delimiter = ","
//!
//! [learning]
//! mxx_prior = 1.0
//! tx_prior = 0.1
//! px_prior = 1.0
//!
//! [classification]
//! emit_probabilities = false
//! interval = 0.5
//! threshold = 0.7
//! positive_class = "fault"
//! ```
//!
//! Every table and key is optional. Command-line flags override the file.

use std::fs;
use std::path::Path;

use ctbnc_core::{ClassifierConfig, CsvLayout, CtbnError, LearningConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub dataset: CsvLayout,
    pub learning: LearningConfig,
    pub classification: ClassificationSection,
}

/// Classifier settings plus the query and decision options of `classify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationSection {
    pub emit_probabilities: bool,
    /// Grid spacing added to the transition times.
    pub interval: Option<f64>,
    /// Minimum posterior of `positive_class` to predict it.
    pub threshold: Option<f64>,
    /// Class state the threshold applies to; the second state when unset.
    pub positive_class: Option<String>,
}

impl Default for ClassificationSection {
    fn default() -> Self {
        Self {
            emit_probabilities: ClassifierConfig::default().emit_probabilities,
            interval: None,
            threshold: None,
            positive_class: None,
        }
    }
}

impl ClassificationSection {
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            emit_probabilities: self.emit_probabilities,
        }
    }
}

impl CliConfig {
    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CtbnError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|err| match err {
            CtbnError::Construction(msg) => {
                CtbnError::Construction(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, CtbnError> {
        let config: CliConfig = toml::from_str(content)
            .map_err(|e| CtbnError::Construction(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CtbnError> {
        self.dataset.validate()?;
        self.learning.validate()?;
        if let Some(interval) = self.classification.interval {
            if !interval.is_finite() || interval <= 0.0 {
                return Err(CtbnError::Construction(format!(
                    "classification.interval must be finite and > 0, got {}",
                    interval
                )));
            }
        }
        if let Some(threshold) = self.classification.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(CtbnError::Construction(format!(
                    "classification.threshold must lie in [0, 1], got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }
}
