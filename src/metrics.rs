use ndarray::Array1;
use std::collections::BTreeMap;

use crate::error::{ErrorKind, PipelineError, Result};

/// Evaluation metrics for a binary classifier, positive class = 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub f1_score: f64,
    pub precision: f64,
    pub recall: f64,
}

impl ClassificationMetrics {
    pub fn compute(predictions: &Array1<i64>, actuals: &Array1<i64>) -> Result<Self> {
        if predictions.len() != actuals.len() {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                format!(
                    "prediction count {} does not match actual count {}",
                    predictions.len(),
                    actuals.len()
                ),
            ));
        }
        if predictions.is_empty() {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                "cannot compute metrics on an empty prediction set",
            ));
        }

        let mut tp = 0u64;
        let mut fp = 0u64;
        let mut fn_ = 0u64;
        for (&pred, &actual) in predictions.iter().zip(actuals.iter()) {
            match (pred == 1, actual == 1) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) => {}
            }
        }

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Ok(Self {
            accuracy: accuracy(predictions, actuals),
            f1_score,
            precision,
            recall,
        })
    }

    /// Flat name → value mapping, as logged to the experiment tracker.
    pub fn as_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("f1_score".to_string(), self.f1_score),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
        ])
    }
}

/// Fraction of predictions that match the actual label.
pub fn accuracy(predictions: &Array1<i64>, actuals: &Array1<i64>) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(actuals.iter())
        .filter(|(p, a)| p == a)
        .count();
    correct as f64 / predictions.len() as f64
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
