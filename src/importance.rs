use ndarray::{Array1, Array2};
use rand::prelude::*;
use tracing::debug;

use crate::error::{ErrorKind, PipelineError, Result};
use crate::metrics::accuracy;
use crate::models::{GbdtClassifier, GbdtParams};

/// A feature's permutation-importance score: the accuracy lost when that
/// feature's column is shuffled.
#[derive(Debug, Clone)]
pub struct FeatureImportance {
    pub feature: String,
    pub score: f64,
}

/// Ranks features by fitting an auxiliary boosted-tree model and measuring
/// each column's permutation importance against it. The auxiliary model is
/// discarded afterwards; only the ranking survives.
#[derive(Debug, Clone)]
pub struct FeatureRanker {
    seed: u64,
}

impl FeatureRanker {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn rank(
        &self,
        x: &Array2<f64>,
        y: &Array1<i64>,
        names: &[String],
    ) -> Result<Vec<FeatureImportance>> {
        if names.len() != x.ncols() {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                format!(
                    "have {} feature names for {} columns",
                    names.len(),
                    x.ncols()
                ),
            ));
        }

        let mut auxiliary = GbdtClassifier::new(auxiliary_params());
        auxiliary.fit(x, y)?;
        let baseline = accuracy(&auxiliary.predict_class(x)?, y);
        debug!(baseline, "auxiliary model fitted for importance ranking");

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut ranking = Vec::with_capacity(names.len());
        for (j, name) in names.iter().enumerate() {
            let mut shuffled: Vec<f64> = x.column(j).to_vec();
            shuffled.shuffle(&mut rng);

            let mut permuted = x.clone();
            for (i, value) in shuffled.into_iter().enumerate() {
                permuted[[i, j]] = value;
            }

            let permuted_accuracy = accuracy(&auxiliary.predict_class(&permuted)?, y);
            ranking.push(FeatureImportance {
                feature: name.clone(),
                score: baseline - permuted_accuracy,
            });
        }

        ranking.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(ranking)
    }
}

fn auxiliary_params() -> GbdtParams {
    GbdtParams {
        iterations: 60,
        learning_rate: 0.1,
        max_depth: 6,
        min_leaf_size: 5,
        data_sample_ratio: 1.0,
        feature_sample_ratio: 1.0,
    }
}
