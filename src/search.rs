use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use tracing::{debug, info};

use crate::error::{ErrorKind, PipelineError, Result};
use crate::metrics::accuracy;
use crate::models::{GbdtClassifier, GbdtParams};

/// Distributions the randomized search samples hyperparameters from.
/// Ranges are half-open; lists are sampled uniformly.
#[derive(Debug, Clone)]
pub struct ParamDistributions {
    pub iterations: (usize, usize),
    pub learning_rate: (f64, f64),
    pub max_depth: (u32, u32),
    pub min_leaf_size: Vec<usize>,
    pub data_sample_ratio: Vec<f64>,
    pub feature_sample_ratio: Vec<f64>,
}

impl Default for ParamDistributions {
    fn default() -> Self {
        Self {
            iterations: (100, 500),
            learning_rate: (0.01, 0.21),
            max_depth: (5, 12),
            min_leaf_size: vec![10, 20, 50],
            data_sample_ratio: vec![0.6, 0.8, 1.0],
            feature_sample_ratio: vec![0.6, 0.8, 1.0],
        }
    }
}

impl ParamDistributions {
    pub fn sample(&self, rng: &mut StdRng) -> GbdtParams {
        GbdtParams {
            iterations: rng.gen_range(self.iterations.0..self.iterations.1),
            learning_rate: rng.gen_range(self.learning_rate.0..self.learning_rate.1),
            max_depth: rng.gen_range(self.max_depth.0..self.max_depth.1),
            min_leaf_size: self.min_leaf_size[rng.gen_range(0..self.min_leaf_size.len())],
            data_sample_ratio: self.data_sample_ratio
                [rng.gen_range(0..self.data_sample_ratio.len())],
            feature_sample_ratio: self.feature_sample_ratio
                [rng.gen_range(0..self.feature_sample_ratio.len())],
        }
    }
}

/// Fixed trial and fold counts for the search.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub n_iter: usize,
    pub cv_folds: usize,
    pub seed: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            n_iter: 4,
            cv_folds: 3,
            seed: 42,
        }
    }
}

/// One sampled configuration and its cross-validated score.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub params: GbdtParams,
    pub mean_accuracy: f64,
}

/// The search result: the best configuration refitted on the full training
/// set, plus every trial for the record.
#[derive(Debug)]
pub struct SearchOutcome {
    pub model: GbdtClassifier,
    pub best_params: GbdtParams,
    pub best_score: f64,
    pub trials: Vec<TrialOutcome>,
}

/// Randomized hyperparameter search with k-fold cross-validation, scored by
/// accuracy.
pub struct RandomizedSearch {
    distributions: ParamDistributions,
    settings: SearchSettings,
}

impl RandomizedSearch {
    pub fn new(distributions: ParamDistributions, settings: SearchSettings) -> Self {
        Self {
            distributions,
            settings,
        }
    }

    pub fn fit(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<SearchOutcome> {
        if self.settings.cv_folds < 2 {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                "cross-validation needs at least 2 folds",
            ));
        }
        if self.settings.n_iter == 0 {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                "search needs at least 1 iteration",
            ));
        }
        if x.nrows() < self.settings.cv_folds {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                format!(
                    "{} rows cannot be split into {} folds",
                    x.nrows(),
                    self.settings.cv_folds
                ),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let folds = k_fold_indices(x.nrows(), self.settings.cv_folds, &mut rng);

        let mut trials = Vec::with_capacity(self.settings.n_iter);
        let mut best: Option<(GbdtParams, f64)> = None;

        for trial in 0..self.settings.n_iter {
            let params = self.distributions.sample(&mut rng);
            let mut fold_scores = Vec::with_capacity(folds.len());

            for (fold_idx, validation) in folds.iter().enumerate() {
                let train: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != fold_idx)
                    .flat_map(|(_, fold)| fold.iter().copied())
                    .collect();

                let mut model = GbdtClassifier::new(params.clone());
                model.fit(&x.select(Axis(0), &train), &y.select(Axis(0), &train))?;

                let x_val = x.select(Axis(0), validation);
                let y_val = y.select(Axis(0), validation);
                fold_scores.push(accuracy(&model.predict_class(&x_val)?, &y_val));
            }

            let mean_accuracy = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
            debug!(trial, mean_accuracy, params = ?params, "search trial scored");

            if best
                .as_ref()
                .map(|(_, score)| mean_accuracy > *score)
                .unwrap_or(true)
            {
                best = Some((params.clone(), mean_accuracy));
            }
            trials.push(TrialOutcome {
                params,
                mean_accuracy,
            });
        }

        let (best_params, best_score) = best.ok_or_else(|| {
            PipelineError::new(ErrorKind::Training, "search produced no trials")
        })?;
        info!(best_score, params = ?best_params, "best parameters found");

        // Refit the winning configuration on the full training set.
        let mut model = GbdtClassifier::new(best_params.clone());
        model.fit(x, y)?;

        Ok(SearchOutcome {
            model,
            best_params,
            best_score,
            trials,
        })
    }
}

/// Shuffle row indices and deal them into k roughly equal folds.
fn k_fold_indices(n_rows: usize, k: usize, rng: &mut StdRng) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..n_rows).collect();
    indices.shuffle(rng);

    let mut folds: Vec<Vec<usize>> = vec![Vec::with_capacity(n_rows / k + 1); k];
    for (i, index) in indices.into_iter().enumerate() {
        folds[i % k].push(index);
    }
    folds
}
