use gbdt::config::Config as GbdtConfig;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use ndarray::{Array1, Array2};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{ErrorContext, ErrorKind, PipelineError, Result};

/// Hyperparameters forwarded to the boosting library.
#[derive(Debug, Clone, PartialEq)]
pub struct GbdtParams {
    pub iterations: usize,
    pub learning_rate: f64,
    pub max_depth: u32,
    pub min_leaf_size: usize,
    pub data_sample_ratio: f64,
    pub feature_sample_ratio: f64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            learning_rate: 0.1,
            max_depth: 6,
            min_leaf_size: 20,
            data_sample_ratio: 1.0,
            feature_sample_ratio: 1.0,
        }
    }
}

impl GbdtParams {
    /// Name/value pairs as logged to the experiment tracker.
    pub fn as_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("iterations".to_string(), self.iterations.to_string()),
            ("learning_rate".to_string(), self.learning_rate.to_string()),
            ("max_depth".to_string(), self.max_depth.to_string()),
            ("min_leaf_size".to_string(), self.min_leaf_size.to_string()),
            (
                "data_sample_ratio".to_string(),
                self.data_sample_ratio.to_string(),
            ),
            (
                "feature_sample_ratio".to_string(),
                self.feature_sample_ratio.to_string(),
            ),
        ]
    }
}

/// Binary classifier backed by `gbdt::gradient_boost::GBDT`.
pub struct GbdtClassifier {
    params: GbdtParams,
    model: Option<GBDT>,
}

impl std::fmt::Debug for GbdtClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `GBDT` does not implement `Debug`, so report only whether a model
        // has been fitted alongside the hyperparameters.
        f.debug_struct("GbdtClassifier")
            .field("params", &self.params)
            .field("trained", &self.model.is_some())
            .finish()
    }
}

impl GbdtClassifier {
    pub fn new(params: GbdtParams) -> Self {
        Self {
            params,
            model: None,
        }
    }

    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    fn build_config(&self, feature_size: usize) -> GbdtConfig {
        let mut config = GbdtConfig::new();
        config.set_feature_size(feature_size);
        config.set_iterations(self.params.iterations);
        config.set_max_depth(self.params.max_depth);
        config.set_shrinkage(self.params.learning_rate as f32);
        config.set_min_leaf_size(self.params.min_leaf_size);
        config.set_data_sample_ratio(self.params.data_sample_ratio);
        config.set_feature_sample_ratio(self.params.feature_sample_ratio);
        // The library's binary-classification loss; predictions come back
        // as probabilities.
        config.set_loss("LogLikelyhood");
        config.set_debug(false);
        config.set_training_optimization_level(2);
        config
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                "cannot train on an empty feature matrix",
            ));
        }
        if x.nrows() != y.len() {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                "feature matrix and labels disagree on row count",
            ));
        }

        let config = self.build_config(x.ncols());
        let mut model = GBDT::new(&config);
        let mut data = training_data(x, y);
        debug!(rows = x.nrows(), features = x.ncols(), "fitting GBDT");
        model.fit(&mut data);
        self.model = Some(model);
        Ok(())
    }

    /// Probability of the positive class for each row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        let model = self.model.as_ref().ok_or_else(|| {
            PipelineError::new(ErrorKind::Training, "model has not been trained")
        })?;
        let predictions = model.predict(&test_data(x));
        Ok(predictions.into_iter().map(|p| p as f64).collect())
    }

    /// Hard class predictions at a 0.5 probability threshold.
    pub fn predict_class(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let probabilities = self.predict_proba(x)?;
        Ok(probabilities
            .into_iter()
            .map(|p| if p >= 0.5 { 1 } else { 0 })
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let model = self.model.as_ref().ok_or_else(|| {
            PipelineError::new(ErrorKind::Training, "model has not been trained")
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .wrap(ErrorKind::Training, "failed to create model directory")?;
        }
        let path_str = path.to_str().ok_or_else(|| {
            PipelineError::new(ErrorKind::InvalidInput, "model path is not valid UTF-8")
        })?;
        // The library reports save failures as a non-Send boxed error, so it
        // is carried in the message rather than as a source.
        model.save_model(path_str).map_err(|e| {
            PipelineError::new(ErrorKind::Training, format!("failed to save model: {e}"))
        })?;
        Ok(())
    }

    pub fn load(path: &Path, params: GbdtParams) -> Result<Self> {
        let path_str = path.to_str().ok_or_else(|| {
            PipelineError::new(ErrorKind::InvalidInput, "model path is not valid UTF-8")
        })?;
        let model = GBDT::load_model(path_str).map_err(|e| {
            PipelineError::new(ErrorKind::Training, format!("failed to load model: {e}"))
        })?;
        Ok(Self {
            params,
            model: Some(model),
        })
    }
}

fn training_data(x: &Array2<f64>, y: &Array1<i64>) -> DataVec {
    (0..x.nrows())
        .map(|i| {
            // ±1 ground truth for the LogLikelyhood loss; `target` is the
            // library's per-iteration scratch and starts from the same value.
            let signed = if y[i] > 0 { 1.0 } else { -1.0 };
            Data {
                feature: x.row(i).iter().map(|&v| v as f32).collect(),
                target: signed,
                weight: 1.0,
                label: signed,
                residual: 0.0,
                initial_guess: 0.0,
            }
        })
        .collect()
}

fn test_data(x: &Array2<f64>) -> DataVec {
    (0..x.nrows())
        .map(|i| Data {
            feature: x.row(i).iter().map(|&v| v as f32).collect(),
            target: 0.0,
            weight: 1.0,
            label: 0.0,
            residual: 0.0,
            initial_guess: 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two well-separated clusters, 20 rows each.
    fn separable_data() -> (Array2<f64>, Array1<i64>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            rows.push(vec![(i % 5) as f64, (i % 4) as f64]);
            labels.push(0i64);
            rows.push(vec![20.0 + (i % 5) as f64, 20.0 + (i % 4) as f64]);
            labels.push(1i64);
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        (
            Array2::from_shape_vec((40, 2), flat).unwrap(),
            Array1::from_vec(labels),
        )
    }

    fn small_params() -> GbdtParams {
        GbdtParams {
            iterations: 30,
            max_depth: 3,
            min_leaf_size: 2,
            ..GbdtParams::default()
        }
    }

    #[test]
    fn learns_a_separable_problem() {
        let (x, y) = separable_data();
        let mut model = GbdtClassifier::new(small_params());
        model.fit(&x, &y).unwrap();

        let preds = model.predict_class(&x).unwrap();
        let correct = preds
            .iter()
            .zip(y.iter())
            .filter(|(p, a)| p == a)
            .count();
        assert!(correct as f64 / y.len() as f64 > 0.9);
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let (x, y) = separable_data();
        let mut model = GbdtClassifier::new(small_params());
        model.fit(&x, &y).unwrap();

        for p in model.predict_proba(&x).unwrap() {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn predicting_before_training_fails() {
        let model = GbdtClassifier::new(GbdtParams::default());
        let x = Array2::zeros((2, 2));
        let err = model.predict_class(&x).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Training);
    }

    #[test]
    fn save_and_load_round_trip() {
        let (x, y) = separable_data();
        let mut model = GbdtClassifier::new(small_params());
        model.fit(&x, &y).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gbdt");
        model.save(&path).unwrap();

        let reloaded = GbdtClassifier::load(&path, small_params()).unwrap();
        assert_eq!(
            model.predict_class(&x).unwrap(),
            reloaded.predict_class(&x).unwrap()
        );
    }
}
