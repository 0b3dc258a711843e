use ndarray::{Array1, Array2};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, error, info};

use crate::data_loader;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::metrics::ClassificationMetrics;
use crate::paths::ArtifactPaths;
use crate::search::{ParamDistributions, RandomizedSearch, SearchOutcome, SearchSettings};
use crate::tracking::ExperimentTracker;
use crate::LABEL_COLUMN;

/// Third stage: tune, train, evaluate, and persist the classifier inside a
/// single tracked run.
pub struct ModelTraining {
    train_path: PathBuf,
    test_path: PathBuf,
    model_path: PathBuf,
    tracker: ExperimentTracker,
    distributions: ParamDistributions,
    settings: SearchSettings,
}

impl ModelTraining {
    pub fn new(paths: &ArtifactPaths) -> Self {
        Self {
            train_path: paths.processed_train_file.clone(),
            test_path: paths.processed_test_file.clone(),
            model_path: paths.model_file.clone(),
            tracker: ExperimentTracker::new(&paths.tracking_dir),
            distributions: ParamDistributions::default(),
            settings: SearchSettings::default(),
        }
    }

    /// Override the search distributions and trial settings.
    pub fn with_search(mut self, distributions: ParamDistributions, settings: SearchSettings) -> Self {
        self.distributions = distributions;
        self.settings = settings;
        self
    }

    /// Load both processed CSVs and separate features from the label.
    #[allow(clippy::type_complexity)]
    pub fn load_and_split_data(
        &self,
    ) -> Result<(Array2<f64>, Array1<i64>, Array2<f64>, Array1<i64>)> {
        info!("loading processed data from {}", self.train_path.display());
        let train = data_loader::load_csv(&self.train_path)?;
        info!("loading processed data from {}", self.test_path.display());
        let test = data_loader::load_csv(&self.test_path)?;

        let train_columns: BTreeSet<String> = train
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let test_columns: BTreeSet<String> = test
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        if train_columns != test_columns {
            return Err(PipelineError::new(
                ErrorKind::Training,
                "train and test data disagree on feature columns",
            ));
        }

        let (x_train, y_train) = data_loader::split_features_label(&train, LABEL_COLUMN)?;
        let (x_test, y_test) = data_loader::split_features_label(&test, LABEL_COLUMN)?;
        info!(
            train_rows = x_train.nrows(),
            test_rows = x_test.nrows(),
            features = x_train.ncols(),
            "data loaded and split into features and target"
        );
        Ok((x_train, y_train, x_test, y_test))
    }

    /// Randomized hyperparameter search; returns the refitted best model.
    pub fn train_model(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<SearchOutcome> {
        info!("starting hyperparameter tuning");
        let search = RandomizedSearch::new(self.distributions.clone(), self.settings.clone());
        let outcome = search.fit(x, y)?;
        debug!(
            trials = outcome.trials.len(),
            best_score = outcome.best_score,
            "hyperparameter tuning finished"
        );
        Ok(outcome)
    }

    pub fn evaluate_model(
        &self,
        outcome: &SearchOutcome,
        x_test: &Array2<f64>,
        y_test: &Array1<i64>,
    ) -> Result<ClassificationMetrics> {
        info!("evaluating the model");
        let predictions = outcome.model.predict_class(x_test)?;
        let metrics = ClassificationMetrics::compute(&predictions, y_test)?;
        info!(
            accuracy = metrics.accuracy,
            f1_score = metrics.f1_score,
            precision = metrics.precision,
            recall = metrics.recall,
            "model evaluation metrics"
        );
        Ok(metrics)
    }

    pub fn save_model(&self, outcome: &SearchOutcome) -> Result<()> {
        outcome.model.save(&self.model_path)?;
        info!("model saved at {}", self.model_path.display());
        Ok(())
    }

    /// The full training pass, wrapped in one tracked run.
    pub fn run(&self) -> Result<()> {
        info!("starting model training pipeline");
        let outcome = self.run_inner();
        if let Err(err) = &outcome {
            error!("model training pipeline failed: {err}");
        } else {
            info!("model training pipeline completed successfully");
        }
        outcome
    }

    fn run_inner(&self) -> Result<()> {
        let mut run = self.tracker.start_run("model-training")?;

        info!("logging the training and testing datasets to the run");
        run.log_artifact(&self.train_path, "dataset")?;
        run.log_artifact(&self.test_path, "dataset")?;

        let (x_train, y_train, x_test, y_test) = self.load_and_split_data()?;
        let outcome = self.train_model(&x_train, &y_train)?;
        let metrics = self.evaluate_model(&outcome, &x_test, &y_test)?;
        self.save_model(&outcome)?;

        info!("logging the model artifact, parameters, and metrics to the run");
        run.log_artifact(&self.model_path, "model")?;
        run.log_params(outcome.best_params.as_pairs());
        run.log_metric("cv_accuracy", outcome.best_score);
        run.log_metrics(&metrics.as_map());

        let record = run.finish()?;
        info!("run record written to {}", record.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn write_processed(paths: &ArtifactPaths, rows: usize, path_is_train: bool) {
        // Feature 0 separates the classes; feature 1 is noise.
        let mut signal = Vec::new();
        let mut noise = Vec::new();
        let mut label = Vec::new();
        for i in 0..rows {
            let class = (i % 2) as i64;
            signal.push(class as f64 * 12.0 + (i % 3) as f64);
            noise.push((i % 5) as f64);
            label.push(class);
        }
        let mut df = DataFrame::new(vec![
            Series::new("signal".into(), signal).into_column(),
            Series::new("noise".into(), noise).into_column(),
            Series::new(LABEL_COLUMN.into(), label).into_column(),
        ])
        .unwrap();
        let path = if path_is_train {
            &paths.processed_train_file
        } else {
            &paths.processed_test_file
        };
        data_loader::write_csv(&mut df, path).unwrap();
    }

    fn quick_search() -> (ParamDistributions, SearchSettings) {
        (
            ParamDistributions {
                iterations: (10, 25),
                learning_rate: (0.05, 0.2),
                max_depth: (3, 5),
                min_leaf_size: vec![2, 5],
                data_sample_ratio: vec![1.0],
                feature_sample_ratio: vec![1.0],
            },
            SearchSettings {
                n_iter: 2,
                cv_folds: 2,
                seed: 42,
            },
        )
    }

    #[test]
    fn full_training_run_produces_model_and_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::rooted_at(dir.path());
        write_processed(&paths, 40, true);
        write_processed(&paths, 16, false);

        let (distributions, settings) = quick_search();
        let training = ModelTraining::new(&paths).with_search(distributions, settings);
        training.run().unwrap();

        assert!(paths.model_file.exists());

        let runs: Vec<_> = std::fs::read_dir(&paths.tracking_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(runs.len(), 1);
        let record: crate::tracking::RunRecord = serde_json::from_str(
            &std::fs::read_to_string(runs[0].join("run.json")).unwrap(),
        )
        .unwrap();
        for name in ["accuracy", "f1_score", "precision", "recall"] {
            let value = record.metrics[name];
            assert!((0.0..=1.0).contains(&value), "{name} out of range: {value}");
        }
        assert!(record.params.contains_key("iterations"));
    }

    #[test]
    fn mismatched_columns_are_a_training_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::rooted_at(dir.path());
        write_processed(&paths, 20, true);

        // Test frame with a different feature set.
        let mut df = DataFrame::new(vec![
            Series::new("other".into(), &[1.0f64, 2.0]).into_column(),
            Series::new(LABEL_COLUMN.into(), &[0i64, 1]).into_column(),
        ])
        .unwrap();
        data_loader::write_csv(&mut df, &paths.processed_test_file).unwrap();

        let err = ModelTraining::new(&paths)
            .load_and_split_data()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Training);
    }
}
