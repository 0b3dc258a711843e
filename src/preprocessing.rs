use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::config::{PipelineConfig, ProcessingConfig};
use crate::data_loader;
use crate::error::{ErrorContext, ErrorKind, PipelineError, Result};
use crate::importance::FeatureRanker;
use crate::paths::ArtifactPaths;
use crate::smote::Smote;
use crate::LABEL_COLUMN;

/// Identifier columns stripped before any other step. "Unnamed: 0" shows up
/// when the raw export carries a stray index column.
const ID_COLUMNS: [&str; 2] = ["Unnamed: 0", "Booking_ID"];
const SMOTE_NEIGHBORS: usize = 5;
const PROCESSING_SEED: u64 = 42;

/// Second stage: clean, encode, balance, and feature-select the split CSVs,
/// writing processed train/test files.
pub struct DataProcessor {
    train_path: PathBuf,
    test_path: PathBuf,
    config: ProcessingConfig,
    paths: ArtifactPaths,
}

impl DataProcessor {
    pub fn new(
        train_path: impl Into<PathBuf>,
        test_path: impl Into<PathBuf>,
        config: &PipelineConfig,
        paths: &ArtifactPaths,
    ) -> Self {
        Self {
            train_path: train_path.into(),
            test_path: test_path.into(),
            config: config.data_processing.clone(),
            paths: paths.clone(),
        }
    }

    /// Drop identifiers and duplicates, encode categoricals, and unskew
    /// numeric columns.
    pub fn preprocess_frame(&self, df: DataFrame) -> Result<DataFrame> {
        info!("dropping identifier columns and duplicate rows");
        let mut df = df.drop_many(ID_COLUMNS);
        df = df
            .unique_stable(None, UniqueKeepStrategy::First, None)
            .wrap(ErrorKind::Preprocessing, "failed to drop duplicate rows")?;

        info!("encoding categorical columns");
        for column in &self.config.cat_cols {
            df = encode_categorical(df, column)?;
        }

        info!("handling skewed numeric columns");
        for column in &self.config.num_cols {
            let series = df
                .column(column)
                .wrap(
                    ErrorKind::Preprocessing,
                    &format!("numeric column {column} missing from frame"),
                )?
                .as_materialized_series();
            let skewness = series
                .skew(false)
                .wrap(ErrorKind::Preprocessing, "failed to compute skewness")?
                .unwrap_or(0.0);
            if skewness > self.config.skewness_threshold {
                debug!(column = %column, skewness, "applying log1p to skewed column");
                df = log1p_column(df, column)?;
            }
        }

        Ok(df)
    }

    /// Oversample the minority class so every label is equally frequent.
    pub fn balance_frame(&self, df: DataFrame) -> Result<DataFrame> {
        info!("balancing classes with SMOTE");
        let features = df
            .drop(LABEL_COLUMN)
            .wrap(ErrorKind::Preprocessing, "label column missing before balancing")?;
        let names: Vec<String> = features
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let x = data_loader::feature_matrix(&features)?;
        let y = data_loader::label_vector(
            df.column(LABEL_COLUMN)
                .wrap(ErrorKind::Preprocessing, "label column missing before balancing")?
                .as_materialized_series(),
        )?;

        let (balanced_x, balanced_y) =
            Smote::new(SMOTE_NEIGHBORS, PROCESSING_SEED).fit_resample(&x, &y)?;
        info!(
            before = y.len(),
            after = balanced_y.len(),
            "data balancing completed"
        );
        data_loader::frame_from_matrix(&balanced_x, &names, &balanced_y, LABEL_COLUMN)
    }

    /// Rank features with an auxiliary tree model and return the top-K names.
    pub fn select_features(&self, df: &DataFrame) -> Result<Vec<String>> {
        info!("ranking feature importance");
        let features = df
            .drop(LABEL_COLUMN)
            .wrap(ErrorKind::Preprocessing, "label column missing before ranking")?;
        let names: Vec<String> = features
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let x = data_loader::feature_matrix(&features)?;
        let y = data_loader::label_vector(
            df.column(LABEL_COLUMN)
                .wrap(ErrorKind::Preprocessing, "label column missing before ranking")?
                .as_materialized_series(),
        )?;

        let ranking = FeatureRanker::new(PROCESSING_SEED).rank(&x, &y, &names)?;
        let selected: Vec<String> = ranking
            .iter()
            .take(self.config.num_features)
            .map(|entry| entry.feature.clone())
            .collect();
        info!(?selected, "selected top features");
        Ok(selected)
    }

    pub fn save_data(&self, df: &mut DataFrame, path: &Path) -> Result<()> {
        info!("saving processed data to {}", path.display());
        data_loader::write_csv(df, path)
    }

    /// The full preprocessing pass over both splits.
    pub fn process(&self) -> Result<()> {
        info!("starting data processing");
        let outcome = self.process_inner();
        if let Err(err) = &outcome {
            error!("data processing failed: {err}");
        } else {
            info!("data processing completed successfully");
        }
        outcome
    }

    fn process_inner(&self) -> Result<()> {
        let train = data_loader::load_csv(&self.train_path)?;
        let test = data_loader::load_csv(&self.test_path)?;

        let train = self.preprocess_frame(train)?;
        let test = self.preprocess_frame(test)?;

        let train = self.balance_frame(train)?;

        let selected = self.select_features(&train)?;
        let mut keep = selected;
        keep.push(LABEL_COLUMN.to_string());

        let mut train = train
            .select(keep.iter().map(String::as_str))
            .wrap(ErrorKind::Preprocessing, "failed to restrict train columns")?;
        let mut test = test
            .select(keep.iter().map(String::as_str))
            .wrap(ErrorKind::Preprocessing, "failed to restrict test columns")?;

        self.save_data(&mut train, &self.paths.processed_train_file)?;
        self.save_data(&mut test, &self.paths.processed_test_file)?;
        Ok(())
    }
}

/// Replace a string column with sorted-class integer codes in
/// `[0, num_classes)`.
fn encode_categorical(mut df: DataFrame, column: &str) -> Result<DataFrame> {
    let (encoded, n_classes) = {
        let series = df
            .column(column)
            .wrap(
                ErrorKind::Preprocessing,
                &format!("categorical column {column} missing from frame"),
            )?
            .as_materialized_series();
        let strings = series.str().wrap(
            ErrorKind::Preprocessing,
            &format!("categorical column {column} is not a string column"),
        )?;

        let classes: BTreeSet<&str> = strings.into_iter().flatten().collect();
        let codes: HashMap<&str, i64> = classes
            .iter()
            .enumerate()
            .map(|(code, &class)| (class, code as i64))
            .collect();

        let encoded: Vec<i64> = strings
            .into_iter()
            .map(|value| {
                value.map(|class| codes[class]).ok_or_else(|| {
                    PipelineError::new(
                        ErrorKind::Preprocessing,
                        format!("null value in categorical column {column}"),
                    )
                })
            })
            .collect::<Result<_>>()?;
        (encoded, classes.len())
    };

    debug!(column = %column, classes = n_classes, "encoded categorical column");
    df.replace(column, Series::new(column.into(), encoded))
        .wrap(ErrorKind::Preprocessing, "failed to replace encoded column")?;
    Ok(df)
}

fn log1p_column(mut df: DataFrame, column: &str) -> Result<DataFrame> {
    let series = df
        .column(column)
        .wrap(
            ErrorKind::Preprocessing,
            &format!("numeric column {column} missing from frame"),
        )?
        .as_materialized_series()
        .cast(&DataType::Float64)
        .wrap(ErrorKind::Preprocessing, "failed to cast column to f64")?;
    let values = series
        .f64()
        .wrap(ErrorKind::Preprocessing, "failed to read column as f64")?;
    let transformed = values.apply_values(|v| v.ln_1p());

    df.replace(column, transformed.into_series())
        .wrap(ErrorKind::Preprocessing, "failed to replace transformed column")?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestionConfig;
    use crate::smote::class_counts;

    fn test_config(cat_cols: Vec<&str>, num_cols: Vec<&str>, num_features: usize) -> PipelineConfig {
        PipelineConfig {
            data_ingestion: IngestionConfig {
                bucket_name: "bucket".to_string(),
                bucket_file_name: "object.csv".to_string(),
                train_ratio: 0.8,
            },
            data_processing: ProcessingConfig {
                cat_cols: cat_cols.into_iter().map(String::from).collect(),
                num_cols: num_cols.into_iter().map(String::from).collect(),
                skewness_threshold: 5.0,
                num_features,
            },
        }
    }

    fn processor(config: &PipelineConfig, paths: &ArtifactPaths) -> DataProcessor {
        DataProcessor::new(&paths.train_file, &paths.test_file, config, paths)
    }

    fn booking_frame(rows: usize) -> DataFrame {
        let meal_plans = ["Meal Plan 1", "Meal Plan 2", "Not Selected"];
        let statuses = ["Canceled", "Not_Canceled"];
        let ids: Vec<String> = (0..rows).map(|i| format!("INN{i:05}")).collect();
        let plans: Vec<&str> = (0..rows).map(|i| meal_plans[i % 3]).collect();
        let lead_time: Vec<f64> = (0..rows).map(|i| i as f64).collect();
        let price: Vec<f64> = (0..rows).map(|i| 80.0 + (i % 40) as f64).collect();
        // Two thirds of the rows keep their booking.
        let status: Vec<&str> = (0..rows).map(|i| statuses[usize::from(i % 3 != 0)]).collect();

        DataFrame::new(vec![
            Series::new("Booking_ID".into(), ids).into_column(),
            Series::new("type_of_meal_plan".into(), plans).into_column(),
            Series::new("lead_time".into(), lead_time).into_column(),
            Series::new("avg_price_per_room".into(), price).into_column(),
            Series::new(LABEL_COLUMN.into(), status).into_column(),
        ])
        .unwrap()
    }

    #[test]
    fn categorical_codes_cover_zero_to_num_classes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::rooted_at(dir.path());
        let config = test_config(
            vec!["type_of_meal_plan", LABEL_COLUMN],
            vec!["lead_time", "avg_price_per_room"],
            2,
        );

        let df = processor(&config, &paths)
            .preprocess_frame(booking_frame(30))
            .unwrap();

        assert!(!df.get_column_names_str().contains(&"Booking_ID"));
        for column in ["type_of_meal_plan", LABEL_COLUMN] {
            let values = data_loader::label_vector(
                df.column(column).unwrap().as_materialized_series(),
            )
            .unwrap();
            let distinct: BTreeSet<i64> = values.iter().copied().collect();
            let max = *distinct.iter().max().unwrap();
            assert!(*distinct.iter().min().unwrap() >= 0);
            assert_eq!(max as usize + 1, distinct.len());
        }
    }

    #[test]
    fn duplicate_rows_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::rooted_at(dir.path());
        let config = test_config(vec![LABEL_COLUMN], vec![], 1);

        let df = DataFrame::new(vec![
            Series::new("lead_time".into(), &[1.0f64, 1.0, 2.0]).into_column(),
            Series::new(LABEL_COLUMN.into(), &["Canceled", "Canceled", "Not_Canceled"])
                .into_column(),
        ])
        .unwrap();

        let processed = processor(&config, &paths).preprocess_frame(df).unwrap();
        assert_eq!(processed.height(), 2);
    }

    #[test]
    fn balanced_labels_are_equal_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::rooted_at(dir.path());
        let config = test_config(
            vec!["type_of_meal_plan", LABEL_COLUMN],
            vec!["lead_time"],
            2,
        );
        let processor = processor(&config, &paths);

        let prepared = processor.preprocess_frame(booking_frame(30)).unwrap();
        let balanced = processor.balance_frame(prepared).unwrap();

        let labels = data_loader::label_vector(
            balanced
                .column(LABEL_COLUMN)
                .unwrap()
                .as_materialized_series(),
        )
        .unwrap();
        let counts = class_counts(&labels);
        assert_eq!(counts.len(), 2);
        let values: Vec<usize> = counts.values().copied().collect();
        assert_eq!(values[0], values[1]);
    }

    #[test]
    fn skewed_columns_are_log_transformed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::rooted_at(dir.path());
        let mut config = test_config(vec![LABEL_COLUMN], vec!["lead_time"], 1);
        config.data_processing.skewness_threshold = 2.0;

        // One extreme outlier makes lead_time heavily right-skewed.
        let mut lead_time = vec![1.0f64; 20];
        lead_time.push(100_000.0);
        let mut status = vec!["Canceled"; 10];
        status.extend(vec!["Not_Canceled"; 11]);
        let df = DataFrame::new(vec![
            Series::new("row".into(), (0..21i64).collect::<Vec<_>>()).into_column(),
            Series::new("lead_time".into(), lead_time).into_column(),
            Series::new(LABEL_COLUMN.into(), status).into_column(),
        ])
        .unwrap();

        let processed = processor(&config, &paths).preprocess_frame(df).unwrap();
        let max = processed
            .column("lead_time")
            .unwrap()
            .as_materialized_series()
            .max::<f64>()
            .unwrap()
            .unwrap();
        assert!(max < 13.0, "expected log1p-compressed values, got {max}");
    }

    #[test]
    fn processed_test_columns_match_train_columns() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::rooted_at(dir.path());
        let config = test_config(
            vec!["type_of_meal_plan", LABEL_COLUMN],
            vec!["lead_time", "avg_price_per_room"],
            2,
        );

        std::fs::create_dir_all(&paths.raw_dir).unwrap();
        let mut train = booking_frame(40);
        let mut test = booking_frame(12);
        data_loader::write_csv(&mut train, &paths.train_file).unwrap();
        data_loader::write_csv(&mut test, &paths.test_file).unwrap();

        processor(&config, &paths).process().unwrap();

        let processed_train = data_loader::load_csv(&paths.processed_train_file).unwrap();
        let processed_test = data_loader::load_csv(&paths.processed_test_file).unwrap();
        assert_eq!(
            processed_train.get_column_names(),
            processed_test.get_column_names()
        );
        // top-K features plus the label column
        assert_eq!(processed_train.width(), 3);
    }
}
