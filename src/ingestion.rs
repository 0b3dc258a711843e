use polars::prelude::*;
use rand::prelude::*;
use std::fs::{self, File};
use std::time::Duration;
use tracing::{error, info};

use crate::config::{IngestionConfig, PipelineConfig};
use crate::data_loader;
use crate::error::{ErrorContext, ErrorKind, PipelineError, Result};
use crate::paths::ArtifactPaths;

const OBJECT_STORE_ENDPOINT: &str = "https://storage.googleapis.com";
const SPLIT_SEED: u64 = 42;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// First stage: fetch the raw CSV from the bucket and split it into
/// train/test files on disk.
pub struct DataIngestion {
    config: IngestionConfig,
    paths: ArtifactPaths,
    endpoint: String,
}

impl DataIngestion {
    pub fn new(config: &PipelineConfig, paths: &ArtifactPaths) -> Self {
        Self {
            config: config.data_ingestion.clone(),
            paths: paths.clone(),
            endpoint: OBJECT_STORE_ENDPOINT.to_string(),
        }
    }

    /// Point the downloader at a different object-store endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Download the configured object into the raw CSV path. One attempt,
    /// no retry.
    pub fn download_from_bucket(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.raw_dir)
            .wrap(ErrorKind::Ingestion, "failed to create raw data directory")?;

        let url = format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.config.bucket_name,
            self.config.bucket_file_name
        );
        info!("downloading {} to {}", url, self.paths.raw_file.display());

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        let response = agent.get(&url).call().wrap(
            ErrorKind::Ingestion,
            "failed to download object from bucket",
        )?;

        let mut reader = response.into_reader();
        let mut file = File::create(&self.paths.raw_file)
            .wrap(ErrorKind::Ingestion, "failed to create raw CSV file")?;
        std::io::copy(&mut reader, &mut file)
            .wrap(ErrorKind::Ingestion, "failed to write raw CSV file")?;

        info!(
            "CSV downloaded from bucket {}/{}",
            self.config.bucket_name, self.config.bucket_file_name
        );
        Ok(())
    }

    /// Split the raw CSV into train/test files at the configured ratio,
    /// with a fixed shuffle seed.
    pub fn split_data(&self) -> Result<()> {
        let ratio = self.config.train_ratio;
        if !(0.0..1.0).contains(&ratio) || ratio == 0.0 {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                format!("train_ratio must be in (0, 1), got {ratio}"),
            ));
        }

        info!("reading raw CSV for data splitting");
        let df = data_loader::load_csv(&self.paths.raw_file)?;
        let n_rows = df.height();

        let mut indices: Vec<u32> = (0..n_rows as u32).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(SPLIT_SEED));
        let split_at = (n_rows as f64 * ratio).round() as usize;
        let (train_idx, test_idx) = indices.split_at(split_at);

        let mut train = df
            .take(&IdxCa::from_vec("idx".into(), train_idx.to_vec()))
            .wrap(ErrorKind::Ingestion, "failed to materialize train split")?;
        let mut test = df
            .take(&IdxCa::from_vec("idx".into(), test_idx.to_vec()))
            .wrap(ErrorKind::Ingestion, "failed to materialize test split")?;

        data_loader::write_csv(&mut train, &self.paths.train_file)?;
        data_loader::write_csv(&mut test, &self.paths.test_file)?;
        info!(
            train_rows = train.height(),
            test_rows = test.height(),
            "train data saved to {}, test data saved to {}",
            self.paths.train_file.display(),
            self.paths.test_file.display()
        );
        Ok(())
    }

    pub fn run(&self) -> Result<()> {
        info!("starting data ingestion");
        let outcome = self
            .download_from_bucket()
            .and_then(|_| self.split_data());
        if let Err(err) = &outcome {
            error!("data ingestion failed: {err}");
        } else {
            info!("data ingestion completed successfully");
        }
        outcome
    }
}
