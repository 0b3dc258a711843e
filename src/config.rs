use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{ErrorContext, ErrorKind, PipelineError, Result};

/// Full pipeline configuration, keyed by stage. Loaded once and passed by
/// reference to each stage; nothing mutates it after load.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub data_ingestion: IngestionConfig,
    pub data_processing: ProcessingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    pub bucket_name: String,
    pub bucket_file_name: String,
    /// Fraction of rows assigned to the training split.
    pub train_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    pub cat_cols: Vec<String>,
    pub num_cols: Vec<String>,
    pub skewness_threshold: f64,
    pub num_features: usize,
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::new(
                ErrorKind::NotFound,
                format!("config file not found at {}", path.display()),
            ));
        }
        let contents =
            fs::read_to_string(path).wrap(ErrorKind::Config, "failed to read config file")?;
        let config: PipelineConfig =
            serde_yaml::from_str(&contents).wrap(ErrorKind::Config, "failed to parse YAML config")?;
        info!("configuration loaded from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
data_ingestion:
  bucket_name: "booking-data"
  bucket_file_name: "Hotel_Reservations.csv"
  train_ratio: 0.8

data_processing:
  cat_cols:
    - "type_of_meal_plan"
    - "booking_status"
  num_cols:
    - "lead_time"
  skewness_threshold: 5.0
  num_features: 10
"#;

    #[test]
    fn loads_a_valid_yaml_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.data_ingestion.bucket_name, "booking-data");
        assert_eq!(config.data_ingestion.train_ratio, 0.8);
        assert_eq!(config.data_processing.cat_cols.len(), 2);
        assert_eq!(config.data_processing.num_features, 10);
    }

    #[test]
    fn missing_file_is_a_not_found_error() {
        let err = PipelineConfig::load("does/not/exist.yaml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"data_ingestion: [not, a, mapping").unwrap();

        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
