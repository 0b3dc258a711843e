pub mod config;
pub mod data_loader;
pub mod error;
pub mod importance;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod paths;
pub mod preprocessing;
pub mod search;
pub mod smote;
pub mod tracking;
pub mod training;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, Result};
pub use ingestion::DataIngestion;
pub use paths::ArtifactPaths;
pub use preprocessing::DataProcessor;
pub use training::ModelTraining;

/// Label column every stage splits on.
pub const LABEL_COLUMN: &str = "booking_status";
