use booking_pipeline::{
    ArtifactPaths, DataIngestion, DataProcessor, ModelTraining, PipelineConfig, Result,
};
use tracing::{debug, error, info, instrument};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    if let Err(err) = run_pipeline() {
        error!("pipeline failed: {err}");
        std::process::exit(1);
    }
}

#[instrument]
fn run_pipeline() -> Result<()> {
    info!("starting booking cancellation pipeline");

    let paths = ArtifactPaths::default();
    debug!("loading config from {}", paths.config_file.display());
    let config = PipelineConfig::load(&paths.config_file)?;
    debug!(?config, "config loaded successfully");

    DataIngestion::new(&config, &paths).run()?;
    DataProcessor::new(&paths.train_file, &paths.test_file, &config, &paths).process()?;
    ModelTraining::new(&paths).run()?;

    info!(
        "pipeline complete; model saved to {}",
        paths.model_file.display()
    );
    Ok(())
}
