use tracing::info;

use crate::error::{ErrorKind, PipelineError, Result};

/// Demonstration of the error-wrapping convention: even a plain arithmetic
/// failure surfaces as a [`PipelineError`] with its origin attached.
pub fn divide_number(a: f64, b: f64) -> Result<f64> {
    if b == 0.0 {
        return Err(PipelineError::new(
            ErrorKind::InvalidInput,
            "attempted to divide by zero",
        ));
    }
    info!("dividing two numbers");
    Ok(a / b)
}
