pub mod gbdt;

pub use gbdt::{GbdtClassifier, GbdtParams};
