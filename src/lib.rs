// Library exports for use in scripts and other binaries

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod foundation;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used types
pub use config::{ClassifierArgs, ClassifierConfig};
pub use error::{ClassifierError, Result};
pub use foundation::FoundationCache;
pub use model::SentimentClassifier;
pub use training::{ClassifierTrainer, TrainOutput};
