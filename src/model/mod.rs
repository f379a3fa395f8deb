pub mod classifier;
pub mod cnn;
pub mod optimizer;

pub use classifier::{ClassifierFoundation, SentimentClassifier};
pub use cnn::{ClassifierBatch, CnnClassifier, CnnDims};
pub use optimizer::{build_optimizer, ClassifierOptimizer, OptimizerKind, OptimizerSettings};
