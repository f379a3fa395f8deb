mod trainer;

pub use trainer::{ClassifierTrainer, TrainOutput};
