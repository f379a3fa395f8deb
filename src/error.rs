use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClassifierError>;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Cannot find model in {path:?} or in {fallback:?}")]
    NotFound { path: PathBuf, fallback: PathBuf },

    #[error("Failed to deserialize {path:?}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("Failed to serialize {path:?}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Record error: {0}")]
    Record(String),

    #[error("Unknown model type {0}")]
    UnknownModelType(String),

    #[error("Unknown optimizer: {0}")]
    UnknownOptimizer(String),

    #[error("Must have a train set to build a new model - needed for labels and extra vocabulary")]
    MissingTrainSet,

    #[error("Could not create {name} optimizer: {reason}")]
    DependencyMissing { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Tokenized output does not line up with the input: {0}")]
    Alignment(String),

    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ClassifierError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
