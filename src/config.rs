use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ClassifierError, Result};

/// Classifier architectures this crate knows how to rebuild from a checkpoint.
/// Any other name read from a file is kept as `Unknown` and rejected when
/// the model is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelType {
    Cnn,
    Unknown(String),
}

impl ModelType {
    /// Fails with `UnknownModelType` unless this is a known architecture
    pub fn check(&self) -> Result<()> {
        match self {
            ModelType::Unknown(name) => Err(ClassifierError::UnknownModelType(name.clone())),
            _ => Ok(()),
        }
    }
}

impl FromStr for ModelType {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cnn" => Ok(ModelType::Cnn),
            _ => Err(ClassifierError::UnknownModelType(s.to_string())),
        }
    }
}

impl From<String> for ModelType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| ModelType::Unknown(value))
    }
}

impl From<ModelType> for String {
    fn from(value: ModelType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::Cnn => write!(f, "cnn"),
            ModelType::Unknown(name) => f.write_str(name),
        }
    }
}

/// Source family of the pretrained word vectors, used to derive file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordVecType {
    Word2Vec,
    GoogleNews,
    FastText,
    Other,
}

impl WordVecType {
    pub fn name(&self) -> &'static str {
        match self {
            WordVecType::Word2Vec => "word2vec",
            WordVecType::GoogleNews => "googlenews",
            WordVecType::FastText => "fasttext",
            WordVecType::Other => "other",
        }
    }
}

/// Architecture of the classifier. Persisted inside every checkpoint so the
/// model can be rebuilt before its weights are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_type: ModelType,
    pub filter_sizes: Vec<usize>,
    pub filter_channels: usize,
    pub fc_shapes: Vec<usize>,
    pub dropout: f64,
    /// Projection size for the character language model features, if used
    pub charlm_projection: Option<usize>,
    /// Width of the pretrained word vectors the model was built with.
    /// Filled in when a new model is built.
    pub word_dim: Option<usize>,
    /// Combined hidden size of the forward and backward char LMs the model
    /// was built with. Filled in when a new model is built.
    pub charlm_dim: Option<usize>,
    /// Path to a pretrained subword tokenizer (`tokenizer.json`)
    pub bert_model: Option<String>,
    pub subword_dim: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_type: ModelType::Cnn,
            filter_sizes: vec![3, 4, 5],
            filter_channels: 100,
            fc_shapes: vec![400, 100],
            dropout: 0.5,
            charlm_projection: None,
            word_dim: None,
            charlm_dim: None,
            bert_model: None,
            subword_dim: 64,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        self.model_type.check()?;
        if self.filter_sizes.is_empty() {
            return Err(ClassifierError::Config("filter_sizes must not be empty".into()));
        }
        if self.filter_sizes.iter().any(|&size| size == 0) {
            return Err(ClassifierError::Config("filter sizes must be > 0".into()));
        }
        if self.filter_channels == 0 {
            return Err(ClassifierError::Config("filter_channels must be > 0".into()));
        }
        if self.fc_shapes.iter().any(|&shape| shape == 0) {
            return Err(ClassifierError::Config("fc_shapes must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ClassifierError::Config("dropout must be within [0,1)".into()));
        }
        if self.charlm_projection == Some(0) {
            return Err(ClassifierError::Config("charlm_projection must be > 0".into()));
        }
        if self.bert_model.is_some() && self.subword_dim == 0 {
            return Err(ClassifierError::Config("subword_dim must be > 0".into()));
        }
        Ok(())
    }

    pub fn max_filter_size(&self) -> usize {
        self.filter_sizes.iter().copied().max().unwrap_or(1)
    }
}

impl fmt::Display for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_epochs")]
    pub max_epochs: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub train_file: Option<PathBuf>,
    #[serde(default)]
    pub dev_file: Option<PathBuf>,
    #[serde(default = "default_save_name")]
    pub save_name: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_epochs: default_max_epochs(),
            seed: default_seed(),
            train_file: None,
            dev_file: None,
            save_name: default_save_name(),
        }
    }
}

/// Run-time settings: where the foundation resources live, which optimizer
/// to use, and the architecture for freshly built models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierArgs {
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    #[serde(default = "default_shorthand")]
    pub shorthand: String,

    // 词向量
    #[serde(default)]
    pub wordvec_pretrain_file: Option<PathBuf>,
    #[serde(default)]
    pub wordvec_type: Option<WordVecType>,
    #[serde(default)]
    pub wordvec_raw_file: Option<PathBuf>,
    #[serde(default = "default_wordvec_dir")]
    pub wordvec_dir: PathBuf,
    #[serde(default)]
    pub pretrain_max_vocab: Option<usize>,

    // 字符语言模型
    #[serde(default)]
    pub charlm_forward_file: Option<PathBuf>,
    #[serde(default)]
    pub charlm_backward_file: Option<PathBuf>,

    // 优化器
    #[serde(default = "default_optim")]
    pub optim: String,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,

    #[serde(default)]
    pub model: ClassifierConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl Default for ClassifierArgs {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            shorthand: default_shorthand(),
            wordvec_pretrain_file: None,
            wordvec_type: None,
            wordvec_raw_file: None,
            wordvec_dir: default_wordvec_dir(),
            pretrain_max_vocab: None,
            charlm_forward_file: None,
            charlm_backward_file: None,
            optim: default_optim(),
            learning_rate: default_learning_rate(),
            momentum: default_momentum(),
            weight_decay: default_weight_decay(),
            model: ClassifierConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl ClassifierArgs {
    /// Language code, taken from the shorthand prefix (`pl_polemo2` -> `pl`)
    pub fn lang(&self) -> &str {
        self.shorthand.split('_').next().unwrap_or(&self.shorthand)
    }

    pub fn batch_size(&self) -> usize {
        self.training.batch_size
    }

    pub fn max_epochs(&self) -> usize {
        self.training.max_epochs
    }
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("saved_models/classifier")
}

fn default_shorthand() -> String {
    "pl_polemo2".to_string()
}

fn default_wordvec_dir() -> PathBuf {
    PathBuf::from("extern_data/wordvec")
}

fn default_optim() -> String {
    "sgd".to_string()
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_momentum() -> f64 {
    0.9
}

fn default_weight_decay() -> f64 {
    1e-4
}

fn default_batch_size() -> usize {
    50
}

fn default_max_epochs() -> usize {
    10
}

fn default_seed() -> u64 {
    1234
}

fn default_save_name() -> String {
    "sentiment.ckpt".to_string()
}
