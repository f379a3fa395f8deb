use burn::tensor::{backend::Backend, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::data::sentiment::{PAD, UNK, UNK_ID};
use crate::error::{ClassifierError, Result};
use crate::utils::{read_record, write_record};

#[derive(Debug, Serialize, Deserialize)]
struct PretrainRecord {
    words: Vec<String>,
    dim: usize,
    vectors: Vec<f32>,
}

/// Pretrained word vectors: a vocabulary starting with `<PAD>`, `<UNK>` and
/// a row-major `[vocab, dim]` table.
#[derive(Debug, Clone)]
pub struct Pretrain {
    words: Vec<String>,
    index: HashMap<String, usize>,
    dim: usize,
    vectors: Vec<f32>,
}

impl Pretrain {
    pub fn new(words: Vec<String>, dim: usize, vectors: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(ClassifierError::Config("pretrain dimension must be > 0".into()));
        }
        if vectors.len() != words.len() * dim {
            return Err(ClassifierError::Config(format!(
                "pretrain has {} words of dim {} but {} values",
                words.len(),
                dim,
                vectors.len()
            )));
        }
        let index = words
            .iter()
            .enumerate()
            .map(|(id, word)| (word.clone(), id))
            .collect();
        Ok(Self {
            words,
            index,
            dim,
            vectors,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let record: PretrainRecord = read_record(path)?;
        let pretrain = Self::new(record.words, record.dim, record.vectors)?;
        debug!("Embedding shape: [{}, {}]", pretrain.len(), pretrain.dim);
        Ok(pretrain)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let record = PretrainRecord {
            words: self.words.clone(),
            dim: self.dim,
            vectors: self.vectors.clone(),
        };
        write_record(path, &record)?;
        info!("Saved pretrain ({} words) to {:?}", self.len(), path);
        Ok(())
    }

    /// Read a text vector file and store it as `pretrain_file` for next time.
    pub fn build(pretrain_file: &Path, vec_file: &Path, max_vocab: Option<usize>) -> Result<Self> {
        info!("Building pretrain from {:?}", vec_file);
        let content = fs::read_to_string(vec_file).map_err(|e| ClassifierError::io(vec_file, e))?;
        let pretrain = Self::from_text_vectors(&content, max_vocab)?;
        pretrain.save(pretrain_file)?;
        Ok(pretrain)
    }

    /// Parse word2vec/fastText style text: an optional `<count> <dim>` header,
    /// then `<word> <v1> ... <vdim>` per line.
    pub fn from_text_vectors(content: &str, max_vocab: Option<usize>) -> Result<Self> {
        let mut lines = content.lines().peekable();
        if let Some(first) = lines.peek() {
            let fields: Vec<&str> = first.split_whitespace().collect();
            if fields.len() == 2 && fields.iter().all(|f| f.parse::<usize>().is_ok()) {
                lines.next();
            }
        }

        let mut words = vec![PAD.to_string(), UNK.to_string()];
        let mut seen: HashSet<String> = HashSet::new();
        let mut rows: Vec<f32> = Vec::new();
        let mut dim = 0;
        let mut skipped = 0usize;

        for line in lines {
            if max_vocab.is_some_and(|max| words.len() - 2 >= max) {
                break;
            }
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let values: std::result::Result<Vec<f32>, _> = fields.map(str::parse::<f32>).collect();
            let Ok(values) = values else {
                skipped += 1;
                continue;
            };
            if dim == 0 {
                dim = values.len();
            }
            if values.is_empty() || values.len() != dim || seen.contains(word) {
                skipped += 1;
                continue;
            }
            seen.insert(word.to_string());
            words.push(word.to_string());
            rows.extend(values);
        }

        if dim == 0 {
            return Err(ClassifierError::Config("no word vectors found".into()));
        }
        if skipped > 0 {
            warn!("Skipped {} malformed or duplicate vector lines", skipped);
        }

        let mut vectors = vec![0.0; 2 * dim];
        vectors.extend(rows);
        Self::new(words, dim, vectors)
    }

    /// Id of `word`, falling back to its lowercase form and then `<UNK>`
    pub fn id(&self, word: &str) -> usize {
        self.index
            .get(word)
            .or_else(|| self.index.get(&word.to_lowercase()))
            .copied()
            .unwrap_or(UNK_ID)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn embedding<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.vectors.clone(), [self.len(), self.dim]),
            device,
        )
    }
}
