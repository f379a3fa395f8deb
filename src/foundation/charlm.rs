use burn::constant;
use burn::module::Module;
use burn::nn::{Embedding, EmbeddingConfig, Lstm, LstmConfig};
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::{backend::Backend, Int, Tensor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::data::CharVocab;
use crate::error::{ClassifierError, Result};
use crate::utils::{read_record, write_record};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharLmConfig {
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    /// Reads text left to right when true, right to left otherwise
    pub is_forward: bool,
}

impl fmt::Display for CharLmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

constant!(CharLmConfig);
constant!(CharVocab);

#[derive(Serialize, Deserialize)]
struct CharLmFile {
    config: CharLmConfig,
    vocab: CharVocab,
    weights: Vec<u8>,
}

/// Pretrained character language model. Only its hidden states are used:
/// the state at the space following each word becomes that word's feature.
#[derive(Module, Debug)]
pub struct CharLanguageModel<B: Backend> {
    #[module(skip)]
    config: CharLmConfig,
    #[module(skip)]
    vocab: CharVocab,
    char_embed: Embedding<B>,
    lstm: Lstm<B>,
}

impl<B: Backend> CharLanguageModel<B> {
    pub fn new(config: CharLmConfig, vocab: CharVocab, device: &B::Device) -> Self {
        let char_embed = EmbeddingConfig::new(vocab.len(), config.embedding_dim).init(device);
        let lstm = LstmConfig::new(config.embedding_dim, config.hidden_dim, true).init(device);
        Self {
            config,
            vocab,
            char_embed,
            lstm,
        }
    }

    pub fn load(path: &Path, device: &B::Device) -> Result<Self> {
        let file: CharLmFile = read_record(path)?;
        let mut vocab = file.vocab;
        vocab.rebuild_index();

        let model = Self::new(file.config, vocab, device);
        let record = NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
            .load(file.weights, device)
            .map_err(|e| ClassifierError::Record(format!("charlm {:?}: {:?}", path, e)))?;
        let model = model.load_record(record);

        debug!(
            "Loaded {} charlm from {:?} (hidden {})",
            if model.is_forward() { "forward" } else { "backward" },
            path,
            model.hidden_dim()
        );
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let weights = NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
            .record(self.clone().into_record(), ())
            .map_err(|e| ClassifierError::Record(format!("charlm {:?}: {:?}", path, e)))?;
        let file = CharLmFile {
            config: self.config.clone(),
            vocab: self.vocab.clone(),
            weights,
        };
        write_record(path, &file)?;
        info!("Charlm saved to {:?}", path);
        Ok(())
    }

    pub fn hidden_dim(&self) -> usize {
        self.config.hidden_dim
    }

    pub fn is_forward(&self) -> bool {
        self.config.is_forward
    }

    /// Per-word features `[batch, seq_len, hidden]`; sentences longer than
    /// `seq_len` are truncated, shorter ones zero padded.
    pub fn word_features(
        &self,
        sentences: &[Vec<String>],
        seq_len: usize,
        device: &B::Device,
    ) -> Tensor<B, 3> {
        let per_sentence = sentences
            .iter()
            .map(|words| self.sentence_features(words, seq_len, device))
            .collect();
        Tensor::cat(per_sentence, 0)
    }

    fn sentence_features(&self, words: &[String], seq_len: usize, device: &B::Device) -> Tensor<B, 3> {
        let hidden = self.config.hidden_dim;
        let words = &words[..words.len().min(seq_len)];
        if words.is_empty() {
            return Tensor::zeros([1, seq_len, hidden], device);
        }

        let (text, positions) = self.char_layout(words);
        let ids = self.vocab.encode(&text);
        let num_chars = ids.len();
        let ids = Tensor::<B, 1, Int>::from_ints(ids.as_slice(), device).reshape([1, num_chars]);

        let embedded = self.char_embed.forward(ids);
        let (output, _) = self.lstm.forward(embedded, None);

        let positions: Vec<i64> = positions.iter().map(|&p| p as i64).collect();
        let num_words = positions.len();
        let picked = output.select(1, Tensor::<B, 1, Int>::from_ints(positions.as_slice(), device));

        if num_words < seq_len {
            let padding = Tensor::zeros([1, seq_len - num_words, hidden], device);
            Tensor::cat(vec![picked, padding], 1)
        } else {
            picked
        }
    }

    /// Space-delimited character sequence in reading order and, for each word
    /// in sentence order, the index of the space read right after it.
    fn char_layout(&self, words: &[String]) -> (String, Vec<usize>) {
        let forward = self.config.is_forward;
        let ordered: Vec<String> = if forward {
            words.to_vec()
        } else {
            words.iter().rev().map(|w| w.chars().rev().collect()).collect()
        };

        let mut text = String::from(" ");
        let mut positions = Vec::with_capacity(ordered.len());
        let mut offset = 1;
        for word in &ordered {
            offset += word.chars().count();
            text.push_str(word);
            text.push(' ');
            positions.push(offset);
            offset += 1;
        }
        if !forward {
            positions.reverse();
        }
        (text, positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn charlm(is_forward: bool) -> CharLanguageModel<TestBackend> {
        let config = CharLmConfig {
            embedding_dim: 4,
            hidden_dim: 6,
            is_forward,
        };
        CharLanguageModel::new(config, CharVocab::from_text("abc żółw"), &Default::default())
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_char_layout_forward_and_backward() {
        let (text, positions) = charlm(true).char_layout(&words(&["ab", "c"]));
        assert_eq!(text, " ab c ");
        assert_eq!(positions, vec![3, 5]);

        let (text, positions) = charlm(false).char_layout(&words(&["ab", "c"]));
        assert_eq!(text, " c ba ");
        assert_eq!(positions, vec![5, 2]);
    }

    #[test]
    fn test_word_features_shape() {
        let model = charlm(true);
        let sentences = vec![words(&["żółw", "abc"]), words(&[]), words(&["a", "b", "c", "a"])];
        let features = model.word_features(&sentences, 3, &Default::default());
        assert_eq!(features.dims(), [3, 3, 6]);
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pl_forward.charlm");
        let device = Default::default();
        let model = charlm(true);
        model.save(&path).unwrap();

        let loaded = CharLanguageModel::<TestBackend>::load(&path, &device).unwrap();
        assert!(loaded.is_forward());
        let sentences = vec![words(&["abc", "żółw"])];
        let expected = model.word_features(&sentences, 2, &device).into_data().to_vec::<f32>().unwrap();
        let actual = loaded.word_features(&sentences, 2, &device).into_data().to_vec::<f32>().unwrap();
        assert_eq!(expected, actual);
    }
}
