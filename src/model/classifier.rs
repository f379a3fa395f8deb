use burn::module::{AutodiffModule, Module};
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Int, Tensor};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::checkpoint::ModelParams;
use crate::config::ClassifierConfig;
use crate::data::{PAD_ID, UNK_ID};
use crate::error::{ClassifierError, Result};
use crate::foundation::{CharLanguageModel, Pretrain, SubwordTokenizer};
use crate::model::cnn::{to_autodiff, ClassifierBatch, CnnClassifier, CnnDims};

/// Shared pretrained resources a classifier reads its inputs through.
/// None of these are part of the saved weights.
pub struct ClassifierFoundation<B: Backend> {
    pub pretrain: Arc<Pretrain>,
    pub charlm_forward: Option<Arc<CharLanguageModel<B>>>,
    pub charlm_backward: Option<Arc<CharLanguageModel<B>>>,
    pub subword: Option<Arc<SubwordTokenizer>>,
}

impl<B: Backend> ClassifierFoundation<B> {
    /// Width of the concatenated char LM features. Both directions or
    /// neither must be present.
    pub fn charlm_dim(&self) -> Result<Option<usize>> {
        match (&self.charlm_forward, &self.charlm_backward) {
            (Some(forward), Some(backward)) => Ok(Some(forward.hidden_dim() + backward.hidden_dim())),
            (None, None) => Ok(None),
            _ => Err(ClassifierError::Config(
                "charlm_forward_file and charlm_backward_file must be given together".into(),
            )),
        }
    }
}

/// The trainable CNN together with its label set, extra vocabulary and
/// foundation resources.
pub struct SentimentClassifier<B: AutodiffBackend> {
    model: CnnClassifier<B>,
    labels: Vec<String>,
    label_index: HashMap<String, usize>,
    extra_vocab: Vec<String>,
    extra_index: HashMap<String, usize>,
    foundation: ClassifierFoundation<B::InnerBackend>,
    pretrain_table: Tensor<B::InnerBackend, 2>,
    device: B::Device,
}

impl<B: AutodiffBackend> SentimentClassifier<B> {
    pub fn new(
        foundation: ClassifierFoundation<B::InnerBackend>,
        extra_vocab: Vec<String>,
        labels: Vec<String>,
        config: ClassifierConfig,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        if labels.is_empty() {
            return Err(ClassifierError::Config("the classifier needs at least one label".into()));
        }
        let word_dim = foundation.pretrain.dim();
        if config.word_dim.is_some_and(|dim| dim != word_dim) {
            return Err(ClassifierError::Config(format!(
                "model expects word vectors of width {:?}, loaded pretrain has width {}",
                config.word_dim, word_dim
            )));
        }
        let charlm_dim = foundation.charlm_dim()?;
        if config.charlm_dim != charlm_dim {
            return Err(ClassifierError::Config(format!(
                "model expects char LM features of width {:?}, loaded char LMs give {:?}",
                config.charlm_dim, charlm_dim
            )));
        }
        if config.bert_model.is_some() != foundation.subword.is_some() {
            return Err(ClassifierError::Config(format!(
                "model subword tokenizer {:?} does not match the loaded resources",
                config.bert_model
            )));
        }

        let dims = CnnDims {
            word_dim,
            extra_vocab_size: extra_vocab.len(),
            charlm_dim,
            subword_vocab_size: foundation.subword.as_ref().map(|s| s.vocab_size()),
            num_labels: labels.len(),
        };
        debug!("Building CNN classifier with {:?}", dims);
        let model = CnnClassifier::new(config, dims, device);
        let pretrain_table = foundation.pretrain.embedding::<B::InnerBackend>(device);

        let label_index = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();
        let extra_index = extra_vocab
            .iter()
            .enumerate()
            .map(|(i, word)| (word.clone(), i))
            .collect();

        Ok(Self {
            model,
            labels,
            label_index,
            extra_vocab,
            extra_index,
            foundation,
            pretrain_table,
            device: device.clone(),
        })
    }

    pub fn model(&self) -> &CnnClassifier<B> {
        &self.model
    }

    pub fn set_model(&mut self, model: CnnClassifier<B>) {
        self.model = model;
    }

    pub fn config(&self) -> &ClassifierConfig {
        self.model.config()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn extra_vocab(&self) -> &[String] {
        &self.extra_vocab
    }

    pub fn foundation(&self) -> &ClassifierFoundation<B::InnerBackend> {
        &self.foundation
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Index of a sentiment value in the label list
    pub fn label_index(&self, sentiment: i32) -> Option<usize> {
        self.label_index.get(&sentiment.to_string()).copied()
    }

    /// Weights and everything needed to rebuild the model around them.
    /// Foundation resources are left out.
    pub fn get_params(&self) -> Result<ModelParams> {
        let model = NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
            .record(self.model.clone().into_record(), ())
            .map_err(|e| ClassifierError::Record(format!("classifier weights: {:?}", e)))?;
        Ok(ModelParams {
            model,
            config: self.config().clone(),
            labels: self.labels.clone(),
            extra_vocab: self.extra_vocab.clone(),
        })
    }

    pub fn load_weights(mut self, weights: Vec<u8>) -> Result<Self> {
        self.model = self.model.load_weights(weights, &self.device)?;
        Ok(self)
    }

    pub fn build_batch(&self, sentences: &[Vec<String>]) -> Result<ClassifierBatch<B::InnerBackend>> {
        if sentences.is_empty() {
            return Err(ClassifierError::Config("cannot build an empty batch".into()));
        }
        let device = &self.device;
        let batch_size = sentences.len();
        let seq_len = sentences
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(self.config().max_filter_size());

        let mut word_ids = Vec::with_capacity(batch_size * seq_len);
        let mut extra_ids = Vec::with_capacity(batch_size * seq_len);
        for sentence in sentences {
            for position in 0..seq_len {
                match sentence.get(position) {
                    Some(word) => {
                        word_ids.push(self.foundation.pretrain.id(word) as i64);
                        extra_ids.push(self.extra_index.get(word).copied().unwrap_or(UNK_ID) as i64);
                    }
                    None => {
                        word_ids.push(PAD_ID as i64);
                        extra_ids.push(PAD_ID as i64);
                    }
                }
            }
        }

        let word_ids = Tensor::<B::InnerBackend, 1, Int>::from_ints(word_ids.as_slice(), device);
        let word_vectors = self
            .pretrain_table
            .clone()
            .select(0, word_ids)
            .reshape([batch_size, seq_len, self.foundation.pretrain.dim()]);
        let extra_ids = Tensor::<B::InnerBackend, 1, Int>::from_ints(extra_ids.as_slice(), device)
            .reshape([batch_size, seq_len]);

        let charlm_features = match (&self.foundation.charlm_forward, &self.foundation.charlm_backward) {
            (Some(forward), Some(backward)) => Some(Tensor::cat(
                vec![
                    forward.word_features(sentences, seq_len, device),
                    backward.word_features(sentences, seq_len, device),
                ],
                2,
            )),
            _ => None,
        };

        let (subword_ids, subword_mask) = match &self.foundation.subword {
            Some(tokenizer) => {
                let (ids, mask) = self.subword_inputs(tokenizer, sentences)?;
                (Some(ids), Some(mask))
            }
            None => (None, None),
        };

        Ok(ClassifierBatch {
            word_vectors,
            extra_ids,
            charlm_features,
            subword_ids,
            subword_mask,
        })
    }

    fn subword_inputs(
        &self,
        tokenizer: &SubwordTokenizer,
        sentences: &[Vec<String>],
    ) -> Result<(Tensor<B::InnerBackend, 2, Int>, Tensor<B::InnerBackend, 2>)> {
        let encoded = sentences
            .iter()
            .map(|words| tokenizer.encode_ids(&words.join(" ")))
            .collect::<Result<Vec<_>>>()?;
        let width = encoded.iter().map(Vec::len).max().unwrap_or(0).max(1);

        let mut ids = Vec::with_capacity(encoded.len() * width);
        let mut mask = Vec::with_capacity(encoded.len() * width);
        for sentence in &encoded {
            for position in 0..width {
                match sentence.get(position) {
                    Some(&id) => {
                        ids.push(id as i64);
                        mask.push(1.0f32);
                    }
                    None => {
                        ids.push(0);
                        mask.push(0.0);
                    }
                }
            }
        }

        let shape = [encoded.len(), width];
        let ids = Tensor::<B::InnerBackend, 1, Int>::from_ints(ids.as_slice(), &self.device).reshape(shape);
        let mask = Tensor::<B::InnerBackend, 1>::from_floats(mask.as_slice(), &self.device).reshape(shape);
        Ok((ids, mask))
    }

    /// Logits on the autodiff backend, for training
    pub fn forward(&self, sentences: &[Vec<String>]) -> Result<Tensor<B, 2>> {
        let batch = to_autodiff::<B>(self.build_batch(sentences)?);
        Ok(self.model.forward(batch))
    }

    /// Logits with dropout disabled and no gradient tracking
    pub fn logits(&self, sentences: &[Vec<String>]) -> Result<Tensor<B::InnerBackend, 2>> {
        let batch = self.build_batch(sentences)?;
        Ok(self.model.valid().forward(batch))
    }

    /// Predicted label index for each sentence
    pub fn predict(&self, sentences: &[Vec<String>]) -> Result<Vec<usize>> {
        if sentences.is_empty() {
            return Ok(Vec::new());
        }
        let predictions = self.logits(sentences)?.argmax(1).into_data();
        Ok(predictions.iter::<i64>().map(|id| id as usize).collect())
    }

    /// Predicted labels as strings
    pub fn predict_labels(&self, sentences: &[Vec<String>]) -> Result<Vec<String>> {
        Ok(self
            .predict(sentences)?
            .into_iter()
            .filter_map(|id| self.labels.get(id).cloned())
            .collect())
    }
}
