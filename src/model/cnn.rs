use burn::constant;
use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::activation::relu;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Int, Tensor};

use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};

constant!(ClassifierConfig);

/// Inputs for one forward pass. Word vectors come from the frozen pretrain
/// table; everything trainable is looked up inside the model.
#[derive(Clone, Debug)]
pub struct ClassifierBatch<B: Backend> {
    /// `[batch, seq, word_dim]`
    pub word_vectors: Tensor<B, 3>,
    /// `[batch, seq]` ids into the extra vocabulary
    pub extra_ids: Tensor<B, 2, Int>,
    /// `[batch, seq, charlm_dim]`
    pub charlm_features: Option<Tensor<B, 3>>,
    /// `[batch, subwords]`
    pub subword_ids: Option<Tensor<B, 2, Int>>,
    /// `[batch, subwords]`, 1.0 for real subwords and 0.0 for padding
    pub subword_mask: Option<Tensor<B, 2>>,
}

impl<B: Backend> ClassifierBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.word_vectors.dims()[0]
    }
}

/// Move a batch built on the inner backend onto the autodiff backend.
pub fn to_autodiff<B: AutodiffBackend>(batch: ClassifierBatch<B::InnerBackend>) -> ClassifierBatch<B> {
    ClassifierBatch {
        word_vectors: Tensor::from_inner(batch.word_vectors),
        extra_ids: Tensor::from_inner(batch.extra_ids),
        charlm_features: batch.charlm_features.map(Tensor::from_inner),
        subword_ids: batch.subword_ids.map(Tensor::from_inner),
        subword_mask: batch.subword_mask.map(Tensor::from_inner),
    }
}

/// Sizes that come from the foundation resources and the training set
/// rather than from the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CnnDims {
    pub word_dim: usize,
    pub extra_vocab_size: usize,
    pub charlm_dim: Option<usize>,
    pub subword_vocab_size: Option<usize>,
    pub num_labels: usize,
}

#[derive(Module, Debug)]
pub struct CnnClassifier<B: Backend> {
    #[module(skip)]
    config: ClassifierConfig,
    extra_embedding: Embedding<B>,
    charlm_projection: Option<Linear<B>>,
    subword_embedding: Option<Embedding<B>>,
    convs: Vec<Conv1d<B>>,
    fc_layers: Vec<Linear<B>>,
    output: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> CnnClassifier<B> {
    pub fn new(config: ClassifierConfig, dims: CnnDims, device: &B::Device) -> Self {
        let extra_embedding = EmbeddingConfig::new(dims.extra_vocab_size, dims.word_dim).init(device);

        let charlm_projection = match (dims.charlm_dim, config.charlm_projection) {
            (Some(charlm_dim), Some(projection)) => {
                Some(LinearConfig::new(charlm_dim, projection).init(device))
            }
            _ => None,
        };
        let charlm_width = match (dims.charlm_dim, config.charlm_projection) {
            (Some(_), Some(projection)) => projection,
            (Some(charlm_dim), None) => charlm_dim,
            (None, _) => 0,
        };

        let conv_input = dims.word_dim + charlm_width;
        let convs = config
            .filter_sizes
            .iter()
            .map(|&width| Conv1dConfig::new(conv_input, config.filter_channels, width).init(device))
            .collect();

        let subword_embedding = dims
            .subword_vocab_size
            .map(|vocab| EmbeddingConfig::new(vocab, config.subword_dim).init(device));
        let subword_width = if subword_embedding.is_some() {
            config.subword_dim
        } else {
            0
        };

        let mut previous = config.filter_sizes.len() * config.filter_channels + subword_width;
        let mut fc_layers = Vec::with_capacity(config.fc_shapes.len());
        for &shape in &config.fc_shapes {
            fc_layers.push(LinearConfig::new(previous, shape).init(device));
            previous = shape;
        }
        let output = LinearConfig::new(previous, dims.num_labels).init(device);
        let dropout = DropoutConfig::new(config.dropout).init();

        Self {
            config,
            extra_embedding,
            charlm_projection,
            subword_embedding,
            convs,
            fc_layers,
            output,
            dropout,
        }
    }

    /// Logits `[batch, num_labels]`
    pub fn forward(&self, batch: ClassifierBatch<B>) -> Tensor<B, 2> {
        let batch_size = batch.batch_size();
        let mut inputs = batch.word_vectors + self.extra_embedding.forward(batch.extra_ids);

        if let Some(features) = batch.charlm_features {
            let features = match &self.charlm_projection {
                Some(projection) => projection.forward(features),
                None => features,
            };
            inputs = Tensor::cat(vec![inputs, features], 2);
        }

        // [batch, channels, seq] for the convolutions
        let inputs = self.dropout.forward(inputs).swap_dims(1, 2);
        let channels = self.config.filter_channels;
        let mut pooled: Vec<Tensor<B, 2>> = self
            .convs
            .iter()
            .map(|conv| {
                relu(conv.forward(inputs.clone()))
                    .max_dim(2)
                    .reshape([batch_size, channels])
            })
            .collect();

        if let (Some(embedding), Some(ids), Some(mask)) =
            (&self.subword_embedding, batch.subword_ids, batch.subword_mask)
        {
            let dim = self.config.subword_dim;
            let summed = (embedding.forward(ids) * mask.clone().unsqueeze_dim::<3>(2))
                .sum_dim(1)
                .reshape([batch_size, dim]);
            let counts = mask.sum_dim(1).clamp_min(1.0);
            pooled.push(summed / counts);
        }

        let mut hidden = Tensor::cat(pooled, 1);
        for fc in &self.fc_layers {
            hidden = relu(fc.forward(self.dropout.forward(hidden)));
        }
        self.output.forward(self.dropout.forward(hidden))
    }

    /// Load named weights written by `into_record`. Entries this model has
    /// no place for are ignored. Optional sub-modules the weights leave out
    /// keep their current parameters.
    pub fn load_weights(self, weights: Vec<u8>, device: &B::Device) -> Result<Self> {
        let mut record: CnnClassifierRecord<B> = Recorder::<B>::load(
            &NamedMpkBytesRecorder::<FullPrecisionSettings>::new(),
            weights,
            device,
        )
        .map_err(|e| ClassifierError::Record(format!("classifier weights: {:?}", e)))?;

        if record.charlm_projection.is_none() {
            record.charlm_projection = self.charlm_projection.clone().map(Module::into_record);
        }
        if record.subword_embedding.is_none() {
            record.subword_embedding = self.subword_embedding.clone().map(Module::into_record);
        }
        Ok(self.load_record(record))
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn num_labels(&self) -> usize {
        self.output.weight.dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn dims() -> CnnDims {
        CnnDims {
            word_dim: 4,
            extra_vocab_size: 6,
            charlm_dim: None,
            subword_vocab_size: None,
            num_labels: 3,
        }
    }

    fn config() -> ClassifierConfig {
        ClassifierConfig {
            filter_sizes: vec![1, 2],
            filter_channels: 5,
            fc_shapes: vec![7],
            dropout: 0.0,
            ..ClassifierConfig::default()
        }
    }

    fn batch(device: &<TestBackend as Backend>::Device) -> ClassifierBatch<TestBackend> {
        ClassifierBatch {
            word_vectors: Tensor::ones([2, 3, 4], device),
            extra_ids: Tensor::<TestBackend, 1, Int>::from_ints([2, 3, 0, 1, 4, 5], device)
                .reshape([2, 3]),
            charlm_features: None,
            subword_ids: None,
            subword_mask: None,
        }
    }

    fn weight_bytes(record: CnnClassifierRecord<TestBackend>) -> Vec<u8> {
        Recorder::<TestBackend>::record(&NamedMpkBytesRecorder::<FullPrecisionSettings>::new(), record, ())
            .unwrap()
    }

    fn values(tensor: Tensor<TestBackend, 2>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = CnnClassifier::<TestBackend>::new(config(), dims(), &device);
        assert_eq!(model.num_labels(), 3);

        let logits = model.forward(batch(&device));
        assert_eq!(logits.dims(), [2, 3]);
    }

    #[test]
    fn test_forward_with_charlm_and_subwords() {
        let device = Default::default();
        let dims = CnnDims {
            charlm_dim: Some(6),
            subword_vocab_size: Some(10),
            ..dims()
        };
        let config = ClassifierConfig {
            charlm_projection: Some(3),
            bert_model: Some("tokenizer.json".to_string()),
            subword_dim: 8,
            ..config()
        };
        let model = CnnClassifier::<TestBackend>::new(config, dims, &device);

        let mut batch = batch(&device);
        batch.charlm_features = Some(Tensor::zeros([2, 3, 6], &device));
        batch.subword_ids =
            Some(Tensor::<TestBackend, 1, Int>::from_ints([1, 2, 3, 4, 0, 0], &device).reshape([2, 3]));
        batch.subword_mask = Some(
            Tensor::<TestBackend, 1>::from_floats([1.0, 1.0, 1.0, 1.0, 0.0, 0.0], &device)
                .reshape([2, 3]),
        );

        let logits = model.forward(batch);
        assert_eq!(logits.dims(), [2, 3]);
    }

    #[test]
    fn test_load_weights_ignores_extra_entries() {
        let device = Default::default();
        let source = CnnClassifier::<TestBackend>::new(config(), dims(), &device);
        let mut record = source.clone().into_record();
        record.charlm_projection = Some(LinearConfig::new(6, 3).init::<TestBackend>(&device).into_record());

        let loaded = CnnClassifier::<TestBackend>::new(config(), dims(), &device)
            .load_weights(weight_bytes(record), &device)
            .unwrap();
        assert!(loaded.charlm_projection.is_none());
        assert_eq!(values(loaded.forward(batch(&device))), values(source.forward(batch(&device))));
    }

    #[test]
    fn test_load_weights_keeps_missing_optional_modules() {
        let device = Default::default();
        let dims = CnnDims {
            charlm_dim: Some(6),
            ..dims()
        };
        let config = ClassifierConfig {
            charlm_projection: Some(3),
            ..config()
        };
        let source = CnnClassifier::<TestBackend>::new(config.clone(), dims, &device);
        let mut record = source.clone().into_record();
        record.charlm_projection = None;

        let target = CnnClassifier::<TestBackend>::new(config, dims, &device);
        let projection = target
            .charlm_projection
            .as_ref()
            .map(|linear| values(linear.weight.val()));
        let loaded = target.load_weights(weight_bytes(record), &device).unwrap();

        assert!(projection.is_some());
        assert_eq!(
            loaded.charlm_projection.as_ref().map(|linear| values(linear.weight.val())),
            projection
        );
        assert_eq!(values(loaded.output.weight.val()), values(source.output.weight.val()));

        let mut batch = batch(&device);
        batch.charlm_features = Some(Tensor::zeros([2, 3, 6], &device));
        assert_eq!(loaded.forward(batch).dims(), [2, 3]);
    }

    #[test]
    fn test_load_weights_rejects_garbage() {
        let device = Default::default();
        let result = CnnClassifier::<TestBackend>::new(config(), dims(), &device)
            .load_weights(b"not a record".to_vec(), &device);
        assert!(matches!(result, Err(ClassifierError::Record(_))));
    }
}
