use burn::nn::loss::CrossEntropyLoss;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Int, Tensor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::checkpoint::{
    read_checkpoint, resolve_checkpoint_path, write_checkpoint, CheckpointRecord, OptimizerState,
};
use crate::config::{ClassifierArgs, ModelType};
use crate::data::{dataset_labels, dataset_vocab, SentimentDatum};
use crate::error::{ClassifierError, Result};
use crate::foundation::{FoundationCache, Pretrain};
use crate::model::{
    build_optimizer, ClassifierFoundation, ClassifierOptimizer, OptimizerSettings,
    SentimentClassifier,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainOutput {
    pub loss: f32,
    pub step: usize,
}

/// A classifier plus what is needed to keep training it: the optimizer and
/// the progress counters that are saved with each checkpoint.
pub struct ClassifierTrainer<B: AutodiffBackend> {
    pub classifier: SentimentClassifier<B>,
    pub optimizer: Option<Box<dyn ClassifierOptimizer<B>>>,
    pub epochs_trained: usize,
    pub global_step: usize,
    pub best_score: Option<f64>,
    loss_fn: CrossEntropyLoss<B>,
}

impl<B: AutodiffBackend> ClassifierTrainer<B> {
    pub fn new(
        classifier: SentimentClassifier<B>,
        optimizer: Option<Box<dyn ClassifierOptimizer<B>>>,
        epochs_trained: usize,
        global_step: usize,
        best_score: Option<f64>,
    ) -> Self {
        let loss_fn = CrossEntropyLoss::new(None, classifier.device());
        Self {
            classifier,
            optimizer,
            epochs_trained,
            global_step,
            best_score,
            loss_fn,
        }
    }

    /// Write the model, counters and optionally the optimizer state to
    /// `path`. `epochs_trained` overrides the stored counter when given.
    pub fn save(&self, path: &Path, epochs_trained: Option<usize>, save_optimizer: bool) -> Result<()> {
        let optimizer_state_dict = match (&self.optimizer, save_optimizer) {
            (Some(optimizer), true) => Some(OptimizerState {
                kind: optimizer.kind(),
                state: optimizer.state_dict()?,
            }),
            _ => None,
        };
        let checkpoint = CheckpointRecord {
            params: self.classifier.get_params()?,
            epochs_trained: epochs_trained.unwrap_or(self.epochs_trained),
            global_step: self.global_step,
            best_score: self.best_score,
            optimizer_state_dict,
        };
        write_checkpoint(path, &checkpoint)?;
        info!("Model saved to {:?}", path);
        Ok(())
    }

    /// Load a checkpoint from `path`, or from `path` under `args.save_dir`
    /// when `path` does not exist.
    ///
    /// Foundation resources come from `args` and are shared through `cache`
    /// when one is passed. With `load_optimizer`, an optimizer is built from
    /// `args` and its saved state restored if the checkpoint has state for
    /// the same kind of optimizer.
    pub fn load(
        path: &Path,
        args: &ClassifierArgs,
        cache: Option<&mut FoundationCache<B::InnerBackend>>,
        load_optimizer: bool,
        device: &B::Device,
    ) -> Result<Self> {
        let path = resolve_checkpoint_path(path, &args.save_dir)?;
        let checkpoint = read_checkpoint(&path).map_err(|e| {
            error!("Cannot load model from {:?}", path);
            e
        })?;
        debug!("Loaded model {:?}", path);

        let CheckpointRecord {
            params,
            epochs_trained,
            global_step,
            best_score,
            optimizer_state_dict,
        } = checkpoint;

        let mut scratch = FoundationCache::default();
        let cache = cache.unwrap_or(&mut scratch);
        let foundation = Self::load_foundation(args, params.config.bert_model.as_deref(), cache, device)?;

        let classifier = match params.config.model_type.clone() {
            ModelType::Cnn => SentimentClassifier::new(
                foundation,
                params.extra_vocab,
                params.labels,
                params.config,
                device,
            )?,
            ModelType::Unknown(name) => return Err(ClassifierError::UnknownModelType(name)),
        };
        let classifier = classifier.load_weights(params.model)?;

        debug!("-- MODEL CONFIG --");
        debug!("  {}", classifier.config());
        debug!("  labels: {:?}", classifier.labels());

        let optimizer = if load_optimizer {
            let optimizer = Self::build_optimizer(args)?;
            Some(match optimizer_state_dict {
                Some(saved) if saved.kind == optimizer.kind() => {
                    debug!("Restoring {} optimizer state", saved.kind);
                    optimizer.load_state_dict(saved.state, device)?
                }
                Some(saved) => {
                    info!(
                        "Saved optimizer state is for {}, not {}.  Creating new optimizer",
                        saved.kind,
                        optimizer.kind()
                    );
                    optimizer
                }
                None => {
                    info!("Attempted to load optimizer to resume training, but optimizer not saved.  Creating new optimizer");
                    optimizer
                }
            })
        } else {
            None
        };

        Ok(Self::new(classifier, optimizer, epochs_trained, global_step, best_score))
    }

    /// Fresh model and optimizer. Labels and the extra vocabulary come from
    /// `train_set`, which is required.
    pub fn build_new_model(
        args: &ClassifierArgs,
        train_set: Option<&[SentimentDatum]>,
        device: &B::Device,
    ) -> Result<Self> {
        let train_set = match train_set {
            Some(data) if !data.is_empty() => data,
            _ => return Err(ClassifierError::MissingTrainSet),
        };

        let mut cache = FoundationCache::default();
        let foundation =
            Self::load_foundation(args, args.model.bert_model.as_deref(), &mut cache, device)?;

        let labels = dataset_labels(train_set);
        let extra_vocab = dataset_vocab(train_set);
        let mut config = args.model.clone();
        config.word_dim = Some(foundation.pretrain.dim());
        config.charlm_dim = foundation.charlm_dim()?;
        info!(
            "Building new {} model: {} labels, extra vocab of {} words",
            config.model_type,
            labels.len(),
            extra_vocab.len()
        );

        let classifier = match config.model_type.clone() {
            ModelType::Cnn => SentimentClassifier::new(foundation, extra_vocab, labels, config, device)?,
            ModelType::Unknown(name) => return Err(ClassifierError::UnknownModelType(name)),
        };
        let optimizer = Self::build_optimizer(args)?;
        Ok(Self::new(classifier, Some(optimizer), 0, 0, None))
    }

    pub fn build_optimizer(args: &ClassifierArgs) -> Result<Box<dyn ClassifierOptimizer<B>>> {
        let settings = OptimizerSettings::from_args(args)?;
        debug!("Building {} optimizer with lr {}", settings.kind, settings.learning_rate);
        build_optimizer::<B>(&settings)
    }

    /// Path of the pretrain file `args` points at, directly or through
    /// `save_dir`, `shorthand` and `wordvec_type`.
    pub fn pretrain_path(args: &ClassifierArgs) -> Result<PathBuf> {
        if let Some(path) = &args.wordvec_pretrain_file {
            return Ok(path.clone());
        }
        match args.wordvec_type {
            Some(wordvec_type) => Ok(args.save_dir.join(format!(
                "{}.{}.pretrain.bin",
                args.shorthand,
                wordvec_type.name()
            ))),
            None => Err(ClassifierError::Config(
                "need wordvec_pretrain_file or wordvec_type to locate the pretrained vectors".into(),
            )),
        }
    }

    /// Load the pretrain, building it from raw text vectors if it has not
    /// been converted yet.
    pub fn load_pretrain(
        args: &ClassifierArgs,
        cache: &mut FoundationCache<B::InnerBackend>,
    ) -> Result<Arc<Pretrain>> {
        let pretrain_file = Self::pretrain_path(args)?;
        debug!("Looking for pretrained vectors in {:?}", pretrain_file);
        if pretrain_file.exists() {
            return cache.load_pretrain(&pretrain_file);
        }

        let vec_file = match (&args.wordvec_raw_file, args.wordvec_type) {
            (Some(raw), _) => raw.clone(),
            (None, Some(wordvec_type)) => args
                .wordvec_dir
                .join(wordvec_type.name())
                .join(format!("{}.vectors.txt", args.lang())),
            (None, None) => {
                return Err(ClassifierError::Config(format!(
                    "{:?} does not exist and no raw vectors were given to build it",
                    pretrain_file
                )))
            }
        };
        debug!("Pretrain not found.  Looking in {:?}", vec_file);
        let pretrain = Pretrain::build(&pretrain_file, &vec_file, args.pretrain_max_vocab)?;
        debug!("Embedding shape: [{}, {}]", pretrain.len(), pretrain.dim());
        Ok(cache.insert_pretrain(&pretrain_file, pretrain))
    }

    fn load_foundation(
        args: &ClassifierArgs,
        bert_model: Option<&str>,
        cache: &mut FoundationCache<B::InnerBackend>,
        device: &B::Device,
    ) -> Result<ClassifierFoundation<B::InnerBackend>> {
        let pretrain = Self::load_pretrain(args, cache)?;
        let charlm_forward = cache.load_charlm(args.charlm_forward_file.as_deref(), device)?;
        let charlm_backward = cache.load_charlm(args.charlm_backward_file.as_deref(), device)?;
        let subword = cache.load_subword(bert_model.map(Path::new))?;
        Ok(ClassifierFoundation {
            pretrain,
            charlm_forward,
            charlm_backward,
            subword,
        })
    }

    pub fn train_step(&mut self, batch: &[SentimentDatum]) -> Result<TrainOutput> {
        let optimizer = self.optimizer.as_mut().ok_or_else(|| {
            ClassifierError::Config("trainer has no optimizer; load it with load_optimizer".into())
        })?;

        let mut sentences = Vec::with_capacity(batch.len());
        let mut targets = Vec::with_capacity(batch.len());
        for datum in batch {
            let target = self.classifier.label_index(datum.sentiment).ok_or_else(|| {
                ClassifierError::Config(format!("label {} is not known to the model", datum.sentiment))
            })?;
            sentences.push(datum.tokens());
            targets.push(target as i64);
        }

        let logits = self.classifier.forward(&sentences)?;
        let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), self.classifier.device());
        let loss = self.loss_fn.forward(logits, targets);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), self.classifier.model());
        let model = optimizer.step(self.classifier.model().clone(), grads);
        self.classifier.set_model(model);
        self.global_step += 1;

        Ok(TrainOutput {
            loss: loss_value,
            step: self.global_step,
        })
    }

    /// Fraction of `data` whose predicted label matches its sentiment
    pub fn evaluate(&self, data: &[SentimentDatum], batch_size: usize) -> Result<f64> {
        if data.is_empty() {
            return Ok(0.0);
        }
        let mut correct = 0usize;
        for chunk in data.chunks(batch_size.max(1)) {
            let sentences: Vec<Vec<String>> = chunk.iter().map(SentimentDatum::tokens).collect();
            let predictions = self.classifier.predict(&sentences)?;
            correct += chunk
                .iter()
                .zip(predictions)
                .filter(|(datum, predicted)| self.classifier.label_index(datum.sentiment) == Some(*predicted))
                .count();
        }
        Ok(correct as f64 / data.len() as f64)
    }
}
