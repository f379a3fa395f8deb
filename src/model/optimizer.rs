use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{
    AdaGradConfig, AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig,
};
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ClassifierArgs;
use crate::error::{ClassifierError, Result};
use crate::model::CnnClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Sgd,
    AdaGrad,
    Adam,
    AdamW,
    Madgrad,
    Adadelta,
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::AdaGrad => "adagrad",
            OptimizerKind::Adadelta => "adadelta",
            OptimizerKind::Adam => "adam",
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::Madgrad => "madgrad",
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adagrad" => Ok(OptimizerKind::AdaGrad),
            "adadelta" => Ok(OptimizerKind::Adadelta),
            "adam" => Ok(OptimizerKind::Adam),
            "adamw" => Ok(OptimizerKind::AdamW),
            "madgrad" => Ok(OptimizerKind::Madgrad),
            _ => Err(ClassifierError::UnknownOptimizer(s.to_string())),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    pub kind: OptimizerKind,
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
}

impl OptimizerSettings {
    pub fn from_args(args: &ClassifierArgs) -> Result<Self> {
        Ok(Self {
            kind: args.optim.parse()?,
            learning_rate: args.learning_rate,
            momentum: args.momentum,
            weight_decay: args.weight_decay,
        })
    }
}

/// An optimizer bound to the classifier, with its state exportable as bytes
/// so it can travel inside a checkpoint.
pub trait ClassifierOptimizer<B: AutodiffBackend>: Send {
    fn kind(&self) -> OptimizerKind;

    fn learning_rate(&self) -> f64;

    fn step(&mut self, model: CnnClassifier<B>, grads: GradientsParams) -> CnnClassifier<B>;

    fn state_dict(&self) -> Result<Vec<u8>>;

    /// Restore state saved by [`ClassifierOptimizer::state_dict`]. Parameter
    /// ids of the model it was saved with must match the current model.
    fn load_state_dict(
        self: Box<Self>,
        state: Vec<u8>,
        device: &B::Device,
    ) -> Result<Box<dyn ClassifierOptimizer<B>>>;
}

struct BurnOptimizer<O> {
    kind: OptimizerKind,
    learning_rate: f64,
    inner: O,
}

impl<B, O> ClassifierOptimizer<B> for BurnOptimizer<O>
where
    B: AutodiffBackend,
    O: Optimizer<CnnClassifier<B>, B> + Send + 'static,
{
    fn kind(&self) -> OptimizerKind {
        self.kind
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn step(&mut self, model: CnnClassifier<B>, grads: GradientsParams) -> CnnClassifier<B> {
        self.inner.step(self.learning_rate, model, grads)
    }

    fn state_dict(&self) -> Result<Vec<u8>> {
        Recorder::<B>::record(
            &NamedMpkBytesRecorder::<FullPrecisionSettings>::new(),
            self.inner.to_record(),
            (),
        )
        .map_err(|e| ClassifierError::Record(format!("{} optimizer state: {:?}", self.kind, e)))
    }

    fn load_state_dict(
        self: Box<Self>,
        state: Vec<u8>,
        device: &B::Device,
    ) -> Result<Box<dyn ClassifierOptimizer<B>>> {
        let BurnOptimizer {
            kind,
            learning_rate,
            inner,
        } = *self;
        let record = Recorder::<B>::load(
            &NamedMpkBytesRecorder::<FullPrecisionSettings>::new(),
            state,
            device,
        )
        .map_err(|e| ClassifierError::Record(format!("{} optimizer state: {:?}", kind, e)))?;
        Ok(Box::new(BurnOptimizer {
            kind,
            learning_rate,
            inner: inner.load_record(record),
        }))
    }
}

fn boxed<B, O>(kind: OptimizerKind, learning_rate: f64, inner: O) -> Box<dyn ClassifierOptimizer<B>>
where
    B: AutodiffBackend,
    O: Optimizer<CnnClassifier<B>, B> + Send + 'static,
{
    Box::new(BurnOptimizer {
        kind,
        learning_rate,
        inner,
    })
}

pub fn build_optimizer<B: AutodiffBackend>(
    settings: &OptimizerSettings,
) -> Result<Box<dyn ClassifierOptimizer<B>>> {
    let lr = settings.learning_rate;
    let decay = (settings.weight_decay > 0.0)
        .then(|| WeightDecayConfig::new(settings.weight_decay as f32));

    let optimizer = match settings.kind {
        OptimizerKind::Sgd => {
            let momentum = (settings.momentum > 0.0).then(|| {
                MomentumConfig::new()
                    .with_momentum(settings.momentum)
                    .with_dampening(0.0)
            });
            let sgd = SgdConfig::new()
                .with_momentum(momentum)
                .with_weight_decay(decay)
                .init::<B, CnnClassifier<B>>();
            boxed(settings.kind, lr, sgd)
        }
        OptimizerKind::AdaGrad => {
            let adagrad = AdaGradConfig::new()
                .with_weight_decay(decay)
                .init::<B, CnnClassifier<B>>();
            boxed(settings.kind, lr, adagrad)
        }
        OptimizerKind::Adam => {
            let adam = AdamConfig::new()
                .with_weight_decay(decay)
                .init::<B, CnnClassifier<B>>();
            boxed(settings.kind, lr, adam)
        }
        OptimizerKind::AdamW => {
            let adamw = AdamWConfig::new()
                .with_weight_decay(settings.weight_decay as f32)
                .init::<B, CnnClassifier<B>>();
            boxed(settings.kind, lr, adamw)
        }
        OptimizerKind::Adadelta | OptimizerKind::Madgrad => {
            return Err(ClassifierError::DependencyMissing {
                name: settings.kind.to_string(),
                reason: format!("burn has no {} implementation", settings.kind),
            })
        }
    };
    Ok(optimizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn settings(kind: OptimizerKind) -> OptimizerSettings {
        OptimizerSettings {
            kind,
            learning_rate: 0.1,
            momentum: 0.9,
            weight_decay: 1e-4,
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("SGD".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert_eq!("AdamW".parse::<OptimizerKind>().unwrap(), OptimizerKind::AdamW);
        assert_eq!("adagrad".parse::<OptimizerKind>().unwrap(), OptimizerKind::AdaGrad);
    }

    #[test]
    fn test_unknown_optimizer() {
        for name in ["rmsprop", "", "adam2"] {
            let err = name.parse::<OptimizerKind>().unwrap_err();
            assert!(matches!(err, ClassifierError::UnknownOptimizer(n) if n == name));
        }
    }

    #[test]
    fn test_build_supported_optimizers() {
        for kind in [
            OptimizerKind::Sgd,
            OptimizerKind::AdaGrad,
            OptimizerKind::Adam,
            OptimizerKind::AdamW,
        ] {
            let optimizer = build_optimizer::<TestBackend>(&settings(kind)).unwrap();
            assert_eq!(optimizer.kind(), kind);
            assert_eq!(optimizer.learning_rate(), 0.1);
        }
    }

    #[test]
    fn test_unavailable_optimizers_report_missing_dependency() {
        for (name, kind) in [("Adadelta", OptimizerKind::Adadelta), ("madgrad", OptimizerKind::Madgrad)] {
            assert_eq!(name.parse::<OptimizerKind>().unwrap(), kind);
            let err = build_optimizer::<TestBackend>(&settings(kind)).err().unwrap();
            assert!(
                matches!(&err, ClassifierError::DependencyMissing { name, .. } if name == kind.name()),
                "{err:?}"
            );
        }
    }

    #[test]
    fn test_settings_from_args() {
        let args = ClassifierArgs {
            optim: "Adam".to_string(),
            learning_rate: 0.002,
            ..ClassifierArgs::default()
        };
        let settings = OptimizerSettings::from_args(&args).unwrap();
        assert_eq!(settings.kind, OptimizerKind::Adam);
        assert_eq!(settings.learning_rate, 0.002);

        let args = ClassifierArgs {
            optim: "lbfgs".to_string(),
            ..ClassifierArgs::default()
        };
        assert!(matches!(
            OptimizerSettings::from_args(&args),
            Err(ClassifierError::UnknownOptimizer(_))
        ));
    }
}
