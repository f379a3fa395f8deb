use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};
use crate::model::OptimizerKind;
use crate::utils::{read_record, write_record};

/// Everything needed to rebuild a classifier except the foundation
/// resources: weights as named MessagePack bytes, plus the architecture,
/// labels and extra vocabulary the weights were trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: Vec<u8>,
    pub config: ClassifierConfig,
    pub labels: Vec<String>,
    pub extra_vocab: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerState {
    pub kind: OptimizerKind,
    pub state: Vec<u8>,
}

/// Checkpoint data structure containing all training state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub params: ModelParams,
    pub epochs_trained: usize,
    pub global_step: usize,
    pub best_score: Option<f64>,
    pub optimizer_state_dict: Option<OptimizerState>,
}

/// Older files kept the model fields at the top level and had no training
/// counters or optimizer state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyCheckpoint {
    pub model: Vec<u8>,
    pub config: ClassifierConfig,
    pub labels: Vec<String>,
    pub extra_vocab: Vec<String>,
}

impl From<LegacyCheckpoint> for CheckpointRecord {
    fn from(legacy: LegacyCheckpoint) -> Self {
        Self {
            params: ModelParams {
                model: legacy.model,
                config: legacy.config,
                labels: legacy.labels,
                extra_vocab: legacy.extra_vocab,
            },
            epochs_trained: 0,
            global_step: 0,
            best_score: None,
            optimizer_state_dict: None,
        }
    }
}

#[derive(Deserialize)]
enum StoredCheckpoint {
    Legacy(LegacyCheckpoint),
    Current(CheckpointRecord),
}

// Same variant layout as StoredCheckpoint, without cloning the weights
#[derive(Serialize)]
enum StoredCheckpointRef<'a> {
    #[allow(dead_code)]
    Legacy(&'a LegacyCheckpoint),
    Current(&'a CheckpointRecord),
}

pub fn write_checkpoint(path: &Path, checkpoint: &CheckpointRecord) -> Result<()> {
    write_record(path, &StoredCheckpointRef::Current(checkpoint))?;
    debug!(
        "Wrote checkpoint {:?} (epochs {}, step {})",
        path, checkpoint.epochs_trained, checkpoint.global_step
    );
    Ok(())
}

/// Read either layout. Legacy files come back with zeroed counters.
pub fn read_checkpoint(path: &Path) -> Result<CheckpointRecord> {
    match read_record::<StoredCheckpoint>(path)? {
        StoredCheckpoint::Current(checkpoint) => Ok(checkpoint),
        StoredCheckpoint::Legacy(legacy) => {
            info!("{:?} uses the legacy checkpoint layout", path);
            Ok(legacy.into())
        }
    }
}

/// `path` if it exists, otherwise `path` under `save_dir`.
pub fn resolve_checkpoint_path(path: &Path, save_dir: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let fallback = save_dir.join(path);
    if fallback.exists() {
        return Ok(fallback);
    }
    error!("Cannot find model in {:?} or in {:?}", path, fallback);
    Err(ClassifierError::NotFound {
        path: path.to_path_buf(),
        fallback,
    })
}

#[cfg(test)]
pub(crate) fn write_legacy_checkpoint(path: &Path, legacy: &LegacyCheckpoint) -> Result<()> {
    write_record(path, &StoredCheckpointRef::Legacy(legacy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn params() -> ModelParams {
        ModelParams {
            model: vec![1, 2, 3],
            config: ClassifierConfig::default(),
            labels: vec!["0".into(), "1".into()],
            extra_vocab: vec!["<PAD>".into(), "<UNK>".into(), "film".into()],
        }
    }

    #[test]
    fn test_write_and_read_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.ckpt");
        let checkpoint = CheckpointRecord {
            params: params(),
            epochs_trained: 3,
            global_step: 120,
            best_score: Some(0.75),
            optimizer_state_dict: Some(OptimizerState {
                kind: OptimizerKind::Adam,
                state: vec![9, 9],
            }),
        };
        write_checkpoint(&path, &checkpoint).unwrap();

        let loaded = read_checkpoint(&path).unwrap();
        assert_eq!(loaded.epochs_trained, 3);
        assert_eq!(loaded.global_step, 120);
        assert_eq!(loaded.best_score, Some(0.75));
        assert_eq!(loaded.params.model, vec![1, 2, 3]);
        assert_eq!(loaded.optimizer_state_dict.unwrap().kind, OptimizerKind::Adam);
    }

    #[test]
    fn test_read_legacy_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("old.ckpt");
        let params = params();
        let legacy = LegacyCheckpoint {
            model: params.model,
            config: params.config,
            labels: params.labels,
            extra_vocab: params.extra_vocab,
        };
        write_legacy_checkpoint(&path, &legacy).unwrap();

        let loaded = read_checkpoint(&path).unwrap();
        assert_eq!(loaded.epochs_trained, 0);
        assert_eq!(loaded.global_step, 0);
        assert_eq!(loaded.best_score, None);
        assert!(loaded.optimizer_state_dict.is_none());
        assert_eq!(loaded.params.labels, vec!["0", "1"]);
    }

    #[test]
    fn test_corrupt_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.ckpt");
        fs::write(&path, b"definitely not a checkpoint").unwrap();

        let err = read_checkpoint(&path).unwrap_err();
        assert!(matches!(err, ClassifierError::Deserialize { .. }));
    }

    #[test]
    fn test_resolve_checkpoint_path() {
        let temp_dir = TempDir::new().unwrap();
        let save_dir = temp_dir.path().join("saved");
        fs::create_dir_all(&save_dir).unwrap();
        fs::write(save_dir.join("model.ckpt"), b"").unwrap();

        let direct = temp_dir.path().join("direct.ckpt");
        fs::write(&direct, b"").unwrap();
        assert_eq!(resolve_checkpoint_path(&direct, &save_dir).unwrap(), direct);

        let resolved = resolve_checkpoint_path(Path::new("model.ckpt"), &save_dir).unwrap();
        assert_eq!(resolved, save_dir.join("model.ckpt"));

        let err = resolve_checkpoint_path(Path::new("missing.ckpt"), &save_dir).unwrap_err();
        match err {
            ClassifierError::NotFound { path, fallback } => {
                assert_eq!(path, PathBuf::from("missing.ckpt"));
                assert_eq!(fallback, save_dir.join("missing.ckpt"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
