mod record;

pub use record::{
    read_checkpoint, resolve_checkpoint_path, write_checkpoint, CheckpointRecord, LegacyCheckpoint,
    ModelParams, OptimizerState,
};

#[cfg(test)]
pub(crate) use record::write_legacy_checkpoint;
