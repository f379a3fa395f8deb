//! Pretrained resources the classifier is built on: word vectors, character
//! language models and a subword tokenizer. They are loaded once per path
//! and shared through [`FoundationCache`].

mod charlm;
mod pretrain;
mod subword;

pub use charlm::{CharLanguageModel, CharLmConfig};
pub use pretrain::Pretrain;
pub use subword::SubwordTokenizer;

use burn::tensor::backend::Backend;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

pub struct FoundationCache<B: Backend> {
    pretrains: HashMap<PathBuf, Arc<Pretrain>>,
    charlms: HashMap<PathBuf, Arc<CharLanguageModel<B>>>,
    subwords: HashMap<PathBuf, Arc<SubwordTokenizer>>,
}

impl<B: Backend> Default for FoundationCache<B> {
    fn default() -> Self {
        Self {
            pretrains: HashMap::new(),
            charlms: HashMap::new(),
            subwords: HashMap::new(),
        }
    }
}

impl<B: Backend> FoundationCache<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_pretrain(&mut self, path: &Path) -> Result<Arc<Pretrain>> {
        if let Some(pretrain) = self.pretrains.get(path) {
            debug!("Reusing cached pretrain {:?}", path);
            return Ok(Arc::clone(pretrain));
        }
        let pretrain = Arc::new(Pretrain::load(path)?);
        self.pretrains.insert(path.to_path_buf(), Arc::clone(&pretrain));
        Ok(pretrain)
    }

    /// Register a pretrain that was just built so later loads reuse it
    pub fn insert_pretrain(&mut self, path: &Path, pretrain: Pretrain) -> Arc<Pretrain> {
        let pretrain = Arc::new(pretrain);
        self.pretrains.insert(path.to_path_buf(), Arc::clone(&pretrain));
        pretrain
    }

    pub fn load_charlm(
        &mut self,
        path: Option<&Path>,
        device: &B::Device,
    ) -> Result<Option<Arc<CharLanguageModel<B>>>> {
        let Some(path) = path else {
            return Ok(None);
        };
        if let Some(charlm) = self.charlms.get(path) {
            debug!("Reusing cached charlm {:?}", path);
            return Ok(Some(Arc::clone(charlm)));
        }
        let charlm = Arc::new(CharLanguageModel::load(path, device)?);
        self.charlms.insert(path.to_path_buf(), Arc::clone(&charlm));
        Ok(Some(charlm))
    }

    pub fn load_subword(&mut self, path: Option<&Path>) -> Result<Option<Arc<SubwordTokenizer>>> {
        let Some(path) = path else {
            return Ok(None);
        };
        if let Some(tokenizer) = self.subwords.get(path) {
            debug!("Reusing cached tokenizer {:?}", path);
            return Ok(Some(Arc::clone(tokenizer)));
        }
        let tokenizer = Arc::new(SubwordTokenizer::from_file(path)?);
        self.subwords.insert(path.to_path_buf(), Arc::clone(&tokenizer));
        Ok(Some(tokenizer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use std::fs;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_pretrain_is_shared() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pl.pretrain.bin");
        Pretrain::from_text_vectors("kot 1 2\n", None)
            .unwrap()
            .save(&path)
            .unwrap();

        let mut cache = FoundationCache::<TestBackend>::new();
        let first = cache.load_pretrain(&path).unwrap();
        let second = cache.load_pretrain(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_optional_resources() {
        let mut cache = FoundationCache::<TestBackend>::new();
        assert!(cache.load_charlm(None, &Default::default()).unwrap().is_none());
        assert!(cache.load_subword(None).unwrap().is_none());
    }

    #[test]
    fn test_subword_is_shared() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokenizer.json");
        fs::write(&path, subword::tests::WORD_LEVEL_JSON).unwrap();

        let mut cache = FoundationCache::<TestBackend>::new();
        let first = cache.load_subword(Some(&path)).unwrap().unwrap();
        let second = cache.load_subword(Some(&path)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
