use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{ClassifierError, Result};

/// Upper bound on what a single record may decode to, so a corrupt length
/// prefix fails instead of allocating.
const MAX_RECORD_BYTES: u64 = 16 * 1024 * 1024 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_RECORD_BYTES)
}

/// Serialize `value` to `path`, creating the parent directory and replacing
/// any existing file.
pub fn write_record<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ClassifierError::io(parent, e))?;
    }

    let file = fs::File::create(path).map_err(|e| ClassifierError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    options()
        .serialize_into(&mut writer, value)
        .map_err(|source| ClassifierError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(|e| ClassifierError::io(path, e))
}

pub fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs::File::open(path).map_err(|e| ClassifierError::io(path, e))?;
    options()
        .deserialize_from(BufReader::new(file))
        .map_err(|source| ClassifierError::Deserialize {
            path: path.to_path_buf(),
            source,
        })
}
