use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::error::{ClassifierError, Result};

pub const PAD: &str = "<PAD>";
pub const UNK: &str = "<UNK>";
pub const PAD_ID: usize = 0;
pub const UNK_ID: usize = 1;

/// Text of a datum: raw before tokenization, a token list after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SentimentText {
    Tokens(Vec<String>),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentDatum {
    pub sentiment: i32,
    pub text: SentimentText,
}

impl SentimentDatum {
    pub fn raw(sentiment: i32, text: impl Into<String>) -> Self {
        Self {
            sentiment,
            text: SentimentText::Raw(text.into()),
        }
    }

    pub fn tokenized(sentiment: i32, tokens: Vec<String>) -> Self {
        Self {
            sentiment,
            text: SentimentText::Tokens(tokens),
        }
    }

    /// Tokens of the datum; raw text is split on whitespace.
    pub fn tokens(&self) -> Vec<String> {
        match &self.text {
            SentimentText::Tokens(tokens) => tokens.clone(),
            SentimentText::Raw(text) => text.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Read a JSON dataset written by [`write_list`] (or any JSON array of data).
pub fn read_dataset(path: &Path) -> Result<Vec<SentimentDatum>> {
    let json = fs::read_to_string(path).map_err(|e| ClassifierError::io(path, e))?;
    let data: Vec<SentimentDatum> = serde_json::from_str(&json)?;
    info!("Loaded {} sentiment items from {:?}", data.len(), path);
    Ok(data)
}

/// Write a dataset as a JSON array with one datum per line.
pub fn write_list(path: &Path, data: &[SentimentDatum]) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| ClassifierError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let io_err = |e| ClassifierError::io(path, e);

    out.write_all(b"[\n").map_err(io_err)?;
    for (idx, datum) in data.iter().enumerate() {
        out.write_all(b"  ").map_err(io_err)?;
        serde_json::to_writer(&mut out, datum)?;
        if idx + 1 < data.len() {
            out.write_all(b",").map_err(io_err)?;
        }
        out.write_all(b"\n").map_err(io_err)?;
    }
    out.write_all(b"]\n").map_err(io_err)?;
    out.flush().map_err(io_err)?;

    info!("Wrote {} items to {:?}", data.len(), path);
    Ok(())
}

/// Distinct labels of a dataset, in numeric order.
pub fn dataset_labels(data: &[SentimentDatum]) -> Vec<String> {
    let labels: BTreeSet<i32> = data.iter().map(|d| d.sentiment).collect();
    labels.into_iter().map(|l| l.to_string()).collect()
}

/// `<PAD>`, `<UNK>` followed by every distinct word of the dataset, sorted.
pub fn dataset_vocab(data: &[SentimentDatum]) -> Vec<String> {
    let words: BTreeSet<String> = data.iter().flat_map(|d| d.tokens()).collect();
    [PAD.to_string(), UNK.to_string()]
        .into_iter()
        .chain(words.into_iter().filter(|w| w != PAD && w != UNK))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_write_list_layout_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.json");
        let data = vec![
            SentimentDatum::tokenized(0, toks(&["Zły", "film"])),
            SentimentDatum::tokenized(3, toks(&["Świetny"])),
        ];

        write_list(&path, &data).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "[\n  {\"sentiment\":0,\"text\":[\"Zły\",\"film\"]},\n  {\"sentiment\":3,\"text\":[\"Świetny\"]}\n]\n"
        );
        assert_eq!(read_dataset(&path).unwrap(), data);
    }

    #[test]
    fn test_write_empty_list() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.json");
        write_list(&path, &[]).unwrap();
        assert!(read_dataset(&path).unwrap().is_empty());
    }

    #[test]
    fn test_dataset_labels_sorted_numerically() {
        let data: Vec<_> = [10, 2, -1, 3, 2]
            .into_iter()
            .map(|s| SentimentDatum::raw(s, "x"))
            .collect();
        assert_eq!(dataset_labels(&data), vec!["-1", "2", "3", "10"]);
    }

    #[test]
    fn test_dataset_vocab() {
        let data = vec![
            SentimentDatum::tokenized(0, toks(&["b", "a"])),
            SentimentDatum::raw(1, "a c"),
        ];
        assert_eq!(dataset_vocab(&data), vec![PAD, UNK, "a", "b", "c"]);
    }
}
