use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokenizers::Tokenizer;

use crate::error::{ClassifierError, Result};

/// A pretrained subword tokenizer (`tokenizer.json`).
#[derive(Clone)]
pub struct SubwordTokenizer {
    name: String,
    tokenizer: Tokenizer,
}

impl fmt::Debug for SubwordTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubwordTokenizer")
            .field("name", &self.name)
            .field("vocab_size", &self.vocab_size())
            .finish()
    }
}

impl SubwordTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            ClassifierError::Tokenizer(format!("cannot load tokenizer from {:?}: {}", path, e))
        })?;
        Ok(Self {
            name: path.display().to_string(),
            tokenizer,
        })
    }

    pub fn from_json(name: &str, json: &str) -> Result<Self> {
        let tokenizer = Tokenizer::from_str(json)
            .map_err(|e| ClassifierError::Tokenizer(format!("cannot parse {}: {}", name, e)))?;
        Ok(Self {
            name: name.to_string(),
            tokenizer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Subword ids of `text`, without special tokens
    pub fn encode_ids(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ClassifierError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Words of `text` as delimited by the tokenizer's pre-tokenization.
    pub fn words(&self, text: &str) -> Result<Vec<String>> {
        let encoding = self
            .tokenizer
            .encode_char_offsets(text, false)
            .map_err(|e| ClassifierError::Tokenizer(e.to_string()))?;
        let chars: Vec<char> = text.chars().collect();
        let span = |s: usize, e: usize| chars.get(s..e).map(|c| c.iter().collect::<String>());

        let mut words: Vec<String> = Vec::new();
        let mut current: Option<(u32, usize, usize)> = None;
        for (word_id, &(start, end)) in encoding.get_word_ids().iter().zip(encoding.get_offsets()) {
            let Some(word_id) = *word_id else {
                continue;
            };
            match current {
                Some((id, span_start, _)) if id == word_id => {
                    current = Some((id, span_start, end));
                }
                _ => {
                    if let Some((_, s, e)) = current.take() {
                        words.extend(span(s, e));
                    }
                    current = Some((word_id, start, end));
                }
            }
        }
        if let Some((_, s, e)) = current {
            words.extend(span(s, e));
        }
        Ok(words)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const WORD_LEVEL_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[UNK]": 0, "dobry": 1, "film": 2, ",": 3},
            "unk_token": "[UNK]"
        }
    }"#;

    #[test]
    fn test_words_follow_pre_tokenizer() {
        let tokenizer = SubwordTokenizer::from_json("test", WORD_LEVEL_JSON).unwrap();
        let words = tokenizer.words("dobry film, naprawdę").unwrap();
        assert_eq!(words, vec!["dobry", "film", ",", "naprawdę"]);
    }

    #[test]
    fn test_encode_ids_maps_unknown() {
        let tokenizer = SubwordTokenizer::from_json("test", WORD_LEVEL_JSON).unwrap();
        assert_eq!(tokenizer.encode_ids("film nuda").unwrap(), vec![2, 0]);
        assert_eq!(tokenizer.vocab_size(), 4);
    }
}
