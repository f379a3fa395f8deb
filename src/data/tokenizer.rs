use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const CHAR_PAD: char = '\0';
pub const CHAR_UNK: char = '\u{FFFD}';

/// Character vocabulary used by the character language models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharVocab {
    chars: Vec<char>,
    #[serde(skip)]
    char_to_id: HashMap<char, i64>,
}

impl CharVocab {
    /// Build a vocabulary from every distinct character in `text`
    pub fn from_text(text: &str) -> Self {
        let mut chars: Vec<char> = text.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        Self::from_vocab(chars)
    }

    /// Build a vocabulary from a list of characters, keeping their order
    pub fn from_vocab(vocab: Vec<char>) -> Self {
        let mut chars = vec![CHAR_PAD, CHAR_UNK];
        for ch in vocab {
            if !chars.contains(&ch) {
                chars.push(ch);
            }
        }
        let mut result = Self {
            chars,
            char_to_id: HashMap::new(),
        };
        result.rebuild_index();
        result
    }

    /// The id map is not serialized; call after deserializing.
    pub(crate) fn rebuild_index(&mut self) {
        self.char_to_id = self
            .chars
            .iter()
            .enumerate()
            .map(|(id, &ch)| (ch, id as i64))
            .collect();
    }

    pub fn encode(&self, text: &str) -> Vec<i64> {
        text.chars()
            .map(|ch| *self.char_to_id.get(&ch).unwrap_or(&self.unk_id()))
            .collect()
    }

    pub fn decode(&self, ids: &[i64]) -> String {
        ids.iter()
            .filter_map(|&id| usize::try_from(id).ok())
            .filter_map(|id| self.chars.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn pad_id(&self) -> i64 {
        0
    }

    pub fn unk_id(&self) -> i64 {
        1
    }
}

impl fmt::Display for CharVocab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharVocab({} chars)", self.len())
    }
}
