use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ClassifierError, Result};
use crate::foundation::SubwordTokenizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sentence {
    pub tokens: Vec<Token>,
}

impl Sentence {
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: words.into_iter().map(|w| Token { text: w.into() }).collect(),
        }
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.text.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub sentences: Vec<Sentence>,
}

/// What a segmentation pipeline hands back for a batch of texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutput {
    /// One document per input text
    PerDocument(Vec<Document>),
    /// Everything in a single document, one sentence per input text
    Single(Document),
}

/// Segments raw texts into sentences of tokens.
pub trait Pipeline {
    fn process(&self, docs: &[String]) -> Result<PipelineOutput>;
}

/// Word segmentation driven by a pretrained tokenizer's word boundaries.
/// Sentence splitting is disabled: every text is a single sentence.
pub struct PretrainedPipeline {
    tokenizer: SubwordTokenizer,
}

impl PretrainedPipeline {
    pub fn new(tokenizer: SubwordTokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let tokenizer = SubwordTokenizer::from_file(&model_dir.join(TOKENIZER_FILE))?;
        Ok(Self::new(tokenizer))
    }
}

impl Pipeline for PretrainedPipeline {
    fn process(&self, docs: &[String]) -> Result<PipelineOutput> {
        let documents = docs
            .iter()
            .map(|doc| {
                let words = self.tokenizer.words(doc)?;
                Ok(Document {
                    sentences: vec![Sentence::from_words(words)],
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PipelineOutput::PerDocument(documents))
    }
}

/// Offline word/punctuation splitter.
pub struct RegexPipeline {
    word_re: Regex,
    sentence_end_re: Regex,
    split_sentences: bool,
    combine: bool,
}

impl RegexPipeline {
    pub fn new() -> Result<Self> {
        let word_re = Regex::new(r"\w+(?:[-']\w+)*|[^\w\s]")
            .map_err(|e| ClassifierError::Config(e.to_string()))?;
        let sentence_end_re =
            Regex::new(r"^[.!?]+$").map_err(|e| ClassifierError::Config(e.to_string()))?;
        Ok(Self {
            word_re,
            sentence_end_re,
            split_sentences: false,
            combine: false,
        })
    }

    /// Split a text into several sentences at terminal punctuation
    pub fn with_sentence_split(mut self, split_sentences: bool) -> Self {
        self.split_sentences = split_sentences;
        self
    }

    /// Return every text as sentences of one combined document
    pub fn with_combined_output(mut self, combine: bool) -> Self {
        self.combine = combine;
        self
    }

    fn sentences(&self, text: &str) -> Vec<Sentence> {
        let words: Vec<&str> = self.word_re.find_iter(text).map(|m| m.as_str()).collect();
        if !self.split_sentences {
            return vec![Sentence::from_words(words)];
        }

        let mut sentences = Vec::new();
        let mut current = Vec::new();
        for word in words {
            current.push(word);
            if self.sentence_end_re.is_match(word) {
                sentences.push(Sentence::from_words(current.drain(..)));
            }
        }
        if !current.is_empty() {
            sentences.push(Sentence::from_words(current));
        }
        sentences
    }
}

impl Pipeline for RegexPipeline {
    fn process(&self, docs: &[String]) -> Result<PipelineOutput> {
        if self.combine {
            let sentences = docs.iter().flat_map(|doc| self.sentences(doc)).collect();
            return Ok(PipelineOutput::Single(Document { sentences }));
        }
        let documents = docs
            .iter()
            .map(|doc| Document {
                sentences: self.sentences(doc),
            })
            .collect();
        Ok(PipelineOutput::PerDocument(documents))
    }
}

pub const TOKENIZER_FILE: &str = "tokenizer.json";
const HUB_URL: &str = "https://huggingface.co";

/// Directory holding the downloaded tokenizer of `repo` under `model_root`.
pub fn model_dir(model_root: &Path, repo: &str) -> PathBuf {
    model_root.join(repo.replace('/', "__"))
}

/// Fetch `tokenizer.json` for a Hugging Face repository unless it is
/// already present. Returns the model directory.
pub fn download_model(repo: &str, model_root: &Path) -> Result<PathBuf> {
    let dir = model_dir(model_root, repo);
    let target = dir.join(TOKENIZER_FILE);
    if target.exists() {
        info!("Using cached tokenizer model at {:?}", target);
        return Ok(dir);
    }

    fs::create_dir_all(&dir).map_err(|e| ClassifierError::io(&dir, e))?;
    let url = format!("{}/{}/resolve/main/{}", HUB_URL, repo, TOKENIZER_FILE);
    info!("Downloading tokenizer model from {}", url);

    let download_err = |reason: String| ClassifierError::Download {
        url: url.clone(),
        reason,
    };
    let response = reqwest::blocking::get(&url).map_err(|e| download_err(e.to_string()))?;
    let response = response
        .error_for_status()
        .map_err(|e| download_err(e.to_string()))?;
    let bytes = response.bytes().map_err(|e| download_err(e.to_string()))?;

    fs::write(&target, &bytes).map_err(|e| ClassifierError::io(&target, e))?;
    info!("Tokenizer model saved to {:?} ({} bytes)", target, bytes.len());
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(sentence: &Sentence) -> Vec<&str> {
        sentence.words().collect()
    }

    #[test]
    fn test_regex_pipeline_per_document() {
        let pipe = RegexPipeline::new().unwrap();
        let docs = vec!["Nie polecam, szkoda czasu.".to_string(), "Super!".to_string()];

        let PipelineOutput::PerDocument(out) = pipe.process(&docs).unwrap() else {
            panic!("expected per-document output");
        };
        assert_eq!(out.len(), 2);
        assert_eq!(
            words(&out[0].sentences[0]),
            vec!["Nie", "polecam", ",", "szkoda", "czasu", "."]
        );
        assert_eq!(words(&out[1].sentences[0]), vec!["Super", "!"]);
    }

    #[test]
    fn test_regex_pipeline_sentence_split_and_combine() {
        let pipe = RegexPipeline::new()
            .unwrap()
            .with_sentence_split(true)
            .with_combined_output(true);
        let docs = vec!["Jeden. Dwa".to_string(), "Trzy".to_string()];

        let PipelineOutput::Single(doc) = pipe.process(&docs).unwrap() else {
            panic!("expected a single document");
        };
        assert_eq!(doc.sentences.len(), 3);
        assert_eq!(words(&doc.sentences[0]), vec!["Jeden", "."]);
        assert_eq!(words(&doc.sentences[2]), vec!["Trzy"]);
    }

    #[test]
    fn test_model_dir_flattens_repo_name() {
        let dir = model_dir(Path::new("models"), "allegro/herbert-base-cased");
        assert_eq!(dir, Path::new("models").join("allegro__herbert-base-cased"));
    }
}
