use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::pipeline::{Document, Pipeline, PipelineOutput};
use super::sentiment::{write_list, SentimentDatum, SentimentText};
use crate::error::{ClassifierError, Result};

/// PolEmo 2.0 label tokens and the class ids they map to.
pub const POLEMO_LABELS: [(&str, i32); 4] = [
    ("__label__z_minus_m", 0),
    ("__label__z_zero", 1),
    ("__label__z_amb", 2),
    ("__label__z_plus_m", 3),
];

/// Class id for a label token; `None` for anything outside the label set.
pub fn convert_label(label: &str) -> Option<i32> {
    POLEMO_LABELS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|&(_, id)| id)
}

/// Read `<text> <label>` lines. Lines without a trailing label, or with an
/// unknown label, are skipped.
pub fn read_sentences_and_labels(path: &Path) -> Result<Vec<SentimentDatum>> {
    let content = fs::read_to_string(path).map_err(|e| ClassifierError::io(path, e))?;
    Ok(parse_labeled_lines(&content))
}

pub fn parse_labeled_lines(content: &str) -> Vec<SentimentDatum> {
    content
        .lines()
        .filter_map(|line| {
            let (text, label) = line.rsplit_once(' ')?;
            let sentiment = convert_label(label.trim())?;
            Some(SentimentDatum::raw(sentiment, text.trim()))
        })
        .collect()
}

/// Replace the raw text of every datum with its tokens.
///
/// A per-document result must have one document per datum; a document
/// split into several sentences keeps all of their tokens. A single
/// combined document must have exactly one sentence per datum.
pub fn tokenize<P: Pipeline + ?Sized>(
    data: Vec<SentimentDatum>,
    pipe: &P,
) -> Result<Vec<SentimentDatum>> {
    let docs: Vec<String> = data
        .iter()
        .map(|datum| match &datum.text {
            SentimentText::Raw(text) => text.clone(),
            SentimentText::Tokens(tokens) => tokens.join(" "),
        })
        .collect();

    let tokens: Vec<Vec<String>> = match pipe.process(&docs)? {
        PipelineOutput::PerDocument(out_docs) => {
            if out_docs.len() != data.len() {
                return Err(ClassifierError::Alignment(format!(
                    "{} documents returned for {} texts",
                    out_docs.len(),
                    data.len()
                )));
            }
            out_docs.iter().map(document_tokens).collect()
        }
        PipelineOutput::Single(doc) => {
            if doc.sentences.len() != data.len() {
                return Err(ClassifierError::Alignment(format!(
                    "{} sentences returned for {} texts",
                    doc.sentences.len(),
                    data.len()
                )));
            }
            doc.sentences
                .iter()
                .map(|s| s.words().map(str::to_string).collect())
                .collect()
        }
    };

    Ok(data
        .into_iter()
        .zip(tokens)
        .map(|(datum, tokens)| SentimentDatum::tokenized(datum.sentiment, tokens))
        .collect())
}

fn document_tokens(doc: &Document) -> Vec<String> {
    if doc.sentences.len() > 1 {
        debug!("Joining {} sentences of one text", doc.sentences.len());
    }
    doc.sentences
        .iter()
        .flat_map(|s| s.words().map(str::to_string))
        .collect()
}

pub const DATA_DIR_ENV: &str = "SENTIMENT_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "processed_data";

/// Dataset splits, in conversion order
pub const SPLITS: [&str; 3] = ["train", "dev", "test"];

/// `$SENTIMENT_DATA_DIR`, or `processed_data` when unset
pub fn data_dir() -> PathBuf {
    env::var_os(DATA_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Write `data` to `<out_dir>/<shorthand>.<split>.json`, creating `out_dir`.
pub fn write_split(
    out_dir: &Path,
    shorthand: &str,
    split: &str,
    data: &[SentimentDatum],
) -> Result<PathBuf> {
    fs::create_dir_all(out_dir).map_err(|e| ClassifierError::io(out_dir, e))?;
    let path = out_dir.join(format!("{}.{}.json", shorthand, split));
    write_list(&path, data)?;
    info!("{} split: {} items", split, data.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::pipeline::{RegexPipeline, Sentence};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::{NamedTempFile, TempDir};

    // tests that touch SENTIMENT_DATA_DIR hold this
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_convert_label_total() {
        assert_eq!(convert_label("__label__z_minus_m"), Some(0));
        assert_eq!(convert_label("__label__z_zero"), Some(1));
        assert_eq!(convert_label("__label__z_amb"), Some(2));
        assert_eq!(convert_label("__label__z_plus_m"), Some(3));
        for other in ["", "__label__z_plus", "__LABEL__Z_ZERO", "z_zero", "3"] {
            assert_eq!(convert_label(other), None, "{other:?}");
        }
    }

    #[test]
    fn test_read_skips_malformed_and_unknown() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Bardzo dobry hotel . __label__z_plus_m").unwrap();
        writeln!(file, "no_label_here").unwrap();
        writeln!(file, "Nieznana etykieta __label__z_other").unwrap();
        writeln!(file, "Obsługa w porządku __label__z_zero ").unwrap();
        writeln!(file, "  Tragedia  __label__z_minus_m\r").unwrap();

        let data = read_sentences_and_labels(file.path()).unwrap();
        assert_eq!(
            data,
            vec![
                SentimentDatum::raw(3, "Bardzo dobry hotel ."),
                SentimentDatum::raw(0, "Tragedia"),
            ]
        );
    }

    #[test]
    fn test_trailing_space_line_is_skipped() {
        // the label token after the final space is empty
        let data = parse_labeled_lines("Obsługa w porządku __label__z_zero ");
        assert!(data.is_empty());
    }

    #[test]
    fn test_tokenize_per_document() {
        let data = vec![
            SentimentDatum::raw(1, "Hotel ok, nic więcej."),
            SentimentDatum::raw(2, "Hmm"),
        ];
        let pipe = RegexPipeline::new().unwrap();

        let out = tokenize(data, &pipe).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sentiment, 1);
        assert_eq!(out[1].sentiment, 2);
        assert_eq!(
            out[0].tokens(),
            vec!["Hotel", "ok", ",", "nic", "więcej", "."]
        );
        assert_eq!(out[1].text, SentimentText::Tokens(vec!["Hmm".to_string()]));
    }

    #[test]
    fn test_tokenize_single_document() {
        let data = vec![SentimentDatum::raw(0, "Źle"), SentimentDatum::raw(3, "Dobrze !")];
        let pipe = RegexPipeline::new().unwrap().with_combined_output(true);

        let out = tokenize(data, &pipe).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], SentimentDatum::tokenized(0, vec!["Źle".to_string()]));
        assert_eq!(out[1].sentiment, 3);
        assert_eq!(out[1].tokens(), vec!["Dobrze", "!"]);
    }

    #[test]
    fn test_tokenize_multi_sentence_per_document_keeps_all_tokens() {
        let data = vec![SentimentDatum::raw(1, "Raz. Dwa.")];
        let pipe = RegexPipeline::new().unwrap().with_sentence_split(true);

        let out = tokenize(data, &pipe).unwrap();
        assert_eq!(out[0].tokens(), vec!["Raz", ".", "Dwa", "."]);
    }

    #[test]
    fn test_tokenize_single_document_misaligned() {
        let data = vec![SentimentDatum::raw(1, "Raz. Dwa."), SentimentDatum::raw(0, "Trzy")];
        let pipe = RegexPipeline::new()
            .unwrap()
            .with_sentence_split(true)
            .with_combined_output(true);

        let err = tokenize(data, &pipe).unwrap_err();
        assert!(matches!(err, ClassifierError::Alignment(_)));
    }

    struct FixedPipeline(PipelineOutput);

    impl Pipeline for FixedPipeline {
        fn process(&self, _docs: &[String]) -> Result<PipelineOutput> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_tokenize_document_count_mismatch() {
        let pipe = FixedPipeline(PipelineOutput::PerDocument(vec![Document {
            sentences: vec![Sentence::from_words(["a"])],
        }]));
        let data = vec![SentimentDatum::raw(0, "a"), SentimentDatum::raw(1, "b")];

        assert!(matches!(
            tokenize(data, &pipe),
            Err(ClassifierError::Alignment(_))
        ));
    }

    #[test]
    fn test_write_split_creates_dir() {
        let temp_dir = TempDir::new().unwrap();
        let out_dir = temp_dir.path().join("processed");
        let data = vec![SentimentDatum::tokenized(2, vec!["Tak".to_string(), "sobie".to_string()])];

        let path = write_split(&out_dir, "pl_polemo2", "dev", &data).unwrap();
        assert_eq!(path, out_dir.join("pl_polemo2.dev.json"));
        assert_eq!(crate::data::read_dataset(&path).unwrap(), data);
    }

    #[test]
    fn test_data_dir_env_override() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let saved = env::var_os(DATA_DIR_ENV);

        env::set_var(DATA_DIR_ENV, "/tmp/polemo_out");
        assert_eq!(data_dir(), PathBuf::from("/tmp/polemo_out"));

        env::set_var(DATA_DIR_ENV, "");
        assert_eq!(data_dir(), PathBuf::from("processed_data"));

        env::remove_var(DATA_DIR_ENV);
        assert_eq!(data_dir(), PathBuf::from("processed_data"));

        if let Some(dir) = saved {
            env::set_var(DATA_DIR_ENV, dir);
        }
    }
}
