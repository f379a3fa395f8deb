pub mod corpus;
mod loader;
pub mod pipeline;
pub mod sentiment;
mod tokenizer;

pub use corpus::{
    convert_label, data_dir, read_sentences_and_labels, tokenize, write_split, DATA_DIR_ENV,
    POLEMO_LABELS, SPLITS,
};
pub use loader::{DataLoader, SentimentDataLoader};
pub use pipeline::{Pipeline, PipelineOutput, PretrainedPipeline, RegexPipeline};
pub use sentiment::{
    dataset_labels, dataset_vocab, read_dataset, write_list, SentimentDatum, SentimentText, PAD,
    PAD_ID, UNK, UNK_ID,
};
pub use tokenizer::CharVocab;
