use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sentiment_classifier::data::pipeline::download_model;
use sentiment_classifier::data::{
    data_dir, read_sentences_and_labels, tokenize, write_split, Pipeline, PretrainedPipeline,
    RegexPipeline, SPLITS,
};

const SHORTHAND: &str = "pl_polemo2";

#[derive(Debug, Parser)]
#[command(author, version, about = "Convert PolEmo 2.0 sentence files to sentiment JSON")]
struct Args {
    /// Directory containing all.sentence.{train,dev,test}.txt
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory; defaults to $SENTIMENT_DATA_DIR or processed_data
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Hugging Face repository whose tokenizer segments the text
    #[arg(long, default_value = "allegro/herbert-base-cased")]
    model: String,

    /// Where downloaded tokenizers are kept
    #[arg(long, default_value = "extern_data/tokenizers")]
    model_dir: PathBuf,

    /// Segment with the built-in regex splitter instead of downloading a tokenizer
    #[arg(long, default_value = "false")]
    offline: bool,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting PolEmo 2.0 conversion");
    info!("Input directory: {:?}", args.input);

    let pipe: Box<dyn Pipeline> = if args.offline {
        info!("Using the regex segmenter");
        Box::new(RegexPipeline::new()?)
    } else {
        let model_dir = download_model(&args.model, &args.model_dir)
            .with_context(|| format!("Failed to download tokenizer for {}", args.model))?;
        Box::new(PretrainedPipeline::from_model_dir(&model_dir)?)
    };

    let out_dir = args.output.unwrap_or_else(data_dir);
    info!("Output directory: {:?}", out_dir);

    for split in SPLITS {
        let path = args.input.join(format!("all.sentence.{}.txt", split));
        let data = read_sentences_and_labels(&path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        info!("Read {} labeled sentences from {:?}", data.len(), path);

        let data = tokenize(data, pipe.as_ref())
            .with_context(|| format!("Failed to tokenize {:?}", path))?;
        write_split(&out_dir, SHORTHAND, split, &data)?;
    }

    info!("Data processing complete. Processed files are saved in {:?}", out_dir);
    Ok(())
}
