use anyhow::{Context, Result};
use burn::backend::Autodiff;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sentiment_classifier::checkpoint::{read_checkpoint, resolve_checkpoint_path};
use sentiment_classifier::data::{read_dataset, DataLoader, SentimentDataLoader, SentimentDatum};
use sentiment_classifier::{ClassifierArgs, ClassifierTrainer, FoundationCache};

#[cfg(feature = "wgpu-backend")]
type Backend = Autodiff<burn_wgpu::Wgpu>;

#[cfg(all(feature = "tch-backend", not(feature = "wgpu-backend")))]
type Backend = Autodiff<burn_tch::LibTorch>;

#[cfg(not(any(feature = "wgpu-backend", feature = "tch-backend")))]
type Backend = Autodiff<burn_ndarray::NdArray<f32>>;

#[derive(Debug, Parser)]
#[command(author, version, about = "Sentiment classifier training CLI")]
struct Cli {
    /// Path to a ClassifierArgs JSON file; defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a new model from a training set and save it
    New(NewArgs),
    /// Train a model, resuming from a checkpoint if one is given
    Train(TrainArgs),
    /// Report accuracy of a checkpoint on a dataset
    Eval(EvalArgs),
    /// Print the counters, labels and config stored in a checkpoint
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
struct NewArgs {
    /// Training set (JSON written by prepare-polemo2)
    #[arg(long)]
    train: PathBuf,
    /// Where to save the model; defaults to save_dir/save_name
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TrainArgs {
    /// Training set; defaults to training.train_file from the config
    #[arg(long)]
    train: Option<PathBuf>,
    /// Dev set used to pick the best model
    #[arg(long)]
    dev: Option<PathBuf>,
    /// Checkpoint to resume from, including its optimizer state
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    /// Total number of epochs to reach; defaults to training.max_epochs
    #[arg(long)]
    epochs: Option<usize>,
}

#[derive(Debug, Args)]
struct EvalArgs {
    /// Path to model checkpoint
    #[arg(long)]
    checkpoint: PathBuf,
    /// Path to evaluation data
    #[arg(long)]
    data: PathBuf,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// Path to model checkpoint
    #[arg(long)]
    checkpoint: PathBuf,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let args = load_args(cli.config.as_deref())?;

    match cli.command {
        Commands::New(cmd) => new_command(&args, cmd),
        Commands::Train(cmd) => train_command(&args, cmd),
        Commands::Eval(cmd) => eval_command(&args, cmd),
        Commands::Inspect(cmd) => inspect_command(&args, cmd),
    }
}

fn load_args(path: Option<&Path>) -> Result<ClassifierArgs> {
    let Some(path) = path else {
        info!("No configuration given, using defaults");
        return Ok(ClassifierArgs::default());
    };
    info!("Loading configuration from: {:?}", path);
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let args: ClassifierArgs =
        serde_json::from_str(&config_str).with_context(|| "Failed to parse config JSON")?;
    args.model
        .validate()
        .with_context(|| format!("Invalid model config in {:?}", path))?;
    Ok(args)
}

fn load_data(path: &Path) -> Result<Vec<SentimentDatum>> {
    read_dataset(path).with_context(|| format!("Failed to read dataset: {:?}", path))
}

fn default_save_path(args: &ClassifierArgs) -> PathBuf {
    args.save_dir.join(&args.training.save_name)
}

fn new_command(args: &ClassifierArgs, cmd: NewArgs) -> Result<()> {
    let device = Default::default();
    let train_set = load_data(&cmd.train)?;
    let trainer = ClassifierTrainer::<Backend>::build_new_model(args, Some(&train_set), &device)
        .with_context(|| "Failed to build a new model")?;

    let output = cmd.output.unwrap_or_else(|| default_save_path(args));
    trainer.save(&output, None, false)?;
    Ok(())
}

fn train_command(args: &ClassifierArgs, cmd: TrainArgs) -> Result<()> {
    let device = Default::default();
    let train_file = cmd
        .train
        .or_else(|| args.training.train_file.clone())
        .context("No training set: pass --train or set training.train_file")?;
    let train_set = load_data(&train_file)?;
    let dev_set = match cmd.dev.or_else(|| args.training.dev_file.clone()) {
        Some(path) => Some(load_data(&path)?),
        None => None,
    };

    let mut cache = FoundationCache::new();
    let mut trainer = match &cmd.checkpoint {
        Some(path) => {
            info!("Resuming from {:?}", path);
            ClassifierTrainer::<Backend>::load(path, args, Some(&mut cache), true, &device)
                .with_context(|| format!("Failed to resume from {:?}", path))?
        }
        None => ClassifierTrainer::<Backend>::build_new_model(args, Some(&train_set), &device)
            .with_context(|| "Failed to build a new model")?,
    };

    let save_path = default_save_path(args);
    let best_path = args.save_dir.join(format!("best_{}", args.training.save_name));
    let max_epochs = cmd.epochs.unwrap_or_else(|| args.max_epochs());
    let batch_size = args.batch_size();
    let mut loader = SentimentDataLoader::shuffled(train_set, batch_size, args.training.seed);

    info!(
        "Starting training at epoch {} (step {}) for {} epochs, {} batches each",
        trainer.epochs_trained,
        trainer.global_step,
        max_epochs,
        loader.num_batches().unwrap_or(0)
    );

    for epoch in trainer.epochs_trained..max_epochs {
        loader.reset();
        let mut total_loss = 0.0;
        let mut loss_count = 0;
        while let Some(batch) = loader.next_batch() {
            let output = trainer.train_step(batch)?;
            total_loss += output.loss;
            loss_count += 1;
        }
        trainer.epochs_trained = epoch + 1;
        info!(
            "Epoch {}/{}: Loss = {:.6} (step {})",
            epoch + 1,
            max_epochs,
            total_loss / loss_count.max(1) as f32,
            trainer.global_step
        );

        if let Some(dev_set) = &dev_set {
            let score = trainer.evaluate(dev_set, batch_size)?;
            info!("Dev accuracy: {:.4}", score);
            if trainer.best_score.map_or(true, |best| score > best) {
                trainer.best_score = Some(score);
                trainer.save(&best_path, None, false)?;
                info!("New best dev score {:.4}", score);
            }
        }
        trainer.save(&save_path, None, true)?;
    }

    info!("Training completed!");
    Ok(())
}

fn eval_command(args: &ClassifierArgs, cmd: EvalArgs) -> Result<()> {
    let device = Default::default();
    let trainer = ClassifierTrainer::<Backend>::load(&cmd.checkpoint, args, None, false, &device)
        .with_context(|| format!("Failed to load {:?}", cmd.checkpoint))?;
    let data = load_data(&cmd.data)?;

    let accuracy = trainer.evaluate(&data, args.batch_size())?;
    info!("Accuracy on {:?}: {:.4} ({} items)", cmd.data, accuracy, data.len());
    Ok(())
}

fn inspect_command(args: &ClassifierArgs, cmd: InspectArgs) -> Result<()> {
    let path = resolve_checkpoint_path(&cmd.checkpoint, &args.save_dir)?;
    let checkpoint = read_checkpoint(&path)?;

    info!("Checkpoint {:?}", path);
    info!("  epochs_trained: {}", checkpoint.epochs_trained);
    info!("  global_step: {}", checkpoint.global_step);
    info!("  best_score: {:?}", checkpoint.best_score);
    info!(
        "  optimizer: {}",
        checkpoint
            .optimizer_state_dict
            .as_ref()
            .map_or_else(|| "not saved".to_string(), |state| state.kind.to_string())
    );
    info!("  labels: {:?}", checkpoint.params.labels);
    info!("  extra vocab: {} words", checkpoint.params.extra_vocab.len());
    info!("  config: {}", checkpoint.params.config);
    Ok(())
}
