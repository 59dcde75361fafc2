// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands: `train`, `decode`, `evaluate`
// and `self-test`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, Bucket, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::TrainConfig;
use crate::domain::sequence::Bucket;
use crate::domain::task::Task;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the denoiser (or tagger) until dev loss stops improving
    Train(TrainArgs),

    /// Denoise utterances read from stdin with a trained model
    Decode(DecodeArgs),

    /// Report loss, perplexity and accuracy of a trained model on one split
    Evaluate(EvaluateArgs),

    /// Run a few training steps of a tiny model on a built-in dataset
    SelfTest(SelfTestArgs),
}

/// What the trained model outputs.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskArg {
    /// Cleaned utterances, copying from the input where it can
    Denoise,
    /// One disfluency label per input token
    Tag,
}

impl From<TaskArg> for Task {
    fn from(t: TaskArg) -> Self {
        match t {
            TaskArg::Denoise => Task::Denoise,
            TaskArg::Tag => Task::Tag,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Denoise utterances, or tag them (reads vocab.tags and *.ids.tags)
    #[arg(long, value_enum, default_value_t = TaskArg::Denoise)]
    pub task: TaskArg,

    /// Directory with vocab.from / vocab.to and the {train,dev,test} files
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Directory for checkpoints, train_config.json and metrics.csv
    #[arg(long, default_value = "train")]
    pub train_dir: String,

    /// Length buckets as SOURCExTARGET, comma separated, shortest first
    #[arg(long, value_delimiter = ',', value_parser = parse_bucket, default_value = "150x100")]
    pub buckets: Vec<Bucket>,

    /// Adam learning rate
    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Multiplier applied when the interval loss exceeds the last three
    #[arg(long, default_value_t = 0.99)]
    pub learning_rate_decay_factor: f64,

    /// Clip gradients to this global norm
    #[arg(long, default_value_t = 5.0)]
    pub max_gradient_norm: f32,

    /// Probability of replacing a source token with UNK during training
    #[arg(long, default_value_t = 0.0)]
    pub word_dropout_prob: f64,

    /// Relative dev-loss improvement that counts as progress
    #[arg(long, default_value_t = 0.01)]
    pub early_stopping_threshold: f64,

    /// Stop after this many checkpoints without progress
    #[arg(long, default_value_t = 10)]
    pub early_stopping_checkpoints: usize,

    /// Training batch size
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Batch size for evaluation passes
    #[arg(long, default_value_t = 64)]
    pub eval_batch_size: usize,

    /// Hidden size of the network
    #[arg(long, default_value_t = 64)]
    pub size: usize,

    /// Attention heads; must divide --size
    #[arg(long, default_value_t = 4)]
    pub num_heads: usize,

    /// Encoder layers
    #[arg(long, default_value_t = 1)]
    pub num_layers: usize,

    /// Dropout probability inside the network
    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Training steps between checkpoints
    #[arg(long, default_value_t = 200)]
    pub steps_per_checkpoint: usize,

    /// Limit on training lines read (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub max_train_data_size: usize,

    /// Ignore and delete any existing checkpoint in --train-dir
    #[arg(long)]
    pub force_fresh: bool,

    /// Seed for bucket sampling, batch draws and word dropout
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            task:                       a.task.into(),
            data_dir:                   a.data_dir,
            train_dir:                  a.train_dir,
            buckets:                    a.buckets,
            learning_rate:              a.learning_rate,
            learning_rate_decay_factor: a.learning_rate_decay_factor,
            max_gradient_norm:          a.max_gradient_norm,
            word_dropout_prob:          a.word_dropout_prob,
            early_stopping_threshold:   a.early_stopping_threshold,
            early_stopping_checkpoints: a.early_stopping_checkpoints,
            batch_size:                 a.batch_size,
            eval_batch_size:            a.eval_batch_size,
            size:                       a.size,
            num_heads:                  a.num_heads,
            num_layers:                 a.num_layers,
            dropout:                    a.dropout,
            steps_per_checkpoint:       a.steps_per_checkpoint,
            max_train_data_size:        a.max_train_data_size,
            force_fresh:                a.force_fresh,
            seed:                       a.seed,
            ..TrainConfig::default()
        }
    }
}

/// All arguments for the `decode` command
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Directory the model was trained into
    #[arg(long, default_value = "train")]
    pub train_dir: String,

    /// Override the vocabulary directory recorded at training time
    #[arg(long)]
    pub data_dir: Option<String>,
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory the model was trained into
    #[arg(long, default_value = "train")]
    pub train_dir: String,

    /// Override the data directory recorded at training time
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Which split to score: train, dev or test
    #[arg(long, default_value = "dev")]
    pub split: String,
}

/// All arguments for the `self-test` command
#[derive(Args, Debug)]
pub struct SelfTestArgs {
    /// Training steps to run
    #[arg(long, default_value_t = 5)]
    pub steps: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Parse "150x100" into a bucket.
fn parse_bucket(s: &str) -> Result<Bucket, String> {
    let (source, target) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("bucket '{s}' must look like SOURCExTARGET, e.g. 150x100"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|e| format!("bucket '{s}': '{v}' is not a length ({e})"))
    };
    let bucket = Bucket::new(parse(source)?, parse(target)?);
    if bucket.source_len < 2 || bucket.target_len < 2 {
        return Err(format!("bucket '{s}' is too small to hold any sequence"));
    }
    Ok(bucket)
}
