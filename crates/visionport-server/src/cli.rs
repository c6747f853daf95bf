use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "visionportd", version, about = "Vision model predictor host")]
pub struct Cli {
    /// Log filter (RUST_LOG syntax)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch model artifacts without loading a backend
    Download {
        /// Model manifest (TOML)
        #[arg(long)]
        manifest: PathBuf,

        /// Override the manifest's work directory
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Give up on fetches after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Load a model and run predictions on JSON tensor files
    Predict {
        /// Model manifest (TOML)
        #[arg(long)]
        manifest: PathBuf,

        /// Input tensors, one sample per file: {"shape": [3, H, W], "data": [...]}
        #[arg(long = "input", required = true)]
        inputs: Vec<PathBuf>,

        /// Override the manifest's work directory
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Device for inference (cpu or cuda:N)
        #[arg(long, default_value = "cpu")]
        device: String,

        /// Samples per predict call
        #[arg(long, default_value_t = 1)]
        batch_size: usize,

        /// Number of predictor instances serving requests
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// ONNX Runtime intra-op threads
        #[arg(long)]
        intra_threads: Option<usize>,
    },

    /// List the modalities this build can serve
    Modalities,
}
