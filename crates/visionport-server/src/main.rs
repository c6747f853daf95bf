mod cli;
mod input;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use visionport_backend_ort::{OrtBackend, INTRA_THREADS};
use visionport_core::{Device, ModelDescriptor, PredictionOptions};
use visionport_runtime::{Features, PredictorContext, PredictorRegistry, Scheduler, SchemeFetcher};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command {
        Command::Download {
            manifest,
            work_dir,
            timeout_secs,
        } => {
            let mut options = PredictionOptions::default();
            if let Some(secs) = timeout_secs {
                options = options.with_download_timeout(Duration::from_secs(secs));
            }
            download(manifest, work_dir, options).await
        }
        Command::Predict {
            manifest,
            inputs,
            work_dir,
            device,
            batch_size,
            workers,
            intra_threads,
        } => {
            let device: Device = device.parse().map_err(|e: String| anyhow!(e))?;
            let mut options = PredictionOptions::default()
                .with_device(device)
                .with_batch_size(batch_size);
            if let Some(threads) = intra_threads {
                options = options.with_backend_option(INTRA_THREADS, threads.to_string());
            }
            predict(manifest, inputs, work_dir, options, workers).await
        }
        Command::Modalities => {
            for modality in PredictorRegistry::with_defaults().modalities() {
                println!("{modality}");
            }
            Ok(())
        }
    }
}

fn read_descriptor(manifest: &Path, work_dir: Option<PathBuf>) -> Result<ModelDescriptor> {
    let mut descriptor = ModelDescriptor::from_toml_file(manifest)
        .with_context(|| format!("failed to read manifest {}", manifest.display()))?;
    if work_dir.is_some() {
        descriptor.work_dir = work_dir;
    }
    Ok(descriptor)
}

fn context(options: PredictionOptions) -> PredictorContext {
    PredictorContext {
        backend: Arc::new(OrtBackend::new()),
        fetcher: Arc::new(SchemeFetcher::default()),
        options,
    }
}

async fn download(
    manifest: PathBuf,
    work_dir: Option<PathBuf>,
    options: PredictionOptions,
) -> Result<()> {
    let descriptor = read_descriptor(&manifest, work_dir)?;
    let registry = PredictorRegistry::with_defaults();
    let mut predictor = registry.create(descriptor, context(options))?;

    predictor.download().await?;
    if let Some(artifacts) = predictor.artifacts() {
        println!("graph: {}", artifacts.graph_path.display());
        if let Some(features) = &artifacts.features_path {
            println!("features: {}", features.display());
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PredictionReport<'a> {
    inputs: &'a [String],
    worker: u32,
    queued_us: u64,
    backend_us: u64,
    decode_us: u64,
    #[serde(flatten)]
    features: &'a Features,
}

async fn predict(
    manifest: PathBuf,
    inputs: Vec<PathBuf>,
    work_dir: Option<PathBuf>,
    options: PredictionOptions,
    workers: usize,
) -> Result<()> {
    let descriptor = read_descriptor(&manifest, work_dir)?;
    let registry = PredictorRegistry::with_defaults();
    let batch_size = options.batch_size;
    let ctx = context(options);

    let samples = inputs
        .iter()
        .map(|path| input::read_tensor(path))
        .collect::<Result<Vec<_>>>()?;
    let names: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();

    let mut predictors = Vec::with_capacity(workers.max(1));
    for _ in 0..workers.max(1) {
        let mut predictor = registry.create(descriptor.clone(), ctx.clone())?;
        predictor.load().await?;
        predictors.push(predictor);
    }
    tracing::info!(
        model = %descriptor.canonical_name(),
        workers = predictors.len(),
        batch_size,
        "predictors ready"
    );

    let (handle, tasks) = Scheduler::spawn(predictors, 64);
    let responses = handle.predict_batched(samples, batch_size).await?;

    for (resp, chunk) in responses.into_iter().zip(names.chunks(batch_size.max(1))) {
        let features = resp
            .result
            .with_context(|| format!("prediction failed for {}", chunk.join(", ")))?;
        let report = PredictionReport {
            inputs: chunk,
            worker: resp.worker_id,
            queued_us: resp.timings.queued_us,
            backend_us: resp.timings.backend_us,
            decode_us: resp.timings.decode_us,
            features: &features,
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    drop(handle);
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = ?e, "pool task panicked");
        }
    }
    Ok(())
}
