//! eeg-pipeline command line

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Command, ProcessArgs, SimulateArgs};
use eeg_pipeline::{EegProcessor, PipelineCaches, PipelineConfig, RunSummary};
use eeg_simulation::{write_csv, ArtifactConfig, EegSimulator, SimulationConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Process(args) => process(args).await,
        Command::Simulate(args) => simulate(args),
    }
}

async fn process(args: ProcessArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let params = &mut config.preprocess.params;
    if let Some(l_freq) = args.l_freq {
        params.l_freq = l_freq;
    }
    if let Some(h_freq) = args.h_freq {
        params.h_freq = h_freq;
    }
    if let Some(notch_freq) = args.notch_freq {
        params.notch_freq = notch_freq;
    }
    config.validate().context("Invalid pipeline configuration")?;

    let caches = Arc::new(PipelineCaches::new(&config.cache));
    let total = args.inputs.len();
    let names = output_names(&args.inputs);
    let mut tasks = Vec::with_capacity(args.inputs.len());
    for (input, name) in args.inputs.into_iter().zip(names) {
        let config = config.clone();
        let caches = Arc::clone(&caches);
        let destination = args.out.join(name);
        tasks.push((
            input.clone(),
            tokio::task::spawn_blocking(move || run_one(config, caches, &input, &destination)),
        ));
    }

    let mut failures = 0;
    for (input, task) in tasks {
        let outcome = task
            .await
            .with_context(|| format!("Worker for {} panicked", input.display()))?;
        match outcome {
            Ok(summary) => println!("{}", serde_json::to_string(&summary)?),
            Err(e) => {
                failures += 1;
                error!(input = %input.display(), error = %e, "processing failed");
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} inputs failed", failures, total);
    }
    Ok(())
}

fn run_one(config: PipelineConfig, caches: Arc<PipelineCaches>, input: &Path, destination: &Path) -> Result<RunSummary> {
    let params = config.params();
    let mut processor = EegProcessor::new(config, caches)?;
    match processor.run(input, params, Some(destination)) {
        Ok(summary) => {
            info!(input = %input.display(), out = %destination.display(), "results written");
            Ok(summary)
        }
        Err(e) => {
            // export failures leave the run completed
            let summary = processor.summary();
            Err(anyhow::Error::new(e).context(format!("run {} ended {}", summary.run_id, summary.status)))
        }
    }
}

/// Output subdirectory per input, unique within one invocation
///
/// Each input maps to `<stem>_<ext>`. Names that still collide, ignoring
/// case, get a `-2`, `-3`, ... suffix in input order.
fn output_names(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "recording".to_string());
            let base = match input.extension() {
                Some(ext) => format!("{}_{}", stem, ext.to_string_lossy()),
                None => stem,
            };
            let mut name = base.clone();
            let mut n = 1;
            while !taken.insert(name.to_lowercase()) {
                n += 1;
                name = format!("{}-{}", base, n);
            }
            PathBuf::from(name)
        })
        .collect()
}

fn simulate(args: SimulateArgs) -> Result<()> {
    let config = SimulationConfig {
        channels: args.channels,
        seconds: args.seconds,
        sampling_rate: args.rate,
        seed: args.seed,
        line_freq: (args.line_freq > 0.0).then_some(args.line_freq),
        artifacts: if args.artifacts {
            ArtifactConfig::all()
        } else {
            ArtifactConfig::default()
        },
        ..SimulationConfig::default()
    };
    let recording = EegSimulator::new(config)?.generate()?;
    write_csv(&recording, &args.out).with_context(|| format!("Failed to write {}", args.out.display()))?;
    info!(
        out = %args.out.display(),
        channels = recording.channel_count(),
        auxiliary = recording.auxiliary().len(),
        samples = recording.n_samples(),
        "simulated recording written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg_pipeline::export::FEATURES_FILE;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_output_names_are_unique() {
        let names = output_names(&paths(&["a/rec.csv", "b/rec.csv", "rec.edf", "c/REC.csv", "rec_csv-2.csv"]));
        assert_eq!(
            names,
            paths(&["rec_csv", "rec_csv-2", "rec_edf", "REC_csv-3", "rec_csv-2_csv"])
        );
        assert_eq!(output_names(&paths(&["notes"])), paths(&["notes"]));
    }

    #[tokio::test]
    async fn test_process_same_stem_inputs_into_separate_folders() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = Vec::new();
        for (sub, seed) in [("a", 1), ("b", 2)] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
            let config = SimulationConfig {
                channels: 6,
                seconds: 8.0,
                sampling_rate: 256.0,
                seed: Some(seed),
                artifacts: ArtifactConfig::all(),
                ..SimulationConfig::default()
            };
            let recording = EegSimulator::new(config).unwrap().generate().unwrap();
            let path = dir.path().join(sub).join("session.csv");
            write_csv(&recording, &path).unwrap();
            inputs.push(path);
        }
        let out = dir.path().join("out");

        let mut argv = vec![PathBuf::from("eeg-pipeline"), PathBuf::from("process")];
        argv.extend(inputs);
        argv.push(PathBuf::from("--out"));
        argv.push(out.clone());
        let Command::Process(args) = Cli::try_parse_from(argv).unwrap().command else {
            panic!("expected the process subcommand");
        };
        process(args).await.unwrap();

        let first = std::fs::read(out.join("session_csv").join(FEATURES_FILE)).unwrap();
        let second = std::fs::read(out.join("session_csv-2").join(FEATURES_FILE)).unwrap();
        assert_ne!(first, second);
    }
}
