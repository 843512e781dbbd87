use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "eeg-pipeline",
    version,
    about = "Clean EEG recordings, extract features and export a report",
    long_about = "Load EEG recordings (CSV/TSV or EDF), band-pass and notch filter them, \
                  repair bad channels, remove artifact components with ICA, extract \
                  spectral, temporal, statistical, complexity and connectivity features \
                  and write the results with an HTML report.\n\
                  Log verbosity follows RUST_LOG (default: info)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process one or more recordings
    Process(ProcessArgs),
    /// Write a synthetic recording as CSV
    Simulate(SimulateArgs),
}

#[derive(Args)]
pub struct ProcessArgs {
    /// Input recordings (.csv, .tsv, .edf)
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Output directory; each input gets its own subdirectory named `<stem>_<ext>`
    #[arg(long)]
    pub out: PathBuf,

    /// Pipeline configuration (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// High-pass corner (Hz)
    #[arg(long)]
    pub l_freq: Option<f64>,

    /// Low-pass corner (Hz)
    #[arg(long)]
    pub h_freq: Option<f64>,

    /// Line frequency to notch (Hz)
    #[arg(long)]
    pub notch_freq: Option<f64>,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Output CSV file
    #[arg(long)]
    pub out: PathBuf,

    /// Number of EEG channels
    #[arg(long, default_value_t = 8)]
    pub channels: usize,

    /// Duration in seconds
    #[arg(long, default_value_t = 10.0)]
    pub seconds: f64,

    /// Sampling rate (Hz)
    #[arg(long, default_value_t = 256.0)]
    pub rate: f64,

    /// RNG seed for a reproducible recording
    #[arg(long)]
    pub seed: Option<u64>,

    /// Line hum frequency (Hz), 0 for none
    #[arg(long, default_value_t = 50.0)]
    pub line_freq: f64,

    /// Add blink, heartbeat and motion artifacts with their reference channels
    #[arg(long)]
    pub artifacts: bool,
}
