#![allow(dead_code)]

use eeg_pipeline::{PipelineCaches, PipelineConfig};
use eeg_simulation::{write_csv, ArtifactConfig, EegSimulator, SimulationConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn simulation(seed: u64) -> SimulationConfig {
    SimulationConfig {
        channels: 6,
        seconds: 8.0,
        sampling_rate: 256.0,
        seed: Some(seed),
        artifacts: ArtifactConfig::all(),
        ..SimulationConfig::default()
    }
}

/// Write a seeded recording to `dir/name`
pub fn write_recording(dir: &Path, name: &str, seed: u64) -> PathBuf {
    let recording = EegSimulator::new(simulation(seed)).unwrap().generate().unwrap();
    let path = dir.join(name);
    write_csv(&recording, &path).unwrap();
    path
}

pub fn shared_caches() -> Arc<PipelineCaches> {
    Arc::new(PipelineCaches::default())
}

/// Config whose extraction always fails feature validation
///
/// With fewer samples than the embedding needs, sample entropy has no
/// template matches and comes out infinite.
pub fn failing_extraction() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.features.complexity.embedding_dim = 20;
    config.features.complexity.max_samples = 16;
    config
}

/// Export settings without waiting between report attempts
pub fn fast_export(mut config: PipelineConfig) -> PipelineConfig {
    config.export.report_backoff_ms = 0;
    config
}
