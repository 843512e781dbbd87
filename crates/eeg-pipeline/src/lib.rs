//! EEG-Pipeline: Loading, caching, orchestration and export
//!
//! Wires the processing stages of `eeg-processing` into single-shot runs
//! driven by [`EegProcessor`], backed by content-addressed caches shared
//! between runs and an exporter that writes the artifact bundle.

pub mod cache;
pub mod config;
pub mod edf;
pub mod export;
pub mod figures;
pub mod loader;
pub mod metrics;
pub mod npy;
pub mod orchestrator;
pub mod report;

pub use cache::{CacheStats, FingerprintCache, PipelineCaches};
pub use config::{CacheConfig, ExportConfig, LoaderConfig, PipelineConfig, RecoveryScope};
pub use export::{ExportManifest, ExportRequest, ExportedFile, Exporter};
pub use loader::{LoadedRecording, RecordingLoader};
pub use metrics::{InMemoryMetrics, NoopMetrics, PipelineMetrics, StageTally};
pub use orchestrator::{EegProcessor, Extraction, FilteredHandle, Freshness, RecordingHandle, RunSummary};
pub use report::{HtmlReportRenderer, ReportContext, ReportRenderer};
