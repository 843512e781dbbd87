//! Run orchestration
//!
//! An [`EegProcessor`] drives exactly one run through
//! `load -> preprocess -> extract -> export`. Each stage hands back a handle
//! tied to the run; passing a handle from another run, or calling a stage
//! out of order, is rejected. The run status only moves forward and any
//! error before extraction completes marks the run failed.

use crate::cache::PipelineCaches;
use crate::config::{PipelineConfig, RecoveryScope};
use crate::export::{ExportManifest, ExportRequest, Exporter};
use crate::loader::RecordingLoader;
use crate::metrics::{NoopMetrics, PipelineMetrics};
use crate::report::{HtmlReportRenderer, ReportRenderer};
use chrono::{DateTime, Utc};
use eeg_core::{EegError, EegResult, ErrorKind, Fingerprint, ProcessingStatus, Recording};
use eeg_processing::{FeatureBundle, FeatureExtractor, PreprocessEngine, PreprocessParams, PreprocessReport};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Raw recording of a run
#[derive(Debug, Clone)]
pub struct RecordingHandle {
    run_id: Uuid,
    pub recording: Arc<Recording>,
    pub fingerprint: Fingerprint,
    pub cache_hit: bool,
}

/// Cleaned recording of a run
#[derive(Debug, Clone)]
pub struct FilteredHandle {
    run_id: Uuid,
    pub recording: Arc<Recording>,
    pub report: Arc<PreprocessReport>,
}

/// Whether features were computed by this run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    /// A cached bundle stood in after extraction failed
    Recovered { cause: String, bundle: Fingerprint },
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh)
    }

    fn describe(&self) -> String {
        match self {
            Freshness::Fresh => "fresh".to_string(),
            Freshness::Recovered { cause, bundle } => {
                format!("recovered from cached bundle {} after: {}", bundle.short(), cause)
            }
        }
    }
}

/// Features of a run
#[derive(Debug, Clone)]
pub struct Extraction {
    pub bundle: Arc<FeatureBundle>,
    pub fingerprint: Fingerprint,
    pub freshness: Freshness,
}

/// Snapshot of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: ProcessingStatus,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub freshness: Option<Freshness>,
    pub source: Option<Fingerprint>,
    pub bundle: Option<Fingerprint>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: f64,
}

/// One-shot pipeline run
pub struct EegProcessor {
    run_id: Uuid,
    config: PipelineConfig,
    caches: Arc<PipelineCaches>,
    metrics: Arc<dyn PipelineMetrics>,
    renderer: Arc<dyn ReportRenderer>,
    loader: RecordingLoader,
    engine: PreprocessEngine,
    extractor: FeatureExtractor,

    status: ProcessingStatus,
    failure: Option<(ErrorKind, String)>,
    started: Option<(Instant, DateTime<Utc>)>,
    finished_ms: Option<f64>,
    raw: Option<RecordingHandle>,
    filtered: Option<FilteredHandle>,
    extraction: Option<Extraction>,
}

impl EegProcessor {
    /// Processor with no-op metrics and the HTML report renderer
    pub fn new(config: PipelineConfig, caches: Arc<PipelineCaches>) -> EegResult<Self> {
        config.validate()?;
        let renderer: Arc<dyn ReportRenderer> = Arc::new(HtmlReportRenderer::new()?);
        let loader = RecordingLoader::new(config.loader.clone(), Arc::clone(&caches));
        let engine = PreprocessEngine::new(config.preprocess.clone(), config.ica.clone(), &config.artifacts);
        let extractor = FeatureExtractor::new(config.features.clone())?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            config,
            caches,
            metrics: Arc::new(NoopMetrics),
            renderer,
            loader,
            engine,
            extractor,
            status: ProcessingStatus::Pending,
            failure: None,
            started: None,
            finished_ms: None,
            raw: None,
            filtered: None,
            extraction: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the run's recording
    pub fn load(&mut self, source: impl AsRef<Path>) -> EegResult<RecordingHandle> {
        if self.status != ProcessingStatus::Pending {
            return Err(EegError::Reentrancy {
                status: self.status.to_string(),
            });
        }
        self.started = Some((Instant::now(), Utc::now()));
        self.status.advance(ProcessingStatus::Processing)?;

        let source = source.as_ref();
        info!(run_id = %self.run_id, source = %source.display(), "run started");
        let timer = Instant::now();
        let result = self.loader.load(source);
        self.metrics.stage_completed("load", timer.elapsed(), result.is_ok());

        let loaded = self.check(result)?;
        self.metrics.cache_lookup("recordings", loaded.cache_hit);
        let handle = RecordingHandle {
            run_id: self.run_id,
            recording: loaded.recording,
            fingerprint: loaded.fingerprint,
            cache_hit: loaded.cache_hit,
        };
        self.raw = Some(handle.clone());
        Ok(handle)
    }

    /// Clean the loaded recording
    pub fn preprocess(&mut self, handle: &RecordingHandle, params: PreprocessParams) -> EegResult<FilteredHandle> {
        let ready = self.expect_stage(handle.run_id, "preprocess", self.raw.is_some() && self.filtered.is_none());
        self.check(ready)?;

        let timer = Instant::now();
        let result = self.engine.preprocess(&handle.recording, params);
        self.metrics.stage_completed("preprocess", timer.elapsed(), result.is_ok());

        let preprocessed = self.check(result)?;
        let filtered = FilteredHandle {
            run_id: self.run_id,
            recording: Arc::new(preprocessed.recording),
            report: Arc::new(preprocessed.report),
        };
        self.filtered = Some(filtered.clone());
        Ok(filtered)
    }

    /// Extract features and complete the run
    pub fn extract(&mut self, handle: &FilteredHandle) -> EegResult<Extraction> {
        let ready = self.expect_stage(
            handle.run_id,
            "extract",
            self.filtered.is_some() && self.extraction.is_none(),
        );
        self.check(ready)?;

        let timer = Instant::now();
        let result = self
            .extractor
            .extract(&handle.recording)
            .and_then(|bundle| self.caches.store_bundle(handle.recording.source(), bundle));
        self.metrics.stage_completed("extract", timer.elapsed(), result.is_ok());

        let extraction = match result {
            Ok((fingerprint, bundle)) => Extraction {
                bundle,
                fingerprint,
                freshness: Freshness::Fresh,
            },
            Err(e) => match self.recover(handle.recording.source(), &e) {
                Some(extraction) => extraction,
                None => return Err(self.fail(e)),
            },
        };

        self.status.advance(ProcessingStatus::Completed)?;
        self.finished_ms = self.started.map(|(t, _)| t.elapsed().as_secs_f64() * 1000.0);
        info!(
            run_id = %self.run_id,
            bundle = %extraction.fingerprint.short(),
            fresh = extraction.freshness.is_fresh(),
            "run completed"
        );
        self.extraction = Some(extraction.clone());
        Ok(extraction)
    }

    /// Write artifacts for a completed run; failures leave the status alone
    pub fn export(&self, handle: &FilteredHandle, destination: impl AsRef<Path>) -> EegResult<ExportManifest> {
        if handle.run_id != self.run_id {
            return Err(foreign_handle("export"));
        }
        let (Some(raw), Some(extraction), Some(filtered)) = (&self.raw, &self.extraction, &self.filtered) else {
            return Err(EegError::InvalidState {
                reason: format!("export requires a completed run, status is {}", self.status),
            });
        };

        let exporter = Exporter::new(self.config.export.clone(), Arc::clone(&self.renderer));
        let timer = Instant::now();
        let result = exporter.export(&ExportRequest {
            run_id: self.run_id.to_string(),
            raw: &raw.recording,
            filtered: &filtered.recording,
            bundle: &extraction.bundle,
            preprocessing: &filtered.report,
            freshness: extraction.freshness.describe(),
            destination: destination.as_ref(),
        });
        self.metrics.stage_completed("export", timer.elapsed(), result.is_ok());
        if let Err(e) = &result {
            warn!(run_id = %self.run_id, error = %e, "export failed");
        }
        result
    }

    /// Load, preprocess, extract and optionally export in one call
    pub fn run(
        &mut self,
        source: impl AsRef<Path>,
        params: PreprocessParams,
        destination: Option<&Path>,
    ) -> EegResult<RunSummary> {
        let raw = self.load(source)?;
        let filtered = self.preprocess(&raw, params)?;
        self.extract(&filtered)?;
        if let Some(destination) = destination {
            self.export(&filtered, destination)?;
        }
        Ok(self.summary())
    }

    pub fn summary(&self) -> RunSummary {
        let elapsed_ms = self.finished_ms.unwrap_or_else(|| {
            self.started
                .map_or(0.0, |(t, _)| t.elapsed().as_secs_f64() * 1000.0)
        });
        RunSummary {
            run_id: self.run_id,
            status: self.status,
            error_kind: self.failure.as_ref().map(|(kind, _)| *kind),
            error_message: self.failure.as_ref().map(|(_, message)| message.clone()),
            freshness: self.extraction.as_ref().map(|e| e.freshness.clone()),
            source: self.raw.as_ref().map(|r| r.fingerprint),
            bundle: self.extraction.as_ref().map(|e| e.fingerprint),
            started_at: self.started.map(|(_, at)| at),
            elapsed_ms,
        }
    }

    /// Check a handle and stage precondition
    fn expect_stage(&self, run_id: Uuid, stage: &str, ready: bool) -> EegResult<()> {
        if run_id != self.run_id {
            return Err(foreign_handle(stage));
        }
        if self.status != ProcessingStatus::Processing || !ready {
            return Err(EegError::InvalidState {
                reason: format!("{} called out of order (run is {})", stage, self.status),
            });
        }
        Ok(())
    }

    /// Pass results through, routing errors of a live run to `Failed`
    fn check<T>(&mut self, result: EegResult<T>) -> EegResult<T> {
        result.map_err(|e| self.fail(e))
    }

    fn fail(&mut self, e: EegError) -> EegError {
        if !self.status.is_terminal() && self.status.advance(ProcessingStatus::Failed).is_ok() {
            error!(run_id = %self.run_id, kind = %e.kind(), error = %e, "run failed");
            self.failure = Some((e.kind(), e.to_string()));
            self.finished_ms = self.started.map(|(t, _)| t.elapsed().as_secs_f64() * 1000.0);
        }
        e
    }

    /// Substitute a cached bundle for a failed extraction, if allowed
    fn recover(&self, source: Option<Fingerprint>, cause: &EegError) -> Option<Extraction> {
        let found = match self.config.recovery {
            RecoveryScope::Disabled => None,
            RecoveryScope::SameSource => source.and_then(|s| self.caches.bundle_for_source(&s)),
            RecoveryScope::AnyRecent => self.caches.latest_bundle(),
        };
        self.metrics.cache_lookup("bundles", found.is_some());

        let (fingerprint, bundle) = found?;
        warn!(
            run_id = %self.run_id,
            bundle = %fingerprint.short(),
            scope = ?self.config.recovery,
            error = %cause,
            "extraction failed, using cached bundle"
        );
        Some(Extraction {
            bundle,
            fingerprint,
            freshness: Freshness::Recovered {
                cause: cause.to_string(),
                bundle: fingerprint,
            },
        })
    }
}

fn foreign_handle(stage: &str) -> EegError {
    EegError::InvalidState {
        reason: format!("{} received a handle from another run", stage),
    }
}
