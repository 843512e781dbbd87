//! Result export
//!
//! Writes, in order: the gzipped feature bundle, the SVG figures, the
//! gzipped filtered signal array and finally the HTML report. The first
//! three steps fail fast. Report rendering goes through a
//! [`ReportRenderer`] and is retried with backoff before the export fails.

use crate::config::ExportConfig;
use crate::figures::{connectivity_svg, psd_svg, signals_svg};
use crate::npy::write_npy_gz;
use crate::report::{Figures, ReportContext, ReportRenderer};
use eeg_core::{EegError, EegResult, Recording};
use eeg_processing::{FeatureBundle, PreprocessReport, Psd, Welch};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const FEATURES_FILE: &str = "features.json.gz";
pub const SIGNALS_FIGURE: &str = "signals.svg";
pub const PSD_FIGURE: &str = "psd.svg";
pub const CONNECTIVITY_FIGURE: &str = "connectivity.svg";
pub const FILTERED_FILE: &str = "filtered.npy.gz";
pub const REPORT_FILE: &str = "report.html";

/// Welch segment for the report spectra
const FIGURE_SEGMENT: usize = 2048;

/// One written artifact
#[derive(Debug, Clone, Serialize)]
pub struct ExportedFile {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// What an export produced
#[derive(Debug, Clone, Serialize)]
pub struct ExportManifest {
    pub destination: PathBuf,
    /// Files in the order they were written
    pub files: Vec<ExportedFile>,
    /// Rendering attempts the report needed
    pub report_attempts: u32,
}

impl ExportManifest {
    pub fn file(&self, name: &str) -> Option<&ExportedFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// Inputs for one export
pub struct ExportRequest<'a> {
    pub run_id: String,
    pub raw: &'a Recording,
    pub filtered: &'a Recording,
    pub bundle: &'a FeatureBundle,
    pub preprocessing: &'a PreprocessReport,
    /// "fresh" or a description of the recovery
    pub freshness: String,
    pub destination: &'a Path,
}

/// Writes run artifacts to a directory
pub struct Exporter {
    config: ExportConfig,
    renderer: Arc<dyn ReportRenderer>,
}

impl Exporter {
    pub fn new(config: ExportConfig, renderer: Arc<dyn ReportRenderer>) -> Self {
        Self { config, renderer }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn export(&self, request: &ExportRequest<'_>) -> EegResult<ExportManifest> {
        let destination = request.destination;
        fs::create_dir_all(destination)
            .map_err(|e| EegError::export("destination", format!("{}: {}", destination.display(), e)))?;
        let mut files = Vec::new();

        // (a) features
        let features_path = destination.join(FEATURES_FILE);
        write_features(&features_path, request.bundle)?;
        files.push(exported(FEATURES_FILE, features_path)?);

        // (b) figures
        let (freqs, raw_psd, filtered_psd) =
            mean_spectra(request.raw, request.filtered).map_err(|e| EegError::export("figures", e.to_string()))?;
        let figures = Figures {
            signals: signals_svg(
                &request.filtered.channel_names(),
                &request.raw.data(),
                &request.filtered.data(),
                request.filtered.sampling_rate(),
                self.config.plot_seconds,
                self.config.max_plot_points,
            ),
            psd: psd_svg(&freqs, &raw_psd, &filtered_psd),
            connectivity: connectivity_svg(&request.bundle.channel_names, &request.bundle.connectivity),
        };
        for (name, svg) in [
            (SIGNALS_FIGURE, &figures.signals),
            (PSD_FIGURE, &figures.psd),
            (CONNECTIVITY_FIGURE, &figures.connectivity),
        ] {
            let path = destination.join(name);
            fs::write(&path, svg).map_err(|e| EegError::export("figures", format!("{}: {}", name, e)))?;
            files.push(exported(name, path)?);
        }

        // (c) filtered signals
        let filtered_path = destination.join(FILTERED_FILE);
        write_npy_gz(&filtered_path, &request.filtered.data())
            .map_err(|e| EegError::export("signals", e.to_string()))?;
        files.push(exported(FILTERED_FILE, filtered_path)?);

        // (d) report
        let dominant_frequency = freqs
            .iter()
            .zip(&filtered_psd)
            .filter(|(f, _)| **f > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0.0, |(f, _)| *f);
        let (band_powers, feature_tables, connectivity) = ReportContext::tables(request.bundle);
        let context = ReportContext {
            run_id: request.run_id.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            source: request.raw.source().map(|fp| fp.to_hex()),
            sampling_rate: request.raw.sampling_rate(),
            duration_secs: request.raw.duration(),
            n_samples: request.raw.n_samples(),
            channel_names: request.filtered.channel_names(),
            auxiliary_names: request.raw.auxiliary().iter().map(|c| c.name.clone()).collect(),
            freshness: request.freshness.clone(),
            preprocessing: request.preprocessing.clone(),
            band_powers,
            feature_tables,
            connectivity,
            dominant_frequency,
            figures,
        };
        let (html, attempts) = self.render_with_retry(&context)?;
        let report_path = destination.join(REPORT_FILE);
        fs::write(&report_path, html).map_err(|e| EegError::export("report", e.to_string()))?;
        files.push(exported(REPORT_FILE, report_path)?);

        info!(
            destination = %destination.display(),
            files = files.len(),
            report_attempts = attempts,
            "export complete"
        );
        Ok(ExportManifest {
            destination: destination.to_path_buf(),
            files,
            report_attempts: attempts,
        })
    }

    /// Render the report, retrying the same context on failure
    fn render_with_retry(&self, context: &ReportContext) -> EegResult<(String, u32)> {
        let max_attempts = self.config.max_report_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.renderer.render(context) {
                Ok(html) => return Ok((html, attempt)),
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "report rendering failed");
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        std::thread::sleep(self.config.backoff(attempt));
                    }
                }
            }
        }

        Err(EegError::export(
            "report",
            format!("rendering failed after {} attempts: {}", max_attempts, last_error),
        ))
    }
}

fn exported(name: &str, path: PathBuf) -> EegResult<ExportedFile> {
    let bytes = fs::metadata(&path)
        .map_err(|e| EegError::export("manifest", format!("{}: {}", path.display(), e)))?
        .len();
    Ok(ExportedFile {
        name: name.to_string(),
        path,
        bytes,
    })
}

/// Gzipped JSON of a bundle that passes validation
fn write_features(path: &Path, bundle: &FeatureBundle) -> EegResult<()> {
    bundle
        .validate()
        .map_err(|e| EegError::export("features", e.to_string()))?;
    let json = serde_json::to_vec_pretty(bundle)
        .map_err(|e| EegError::export("features", format!("serialization failed: {}", e)))?;

    let write = || -> std::io::Result<()> {
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
        encoder.write_all(&json)?;
        encoder.finish()?.flush()
    };
    write().map_err(|e| EegError::export("features", e.to_string()))
}

/// Channel-averaged spectra of the raw and filtered recordings
fn mean_spectra(raw: &Recording, filtered: &Recording) -> EegResult<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let fs = filtered.sampling_rate();
    let mut welch = Welch::new(FIGURE_SEGMENT, 0.5);
    let mut average = |recording: &Recording| -> EegResult<Psd> {
        let spectra = recording
            .channels()
            .iter()
            .map(|channel| welch.estimate(&channel.data, fs))
            .collect::<EegResult<Vec<Psd>>>()?;
        let mut spectra = spectra.into_iter();
        let mut mean = spectra
            .next()
            .ok_or_else(|| EegError::processing("recording has no EEG channels"))?;
        for psd in spectra {
            mean.power.iter_mut().zip(&psd.power).for_each(|(a, p)| *a += p);
        }
        let n = recording.channel_count() as f64;
        mean.power.iter_mut().for_each(|p| *p /= n);
        Ok(mean)
    };

    let raw_psd = average(raw)?;
    let filtered_psd = average(filtered)?;
    Ok((filtered_psd.freqs, raw_psd.power, filtered_psd.power))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_context;
    use crate::report::HtmlReportRenderer;
    use eeg_core::{Channel, RecordingStage};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingRenderer {
        calls: AtomicU32,
        succeed_on: Option<u32>,
    }

    impl FailingRenderer {
        fn new(succeed_on: Option<u32>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                succeed_on,
            })
        }
    }

    impl ReportRenderer for FailingRenderer {
        fn render(&self, _context: &ReportContext) -> EegResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.succeed_on {
                Some(n) if call >= n => Ok("<html></html>".into()),
                _ => Err(EegError::export("report", "renderer offline")),
            }
        }
    }

    fn recordings() -> (Recording, Recording) {
        let fs = 128.0;
        let channels = ["O1", "O2"]
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let data = (0..512)
                    .map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / fs + c as f64).sin())
                    .collect();
                Channel::new(*name, data)
            })
            .collect();
        let raw = Recording::new(fs, channels).unwrap();
        let filtered_data = raw.data().iter().map(|c| c.iter().map(|v| v * 0.5).collect()).collect();
        let filtered = raw.derive(RecordingStage::Filtered, filtered_data).unwrap();
        (raw, filtered)
    }

    fn fast_config() -> ExportConfig {
        ExportConfig {
            report_backoff_ms: 0,
            ..ExportConfig::default()
        }
    }

    fn request<'a>(
        raw: &'a Recording,
        filtered: &'a Recording,
        bundle: &'a FeatureBundle,
        preprocessing: &'a PreprocessReport,
        destination: &'a Path,
    ) -> ExportRequest<'a> {
        ExportRequest {
            run_id: "run-test".into(),
            raw,
            filtered,
            bundle,
            preprocessing,
            freshness: "fresh".into(),
            destination,
        }
    }

    #[test]
    fn test_full_export_writes_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (raw, filtered) = recordings();
        let context = sample_context();
        let bundle = crate::report::tests::sample_bundle();
        let exporter = Exporter::new(fast_config(), Arc::new(HtmlReportRenderer::new().unwrap()));

        let manifest = exporter
            .export(&request(&raw, &filtered, &bundle, &context.preprocessing, dir.path()))
            .unwrap();
        let names: Vec<&str> = manifest.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![FEATURES_FILE, SIGNALS_FIGURE, PSD_FIGURE, CONNECTIVITY_FIGURE, FILTERED_FILE, REPORT_FILE]
        );
        assert_eq!(manifest.report_attempts, 1);
        assert!(manifest.files.iter().all(|f| f.bytes > 0));

        let mut json = String::new();
        GzDecoder::new(File::open(dir.path().join(FEATURES_FILE)).unwrap())
            .read_to_string(&mut json)
            .unwrap();
        let restored: FeatureBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, bundle);

        let html = fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap();
        assert!(html.contains("run-test"));
    }

    #[test]
    fn test_report_retried_then_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let (raw, filtered) = recordings();
        let context = sample_context();
        let bundle = crate::report::tests::sample_bundle();
        let renderer = FailingRenderer::new(None);
        let exporter = Exporter::new(fast_config(), renderer.clone());

        let err = exporter
            .export(&request(&raw, &filtered, &bundle, &context.preprocessing, dir.path()))
            .unwrap_err();
        assert!(matches!(err, EegError::Export { step: "report", .. }));
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
        // Earlier artifacts stay on disk
        assert!(dir.path().join(FILTERED_FILE).exists());
        assert!(!dir.path().join(REPORT_FILE).exists());
    }

    #[test]
    fn test_report_recovers_on_later_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (raw, filtered) = recordings();
        let context = sample_context();
        let bundle = crate::report::tests::sample_bundle();
        let renderer = FailingRenderer::new(Some(2));
        let exporter = Exporter::new(fast_config(), renderer.clone());

        let manifest = exporter
            .export(&request(&raw, &filtered, &bundle, &context.preprocessing, dir.path()))
            .unwrap();
        assert_eq!(manifest.report_attempts, 2);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_feature_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (raw, filtered) = recordings();
        let context = sample_context();
        let mut bundle = crate::report::tests::sample_bundle();
        bundle.temporal.insert("mean".into(), vec![f64::NAN, 0.0]);
        let renderer = FailingRenderer::new(Some(1));
        let exporter = Exporter::new(fast_config(), renderer.clone());

        let err = exporter
            .export(&request(&raw, &filtered, &bundle, &context.preprocessing, dir.path()))
            .unwrap_err();
        assert!(matches!(err, EegError::Export { step: "features", .. }));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join(FEATURES_FILE).exists());
    }
}
