//! Recording loader
//!
//! Reads the source once, fingerprints those bytes and answers from the
//! recording cache when it can. Otherwise it parses by file extension.
//! Delimited text (`.csv`, `.tsv`) carries one column per channel with an
//! optional leading time column; `.edf` files go through [`crate::edf`].

use crate::cache::PipelineCaches;
use crate::config::LoaderConfig;
use crate::edf;
use eeg_core::{Channel, EegError, EegResult, Fingerprint, FingerprintHasher, Recording};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of one load
#[derive(Debug, Clone)]
pub struct LoadedRecording {
    pub recording: Arc<Recording>,
    /// Fingerprint of the source bytes
    pub fingerprint: Fingerprint,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Delimited(u8),
    Edf,
}

impl SourceFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(SourceFormat::Delimited(b',')),
            "tsv" => Some(SourceFormat::Delimited(b'\t')),
            "edf" => Some(SourceFormat::Edf),
            _ => None,
        }
    }
}

/// Loads recordings through the shared recording cache
pub struct RecordingLoader {
    config: LoaderConfig,
    caches: Arc<PipelineCaches>,
}

impl RecordingLoader {
    pub fn new(config: LoaderConfig, caches: Arc<PipelineCaches>) -> Self {
        Self { config, caches }
    }

    pub fn load(&self, source: &Path) -> EegResult<LoadedRecording> {
        let name = source.display().to_string();
        let format = SourceFormat::from_path(source)
            .ok_or_else(|| EegError::invalid_format(&name, "unsupported file extension"))?;
        let bytes = std::fs::read(source)
            .map_err(|e| EegError::invalid_format(&name, format!("cannot read source: {}", e)))?;
        let fingerprint = Fingerprint::of_bytes(&bytes);
        let key = self.cache_key(&fingerprint, format);

        if let Some(recording) = self.caches.recordings().get(&key) {
            info!(source = %name, fingerprint = %fingerprint.short(), "recording cache hit");
            return Ok(LoadedRecording {
                recording,
                fingerprint,
                cache_hit: true,
            });
        }

        let recording = match format {
            SourceFormat::Delimited(delimiter) => self.parse_delimited(&name, &bytes, delimiter)?,
            SourceFormat::Edf => parse_edf(&name, &bytes)?,
        }
        .with_source(fingerprint);
        recording.validate()?;

        info!(
            source = %name,
            fingerprint = %fingerprint.short(),
            channels = recording.channel_count(),
            auxiliary = recording.auxiliary().len(),
            samples = recording.n_samples(),
            sampling_rate = recording.sampling_rate(),
            "recording loaded"
        );
        let recording = self.caches.recordings().insert(key, recording);
        Ok(LoadedRecording {
            recording,
            fingerprint,
            cache_hit: false,
        })
    }

    /// Recording cache key: the source bytes plus every setting the parse depends on
    fn cache_key(&self, content: &Fingerprint, format: SourceFormat) -> Fingerprint {
        let mut hasher = FingerprintHasher::new();
        hasher.update(content.as_bytes());
        match format {
            SourceFormat::Delimited(delimiter) => {
                hasher.update(&[b'd', delimiter]);
                match self.config.default_sampling_rate {
                    Some(rate) => {
                        hasher.update(b"r");
                        hasher.update(&rate.to_le_bytes());
                    }
                    None => hasher.update(b"-"),
                }
            }
            SourceFormat::Edf => hasher.update(b"edf"),
        }
        hasher.finalize()
    }

    fn parse_delimited(&self, name: &str, bytes: &[u8], delimiter: u8) -> EegResult<Recording> {
        let invalid = |reason: String| EegError::invalid_format(name, reason);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(bytes);
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| invalid(format!("cannot read header row: {}", e)))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() {
            return Err(invalid("header row is empty".into()));
        }

        let has_time = headers[0].eq_ignore_ascii_case("time");
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| invalid(format!("row {}: {}", row + 2, e)))?;
            for (col, cell) in record.iter().enumerate() {
                let value = if cell.is_empty() {
                    f64::NAN
                } else {
                    cell.parse::<f64>().map_err(|_| {
                        invalid(format!(
                            "row {}, column '{}': '{}' is not a number",
                            row + 2,
                            headers[col],
                            cell
                        ))
                    })?
                };
                columns[col].push(value);
            }
        }

        let sampling_rate = if has_time {
            match rate_from_time(&columns[0]) {
                Some(rate) => rate,
                None => self
                    .config
                    .default_sampling_rate
                    .ok_or_else(|| invalid("cannot derive sampling rate from time column".into()))?,
            }
        } else {
            self.config.default_sampling_rate.ok_or_else(|| {
                invalid("no time column and no default sampling rate configured".into())
            })?
        };
        debug!(sampling_rate, has_time, "delimited source parsed");

        let skip = usize::from(has_time);
        let channels = headers
            .into_iter()
            .zip(columns)
            .skip(skip)
            .map(|(label, data)| Channel::new(label, data))
            .collect();
        Recording::new(sampling_rate, channels)
    }
}

/// Sampling rate from the median spacing of a time column
fn rate_from_time(times: &[f64]) -> Option<f64> {
    let mut diffs: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    if diffs.is_empty() || diffs.iter().any(|d| !d.is_finite()) {
        return None;
    }
    diffs.sort_by(|a, b| a.total_cmp(b));
    let spacing = diffs[diffs.len() / 2];
    if spacing <= 0.0 {
        return None;
    }
    let rate = 1.0 / spacing;
    // Timestamps printed in decimal rarely invert exactly
    if (rate - rate.round()).abs() < 1e-6 * rate {
        Some(rate.round())
    } else {
        Some(rate)
    }
}

fn parse_edf(name: &str, bytes: &[u8]) -> EegResult<Recording> {
    let (rate, channels) = edf::parse(bytes)
        .and_then(edf::EdfFile::into_channels)
        .map_err(|e| EegError::invalid_format(name, e.to_string()))?;
    Recording::new(rate, channels)
}
