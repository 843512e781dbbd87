//! European Data Format (EDF/EDF+) parsing
//!
//! Layout: a 256-byte fixed header, then 256 bytes of per-signal header
//! fields stored field-major, then data records. Each record holds
//! `samples_per_record` little-endian `i16` values per signal, in signal
//! order. Digital values map linearly onto the physical range.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use eeg_core::{Channel, ChannelKind};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

const FIXED_HEADER_BYTES: usize = 256;
const SIGNAL_HEADER_BYTES: usize = 256;
const ANNOTATION_LABEL: &str = "EDF Annotations";

#[derive(Debug, Error)]
pub enum EdfError {
    #[error("file ends inside {what} ({needed} bytes needed, {available} available)")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("invalid {field} '{value}'")]
    Field { field: &'static str, value: String },

    #[error("{0}")]
    Layout(String),
}

/// Fixed part of the header
#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub version: String,
    pub patient_id: String,
    pub recording_id: String,
    /// dd.mm.yy
    pub start_date: String,
    /// hh.mm.ss
    pub start_time: String,
    pub header_bytes: usize,
    pub reserved: String,
    /// -1 when the writer did not know the count
    pub num_data_records: i64,
    pub record_duration: f64,
    pub num_signals: usize,
}

impl EdfHeader {
    /// Recording start, with the EDF 1985-2084 year window
    pub fn start(&self) -> Option<NaiveDateTime> {
        let date: Vec<u32> = self
            .start_date
            .split('.')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<_>>()?;
        let time: Vec<u32> = self
            .start_time
            .split('.')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<_>>()?;
        if date.len() != 3 || time.len() != 3 {
            return None;
        }
        let year = if date[2] >= 85 { 1900 + date[2] } else { 2000 + date[2] };
        let date = NaiveDate::from_ymd_opt(year as i32, date[1], date[0])?;
        let time = NaiveTime::from_hms_opt(time[0], time[1], time[2])?;
        Some(NaiveDateTime::new(date, time))
    }
}

/// Per-signal header
#[derive(Debug, Clone)]
pub struct EdfSignalHeader {
    pub label: String,
    pub transducer_type: String,
    pub physical_dimension: String,
    pub physical_minimum: f64,
    pub physical_maximum: f64,
    pub digital_minimum: i64,
    pub digital_maximum: i64,
    pub prefiltering: String,
    pub samples_per_record: usize,
    pub reserved: String,
}

impl EdfSignalHeader {
    pub fn sample_frequency(&self, record_duration: f64) -> f64 {
        self.samples_per_record as f64 / record_duration
    }

    pub fn gain(&self) -> f64 {
        (self.physical_maximum - self.physical_minimum)
            / (self.digital_maximum - self.digital_minimum) as f64
    }

    pub fn offset(&self) -> f64 {
        self.physical_maximum - self.gain() * self.digital_maximum as f64
    }

    pub fn is_annotation(&self) -> bool {
        self.label == ANNOTATION_LABEL
    }
}

/// Parsed file with physical sample values per signal
#[derive(Debug, Clone)]
pub struct EdfFile {
    pub header: EdfHeader,
    pub signals: Vec<EdfSignalHeader>,
    pub data: Vec<Vec<f64>>,
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], EdfError> {
        let available = self.bytes.len().saturating_sub(self.pos);
        if available < len {
            return Err(EdfError::Truncated {
                what,
                needed: len,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn text(&mut self, len: usize, what: &'static str) -> Result<String, EdfError> {
        Ok(String::from_utf8_lossy(self.take(len, what)?).trim().to_string())
    }

    fn number<T: FromStr>(&mut self, len: usize, field: &'static str) -> Result<T, EdfError> {
        let value = self.text(len, field)?;
        value.parse().map_err(|_| EdfError::Field { field, value })
    }
}

fn read_header(cursor: &mut ByteCursor<'_>) -> Result<EdfHeader, EdfError> {
    let header = EdfHeader {
        version: cursor.text(8, "version")?,
        patient_id: cursor.text(80, "patient id")?,
        recording_id: cursor.text(80, "recording id")?,
        start_date: cursor.text(8, "start date")?,
        start_time: cursor.text(8, "start time")?,
        header_bytes: cursor.number(8, "header size")?,
        reserved: cursor.text(44, "reserved")?,
        num_data_records: cursor.number(8, "number of data records")?,
        record_duration: cursor.number(8, "record duration")?,
        num_signals: cursor.number(4, "number of signals")?,
    };
    if !(header.record_duration > 0.0) {
        return Err(EdfError::Field {
            field: "record duration",
            value: header.record_duration.to_string(),
        });
    }
    if header.num_signals == 0 {
        return Err(EdfError::Layout("file declares no signals".into()));
    }
    Ok(header)
}

fn read_signal_headers(cursor: &mut ByteCursor<'_>, ns: usize) -> Result<Vec<EdfSignalHeader>, EdfError> {
    fn column<T>(
        ns: usize,
        mut read: impl FnMut() -> Result<T, EdfError>,
    ) -> Result<Vec<T>, EdfError> {
        (0..ns).map(|_| read()).collect()
    }

    let labels = column(ns, || cursor.text(16, "label"))?;
    let transducers = column(ns, || cursor.text(80, "transducer type"))?;
    let dimensions = column(ns, || cursor.text(8, "physical dimension"))?;
    let physical_min = column(ns, || cursor.number::<f64>(8, "physical minimum"))?;
    let physical_max = column(ns, || cursor.number::<f64>(8, "physical maximum"))?;
    let digital_min = column(ns, || cursor.number::<i64>(8, "digital minimum"))?;
    let digital_max = column(ns, || cursor.number::<i64>(8, "digital maximum"))?;
    let prefiltering = column(ns, || cursor.text(80, "prefiltering"))?;
    let samples = column(ns, || cursor.number::<usize>(8, "samples per record"))?;
    let reserved = column(ns, || cursor.text(32, "signal reserved"))?;

    let mut headers = Vec::with_capacity(ns);
    for i in 0..ns {
        if digital_max[i] <= digital_min[i] {
            return Err(EdfError::Field {
                field: "digital range",
                value: format!("{}..{} for '{}'", digital_min[i], digital_max[i], labels[i]),
            });
        }
        headers.push(EdfSignalHeader {
            label: labels[i].clone(),
            transducer_type: transducers[i].clone(),
            physical_dimension: dimensions[i].clone(),
            physical_minimum: physical_min[i],
            physical_maximum: physical_max[i],
            digital_minimum: digital_min[i],
            digital_maximum: digital_max[i],
            prefiltering: prefiltering[i].clone(),
            samples_per_record: samples[i],
            reserved: reserved[i].clone(),
        });
    }
    Ok(headers)
}

/// Parse a complete EDF file held in memory
pub fn parse(bytes: &[u8]) -> Result<EdfFile, EdfError> {
    let mut cursor = ByteCursor { bytes, pos: 0 };
    let header = read_header(&mut cursor)?;
    let signals = read_signal_headers(&mut cursor, header.num_signals)?;

    let expected_header = FIXED_HEADER_BYTES + SIGNAL_HEADER_BYTES * header.num_signals;
    if header.header_bytes != expected_header {
        return Err(EdfError::Layout(format!(
            "header size {} does not match {} signals ({} expected)",
            header.header_bytes, header.num_signals, expected_header
        )));
    }

    let record_bytes: usize = signals.iter().map(|s| s.samples_per_record * 2).sum();
    if record_bytes == 0 {
        return Err(EdfError::Layout("data records are empty".into()));
    }
    let available = (bytes.len() - expected_header) / record_bytes;
    let n_records = if header.num_data_records < 0 {
        available
    } else {
        header.num_data_records as usize
    };
    if n_records > available {
        return Err(EdfError::Truncated {
            what: "data records",
            needed: n_records * record_bytes,
            available: bytes.len() - expected_header,
        });
    }

    let mut data: Vec<Vec<f64>> = signals
        .iter()
        .map(|s| Vec::with_capacity(s.samples_per_record * n_records))
        .collect();
    for _ in 0..n_records {
        for (signal, out) in signals.iter().zip(data.iter_mut()) {
            let (gain, offset) = (signal.gain(), signal.offset());
            let raw = cursor.take(signal.samples_per_record * 2, "data record")?;
            out.extend(
                raw.chunks_exact(2)
                    .map(|pair| gain * i16::from_le_bytes([pair[0], pair[1]]) as f64 + offset),
            );
        }
    }

    debug!(
        records = n_records,
        signals = header.num_signals,
        start = ?header.start(),
        "EDF parsed"
    );
    Ok(EdfFile { header, signals, data })
}

impl EdfFile {
    /// Sampling rate and channels ready for a [`eeg_core::Recording`]
    ///
    /// Annotation signals are skipped. EEG signals must share one rate;
    /// auxiliary signals at a different rate are dropped with a warning.
    pub fn into_channels(self) -> Result<(f64, Vec<Channel>), EdfError> {
        let duration = self.header.record_duration;
        let mut rate: Option<f64> = None;
        let mut channels = Vec::new();

        let signals: Vec<_> = self.signals.into_iter().zip(self.data).collect();
        // EEG signals decide the rate, so look at them first
        let eeg_rate = signals
            .iter()
            .find(|(s, _)| !s.is_annotation() && !ChannelKind::classify(&s.label).is_auxiliary())
            .map(|(s, _)| s.sample_frequency(duration));

        for (signal, values) in signals {
            if signal.is_annotation() {
                continue;
            }
            let fs = signal.sample_frequency(duration);
            let kind = ChannelKind::classify(&signal.label);
            let reference = *rate.get_or_insert(eeg_rate.unwrap_or(fs));
            if (fs - reference).abs() > 1e-9 {
                if kind.is_auxiliary() {
                    warn!(label = %signal.label, fs, reference, "dropping auxiliary signal with mismatched rate");
                    continue;
                }
                return Err(EdfError::Layout(format!(
                    "signal '{}' is sampled at {} Hz, expected {} Hz",
                    signal.label, fs, reference
                )));
            }
            channels.push(Channel::with_kind(signal.label, kind, values));
        }

        let rate = rate.ok_or_else(|| EdfError::Layout("file holds only annotations".into()))?;
        Ok((rate, channels))
    }
}
