//! CSV output for simulated recordings
//!
//! Layout: a `Time` column in seconds followed by the EEG channels and then
//! the auxiliary channels, one row per sample.

use eeg_core::{EegResult, Recording};
use std::io::Write;
use std::path::Path;

/// Write `recording` as CSV to any writer
pub fn write_csv_to<W: Write>(recording: &Recording, writer: W) -> EegResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let columns: Vec<&[f64]> = recording
        .channels()
        .iter()
        .chain(recording.auxiliary())
        .map(|c| c.data.as_slice())
        .collect();

    let mut header = vec!["Time".to_string()];
    header.extend(
        recording
            .channels()
            .iter()
            .chain(recording.auxiliary())
            .map(|c| c.name.clone()),
    );
    csv_writer.write_record(&header).map_err(std::io::Error::from)?;

    let fs = recording.sampling_rate();
    let mut row = Vec::with_capacity(columns.len() + 1);
    for i in 0..recording.n_samples() {
        row.clear();
        row.push((i as f64 / fs).to_string());
        row.extend(columns.iter().map(|column| column[i].to_string()));
        csv_writer.write_record(&row).map_err(std::io::Error::from)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write `recording` as a CSV file at `path`
pub fn write_csv(recording: &Recording, path: impl AsRef<Path>) -> EegResult<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_csv_to(recording, std::io::BufWriter::new(file))
}
