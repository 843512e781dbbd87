//! NumPy `.npy` (format 1.0) writer for 2-D `f64` arrays

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const MAGIC: &[u8] = b"\x93NUMPY";
/// Magic, version and header length precede the header dict
const PREAMBLE_LEN: usize = MAGIC.len() + 2 + 2;
const ALIGNMENT: usize = 64;

fn header(rows: usize, cols: usize) -> Vec<u8> {
    let mut dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );
    // Pad with spaces so the data starts on an aligned offset; the dict ends in '\n'
    let unpadded = PREAMBLE_LEN + dict.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    dict.extend(std::iter::repeat(' ').take(padding));
    dict.push('\n');
    dict.into_bytes()
}

/// Write equal-length rows as a C-ordered `rows x cols` little-endian f64 array
pub fn write_npy<W: Write>(mut writer: W, rows: &[&[f64]]) -> io::Result<()> {
    let cols = rows.first().map_or(0, |r| r.len());
    if let Some(row) = rows.iter().position(|r| r.len() != cols) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("row {} has {} values, expected {}", row, rows[row].len(), cols),
        ));
    }

    let header = header(rows.len(), cols);
    let header_len = u16::try_from(header.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "npy header too long"))?;
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(&header)?;
    for row in rows {
        for value in row.iter() {
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    writer.flush()
}

/// Gzip-compressed `.npy` file at `path`
pub fn write_npy_gz(path: &Path, rows: &[&[f64]]) -> io::Result<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = GzEncoder::new(file, Compression::default());
    write_npy(&mut encoder, rows)?;
    encoder.finish()?.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_header_layout() {
        let mut buffer = Vec::new();
        write_npy(&mut buffer, &[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]).unwrap();

        assert_eq!(&buffer[..6], MAGIC);
        assert_eq!(&buffer[6..8], &[1, 0]);
        let header_len = u16::from_le_bytes([buffer[8], buffer[9]]) as usize;
        assert_eq!((PREAMBLE_LEN + header_len) % ALIGNMENT, 0);

        let dict = std::str::from_utf8(&buffer[10..10 + header_len]).unwrap();
        assert!(dict.contains("'descr': '<f8'"));
        assert!(dict.contains("'shape': (2, 3)"));
        assert!(dict.ends_with('\n'));

        let data = &buffer[10 + header_len..];
        assert_eq!(data.len(), 6 * 8);
        let fourth = f64::from_le_bytes(data[24..32].try_into().unwrap());
        assert_eq!(fourth, 4.0);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let mut buffer = Vec::new();
        assert!(write_npy(&mut buffer, &[&[1.0, 2.0], &[3.0]]).is_err());
    }

    #[test]
    fn test_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.npy.gz");
        write_npy_gz(&path, &[&[0.5; 10]]).unwrap();

        let mut decoded = Vec::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(&decoded[..6], MAGIC);
        assert_eq!(decoded.len() % 8, 0);
    }
}
