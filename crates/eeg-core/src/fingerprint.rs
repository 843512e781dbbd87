//! Content fingerprints
//!
//! A [`Fingerprint`] is the SHA-256 digest of a byte source. Sources are read
//! in fixed blocks so arbitrarily large recordings never need to be held in
//! memory just to be hashed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;

/// Block size used when streaming a source through the hasher
pub const BLOCK_SIZE: usize = 4096;

/// 32-byte SHA-256 digest, rendered as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of an in-memory byte slice
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = FingerprintHasher::new();
        hasher.update(bytes);
        hasher.finalize()
    }

    /// Stream a reader through SHA-256 in [`BLOCK_SIZE`] blocks
    pub fn of_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = FingerprintHasher::new();
        let mut block = [0u8; BLOCK_SIZE];
        loop {
            let read = reader.read(&mut block)?;
            if read == 0 {
                break;
            }
            hasher.update(&block[..read]);
        }
        Ok(hasher.finalize())
    }

    /// Parse a 64-character hex string
    pub fn from_hex(text: &str) -> Option<Self> {
        let bytes = hex::decode(text).ok()?;
        let digest: [u8; 32] = bytes.try_into().ok()?;
        Some(Fingerprint(digest))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid fingerprint '{}'", text)))
    }
}

/// Incremental hasher producing a [`Fingerprint`]
#[derive(Clone, Default)]
pub struct FingerprintHasher {
    inner: Sha256,
}

impl FingerprintHasher {
    pub fn new() -> Self {
        Self { inner: Sha256::new() }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn finalize(self) -> Fingerprint {
        Fingerprint(self.inner.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // SHA-256 of the empty string
        let fp = Fingerprint::of_bytes(b"");
        assert_eq!(
            fp.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        // Spans several blocks plus a partial tail
        let data: Vec<u8> = (0..(BLOCK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = Fingerprint::of_reader(std::io::Cursor::new(&data)).unwrap();
        assert_eq!(streamed, Fingerprint::of_bytes(&data));
    }

    #[test]
    fn test_hex_roundtrip_and_serde() {
        let fp = Fingerprint::of_bytes(b"eeg");
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()), Some(fp));
        assert!(Fingerprint::from_hex("abc").is_none());

        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn test_different_bytes_differ() {
        assert_ne!(Fingerprint::of_bytes(b"a"), Fingerprint::of_bytes(b"b"));
    }
}
