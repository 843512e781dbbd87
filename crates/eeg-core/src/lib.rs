//! EEG-Core: Foundation types for the EEG feature pipeline
//!
//! Recording container, content fingerprints, run status and the error
//! taxonomy shared by every pipeline stage.

pub mod error;
pub mod fingerprint;
pub mod recording;
pub mod status;

pub use error::{EegError, EegResult, ErrorKind};
pub use fingerprint::{Fingerprint, FingerprintHasher};
pub use recording::{Channel, ChannelKind, ChannelStats, Recording, RecordingStage};
pub use status::ProcessingStatus;
