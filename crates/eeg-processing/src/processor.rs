//! Core recording processor trait

use eeg_core::{EegResult, Recording};
use std::time::{Duration, Instant};

/// A preprocessing step that derives a new recording from its input
///
/// Implementations never edit the input in place.
pub trait RecordingProcessor: Send + Sync {
    /// Process a recording and return the derived result
    fn process(&self, input: &Recording) -> EegResult<Recording>;

    /// Processor name for logs and reports
    fn name(&self) -> &str;

    /// Check if the processor can handle the given recording
    fn can_process(&self, recording: &Recording) -> bool {
        recording.channel_count() > 0 && recording.sampling_rate() > 0.0
    }
}

/// Wall-clock timer for a processing step
#[derive(Debug, Clone, Copy)]
pub struct StageTimer {
    started: Instant,
}

impl StageTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}
