//! EEG-Processing: Preprocessing and feature extraction for EEG recordings
//!
//! Zero-phase filtering, bad channel repair, ICA-based artifact removal and
//! a parallel feature extractor producing validated feature bundles.

pub mod artifacts;
pub mod channels;
pub mod complexity;
pub mod config;
pub mod features;
pub mod filters;
pub mod ica;
pub mod preprocess;
pub mod processor;
pub mod spectral;
pub mod stats;

pub use artifacts::{
    default_detectors, union_exclusions, ArtifactDetector, CardiacDetector, ComponentIndex,
    DetectionContext, DetectionReport, MovementDetector, MuscleDetector, OcularDetector,
};
pub use channels::{BadChannelDetector, BadChannelReport, ChannelInterpolator};
pub use config::{
    ArtifactConfig, BadChannelConfig, ComplexityConfig, FeatureConfig, FrequencyBand, IcaConfig,
    PreprocessConfig, PreprocessParams,
};
pub use features::{FeatureBundle, FeatureExtractor, FeatureFamily};
pub use filters::{BandPassFilter, LineNoiseRemover, NotchFilter, SosFilter};
pub use ica::{FastIca, IcaDecomposition};
pub use preprocess::{quality_score, PreprocessEngine, PreprocessReport, Preprocessed};
pub use processor::{RecordingProcessor, StageTimer};
pub use spectral::{welch, Psd, Welch};
