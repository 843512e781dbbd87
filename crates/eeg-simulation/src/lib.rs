//! EEG-Simulation: Synthetic multichannel EEG
//!
//! Seeded generator for background rhythms with optional line hum and
//! physiological artifacts, plus a CSV writer producing files the
//! pipeline loader reads back.

pub mod csv_writer;
pub mod simulator;

pub use csv_writer::{write_csv, write_csv_to};
pub use simulator::{ArtifactConfig, EegSimulator, SimulationConfig, STANDARD_MONTAGE};
