//! ambientcc: A Fast, Modular Post-Processor for Ambient-Noise
//! Cross-Correlation Simulations
//!
//! Converts raw per-receiver seismograms from a wave-propagation solver into
//! time-reversed, masked, filtered driving-source wavelets for a second
//! simulation stage, and reassembles second-stage outputs into ordered 3D
//! volumes in the packed binary format consumed by downstream imaging tools.
//! Work is split over a fixed pool of workers with statically partitioned
//! file ownership; the only coordination points are a barrier and a gather.

pub mod collective;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use crate::collective::{run_workers, CollectiveChannel, ThreadCollective, WorkerContext};
pub use crate::core::{PartitionedSourceBuilder, SourceBuilderConfig, VolumeAssembler, VolumeConfig};
pub use crate::types::{CcError, CcResult, QuantityType, StationCode, VolumeHeader};
