//! Core pipeline components

pub mod partition;
pub mod signal;
pub mod source_builder;
pub mod volume;

// Re-export main types
pub use partition::{numeric_sort_key, sort_by_numeric_key, split_evenly, strided_indices};
pub use signal::SignalProcessor;
pub use source_builder::{PartitionedSourceBuilder, SourceBuilderConfig};
pub use volume::{VolumeAssembler, VolumeConfig};
