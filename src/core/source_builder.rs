//! Distributed driving-source construction: every worker processes its
//! statically assigned share of the first-stage seismograms, then rank 0
//! emits the shared CMTSOLUTION metadata once all per-source files exist.

use crate::collective::WorkerContext;
use crate::core::partition::{sort_by_numeric_key, split_evenly};
use crate::core::signal::SignalProcessor;
use crate::io::framed::write_framed;
use crate::io::station::{write_cmtsolution, StationTable};
use crate::io::trace::Trace;
use crate::io::weight_grid::WeightGrid;
use crate::types::{CcError, CcResult, QuantityType};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Suffix convention for pressure-component seismograms
const TRACE_SUFFIX: &str = "P.semp";

#[derive(Debug, Clone)]
pub struct SourceBuilderConfig {
    pub example_dir: PathBuf,
    pub quantity: QuantityType,
    /// Low-pass cutoff in Hz; `None` disables filtering
    pub freq_lp: Option<f64>,
}

/// Driver for the stage-1 → stage-2 source conversion
pub struct PartitionedSourceBuilder {
    seismogram_dir: PathBuf,
    data_dir: PathBuf,
    sources_dir: PathBuf,
    station_file: PathBuf,
    processor: SignalProcessor,
    index_re: Regex,
}

impl PartitionedSourceBuilder {
    pub fn new(config: SourceBuilderConfig) -> CcResult<Self> {
        let seismogram_dir = config.example_dir.join("OUTPUT_FILES_step1");
        let data_dir = config.example_dir.join("DATA");
        let sources_dir = data_dir.join("SOURCES");
        let station_file = data_dir.join("STATIONS_NOISE");

        if !seismogram_dir.is_dir() {
            return Err(CcError::Config(format!(
                "seismogram directory {} does not exist",
                seismogram_dir.display()
            )));
        }
        std::fs::create_dir_all(&sources_dir)?;

        Ok(Self {
            seismogram_dir,
            data_dir,
            sources_dir,
            station_file,
            processor: SignalProcessor::new(config.quantity, config.freq_lp),
            index_re: Regex::new(r"^(\d+)\.(\d+)\.").unwrap(),
        })
    }

    /// Run one worker's share of the job. Blocks at the barrier until every
    /// worker has written its sources; only rank 0 then emits CMTSOLUTION.
    pub fn run(&self, ctx: &WorkerContext) -> CcResult<()> {
        let worklist = self.collect_worklist()?;
        let weights = WeightGrid::read(self.data_dir.join("NOISE_DISTRIBUTION"))?;

        let chunk = split_evenly(worklist.len(), ctx.size)[ctx.rank].clone();
        log::info!(
            "Worker {}/{} processing {} of {} traces",
            ctx.rank,
            ctx.size,
            chunk.len(),
            worklist.len()
        );

        for name in &worklist[chunk] {
            self.process_one(name, &weights)?;
        }

        ctx.barrier()?;

        if ctx.is_coordinator() {
            let stations = StationTable::read(&self.station_file)?;
            write_cmtsolution(self.data_dir.join("CMTSOLUTION"), &stations)?;
        }
        Ok(())
    }

    /// Enumerate the full worklist: all trace files matching the suffix
    /// convention, in deterministic dotted-numeric order.
    fn collect_worklist(&self) -> CcResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.seismogram_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TRACE_SUFFIX) && entry.file_type()?.is_file() {
                names.push(name);
            }
        }
        Ok(sort_by_numeric_key(names))
    }

    fn receiver_indices(&self, name: &str) -> CcResult<(usize, usize)> {
        let caps = self.index_re.captures(name).ok_or_else(|| {
            CcError::InvalidFormat(format!(
                "trace filename '{}' does not start with receiver indices",
                name
            ))
        })?;
        let x = caps[1].parse().map_err(|_| {
            CcError::InvalidFormat(format!("receiver x index out of range in '{}'", name))
        })?;
        let y = caps[2].parse().map_err(|_| {
            CcError::InvalidFormat(format!("receiver y index out of range in '{}'", name))
        })?;
        Ok((x, y))
    }

    fn process_one(&self, name: &str, weights: &WeightGrid) -> CcResult<()> {
        let (x, y) = self.receiver_indices(name)?;
        let trace = Trace::read(self.seismogram_dir.join(name))?;
        let weight = weights.weight(x, y)?;
        let samples = self.processor.process(&trace, weight)?;

        let output = self.sources_dir.join(format!("{}.{}.P.bin", x, y));
        write_framed(&output, &samples)?;
        log::debug!("Wrote {} ({} samples)", output.display(), samples.len());
        Ok(())
    }

    pub fn sources_dir(&self) -> &Path {
        &self.sources_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_example(dir: &TempDir) -> PathBuf {
        let example = dir.path().to_path_buf();
        std::fs::create_dir_all(example.join("OUTPUT_FILES_step1")).unwrap();
        std::fs::create_dir_all(example.join("DATA")).unwrap();
        example
    }

    #[test]
    fn test_new_rejects_missing_seismogram_dir() {
        let dir = TempDir::new().unwrap();
        let config = SourceBuilderConfig {
            example_dir: dir.path().join("nowhere"),
            quantity: QuantityType::Pressure,
            freq_lp: None,
        };
        assert!(matches!(
            PartitionedSourceBuilder::new(config),
            Err(CcError::Config(_))
        ));
    }

    #[test]
    fn test_worklist_is_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let example = make_example(&dir);
        let step1 = example.join("OUTPUT_FILES_step1");
        for name in ["10.0.P.semp", "2.0.P.semp", "2.0.HXZ.semv", "notes.txt"] {
            std::fs::write(step1.join(name), "").unwrap();
        }

        let builder = PartitionedSourceBuilder::new(SourceBuilderConfig {
            example_dir: example,
            quantity: QuantityType::Pressure,
            freq_lp: None,
        })
        .unwrap();
        let worklist = builder.collect_worklist().unwrap();
        assert_eq!(worklist, vec!["2.0.P.semp", "10.0.P.semp"]);
    }

    #[test]
    fn test_receiver_index_parsing() {
        let dir = TempDir::new().unwrap();
        let example = make_example(&dir);
        let builder = PartitionedSourceBuilder::new(SourceBuilderConfig {
            example_dir: example,
            quantity: QuantityType::Pressure,
            freq_lp: None,
        })
        .unwrap();

        assert_eq!(builder.receiver_indices("3.14.P.semp").unwrap(), (3, 14));
        assert!(builder.receiver_indices("x.14.P.semp").is_err());
        assert!(builder.receiver_indices("P.semp").is_err());
    }
}
