//! Parallel gather/transpose of second-stage seismograms into a single
//! ordered 3D volume. Workers own strided subsets of the `y` range; the
//! coordinator interleaves the gathered tiles back into global order,
//! transposes to `(t, y, x)`, and writes the packed volume container.

use crate::collective::WorkerContext;
use crate::core::partition::{numeric_sort_key, sort_by_numeric_key, strided_indices};
use crate::io::station::StationTable;
use crate::io::trace::read_column;
use crate::io::volume::write_volume;
use crate::types::{CcError, CcResult, StationCode, VolumeHeader, VolumeTile};
use ndarray::{s, Array3};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct VolumeConfig {
    pub example_dir: PathBuf,
    /// Seismogram data-type suffix letter (e.g. `v` for `.semv`)
    pub data_type: String,
    pub icomp: String,
    pub jcomp: String,
    /// Optional output-name suffix
    pub fname: String,
}

/// Grid dimensions, sampling, and geometry derived from the input files
#[derive(Debug, Clone)]
struct VolumeGeometry {
    nx: usize,
    ny: usize,
    nt: usize,
    dt: f64,
    ot: f64,
    dx: f64,
    dy: f64,
    ox: f64,
    oy: f64,
    code: StationCode,
}

/// Reassembles per-receiver traces into one volume file per component pair
#[derive(Debug)]
pub struct VolumeAssembler {
    config: VolumeConfig,
    seismogram_dir: PathBuf,
    station_file: PathBuf,
    rsf_dir: PathBuf,
}

impl VolumeAssembler {
    pub fn new(config: VolumeConfig) -> CcResult<Self> {
        let seismogram_dir = config.example_dir.join("OUTPUT_FILES_step2");
        let station_file = config.example_dir.join("DATA").join("STATIONS_OBN");
        let rsf_dir = config.example_dir.join("RSF");

        if !seismogram_dir.is_dir() {
            return Err(CcError::Config(format!(
                "directory {} does not exist",
                seismogram_dir.display()
            )));
        }
        if !station_file.is_file() {
            return Err(CcError::Config(format!(
                "file {} does not exist",
                station_file.display()
            )));
        }
        std::fs::create_dir_all(&rsf_dir)?;

        Ok(Self {
            config,
            seismogram_dir,
            station_file,
            rsf_dir,
        })
    }

    fn component_suffix(&self) -> String {
        format!("{}.sem{}", self.config.jcomp, self.config.data_type)
    }

    /// Derive global grid dimensions from the numerically greatest matching
    /// filename, the time axis from that reference trace, and the spatial
    /// geometry from the station table.
    fn scan_geometry(&self) -> CcResult<VolumeGeometry> {
        let suffix = self.component_suffix();
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.seismogram_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&suffix) && entry.file_type()?.is_file() {
                names.push(name);
            }
        }
        if names.is_empty() {
            return Err(CcError::Config(format!(
                "no '{}' seismograms found in {}",
                suffix,
                self.seismogram_dir.display()
            )));
        }
        for name in &names {
            if numeric_sort_key(name).is_none() {
                return Err(CcError::InvalidFormat(format!(
                    "seismogram filename '{}' does not start with receiver indices",
                    name
                )));
            }
        }

        let names = sort_by_numeric_key(names);
        let last = names.last().unwrap();
        let (i_max, j_max) = numeric_sort_key(last).unwrap();
        let nx = i_max as usize + 1;
        let ny = j_max as usize + 1;

        let time_axis = read_column(self.seismogram_dir.join(last), 0)?;
        let nt = time_axis.len();
        if nt < 2 {
            return Err(CcError::InvalidFormat(format!(
                "reference trace {} has {} samples, need at least 2",
                last, nt
            )));
        }
        let dt = time_axis[1] - time_axis[0];
        let ot = -((nt - 1) as f64) * dt / 2.0;

        let stations = StationTable::read(&self.station_file)?;
        if stations.len() < ny + 1 {
            return Err(CcError::InvalidFormat(format!(
                "station table has {} rows, need {} for a {}-column grid",
                stations.len(),
                ny + 1,
                ny
            )));
        }
        let ox = stations.field_f64(0, 3)?;
        let oy = stations.field_f64(0, 2)?;
        let dx = stations.field_f64(ny, 3)? - ox;
        let dy = stations.field_f64(1, 2)? - oy;

        let code = StationCode::from_dt(dt)?;

        log::info!(
            "Volume geometry: nx={} ny={} nt={} dt={} code={}",
            nx, ny, nt, dt, code
        );
        Ok(VolumeGeometry {
            nx,
            ny,
            nt,
            dt,
            ot,
            dx,
            dy,
            ox,
            oy,
            code,
        })
    }

    /// Fill this worker's tile: all `x` columns for each owned `y` index.
    fn read_local_tile(&self, ctx: &WorkerContext, geom: &VolumeGeometry) -> CcResult<VolumeTile> {
        let ny_local = geom.ny / ctx.size;
        let mut tile = Array3::<f32>::zeros((geom.nx, ny_local, geom.nt));

        for (j_local, j) in strided_indices(ctx.rank, ctx.size, geom.ny).enumerate() {
            for i in 0..geom.nx {
                let name = format!(
                    "{}.{}.{}X{}.sem{}",
                    i, j, geom.code, self.config.jcomp, self.config.data_type
                );
                let column = read_column(self.seismogram_dir.join(&name), 1)?;
                if column.len() != geom.nt {
                    return Err(CcError::Processing(format!(
                        "{}: {} samples, reference trace has {}",
                        name,
                        column.len(),
                        geom.nt
                    )));
                }
                for (k, &v) in column.iter().enumerate() {
                    tile[[i, j_local, k]] = v as f32;
                }
            }
        }
        Ok(tile)
    }

    /// Run one worker. Returns the output path on the coordinator, `None`
    /// on every other rank.
    pub fn run(&self, ctx: &WorkerContext) -> CcResult<Option<PathBuf>> {
        let geom = self.scan_geometry()?;
        if geom.ny % ctx.size != 0 {
            return Err(CcError::Config(format!(
                "grid ny = {} is not divisible by {} workers",
                geom.ny, ctx.size
            )));
        }

        let tile = self.read_local_tile(ctx, &geom)?;
        let Some(tiles) = ctx.gather(tile)? else {
            return Ok(None);
        };

        let full = interleave_tiles(&tiles, geom.nx, geom.ny, geom.nt)?;
        let volume = full.permuted_axes([2, 1, 0]);
        let header = VolumeHeader::new(
            geom.nt, geom.ny, geom.nx, geom.dt, geom.dy, geom.dx, geom.ot, geom.oy, geom.ox,
        );

        let file_name = format!("C{}{}_{}.rsf", self.config.icomp, self.config.jcomp, self.config.fname);
        let scratch = self.config.example_dir.join(&file_name);
        write_volume(&scratch, &header, &volume)?;
        let target = self.rsf_dir.join(&file_name);
        std::fs::rename(&scratch, &target)?;
        log::info!("Volume relocated to {}", target.display());
        Ok(Some(target))
    }

    pub fn output_dir(&self) -> &Path {
        &self.rsf_dir
    }
}

/// Scatter gathered tiles back into global `y` order: tile `r` owns global
/// columns `{r, r + size, r + 2*size, ...}`, the exact inverse of the
/// read-side stride partition.
fn interleave_tiles(tiles: &[VolumeTile], nx: usize, ny: usize, nt: usize) -> CcResult<VolumeTile> {
    let size = tiles.len();
    let ny_local = ny / size;
    let mut full = Array3::<f32>::zeros((nx, ny, nt));
    for (r, tile) in tiles.iter().enumerate() {
        if tile.dim() != (nx, ny_local, nt) {
            return Err(CcError::Collective(format!(
                "gathered tile {} has shape {:?}, expected ({}, {}, {})",
                r,
                tile.dim(),
                nx,
                ny_local,
                nt
            )));
        }
        for (j_local, j) in strided_indices(r, size, ny).enumerate() {
            full.slice_mut(s![.., j, ..]).assign(&tile.slice(s![.., j_local, ..]));
        }
    }
    Ok(full)
}
