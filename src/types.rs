use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 1D trace samples (time or amplitude axis)
pub type TraceSeries = Array1<f64>;

/// 2D noise-weight grid, indexed (x, y)
pub type WeightArray = Array2<f64>;

/// Local 3D volume tile (nx, ny_local, nt) of float32 samples
pub type VolumeTile = Array3<f32>;

/// Physical quantity recorded by a trace, fixing the polarity convention
/// of the driving source. Validated once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantityType {
    Pressure,
    Velocity,
}

impl FromStr for QuantityType {
    type Err = CcError;

    fn from_str(s: &str) -> CcResult<Self> {
        match s {
            "pressure" => Ok(QuantityType::Pressure),
            "velocity" => Ok(QuantityType::Velocity),
            _ => Err(CcError::Config(format!(
                "invalid source type '{}': use 'velocity' or 'pressure'",
                s
            ))),
        }
    }
}

impl std::fmt::Display for QuantityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantityType::Pressure => write!(f, "pressure"),
            QuantityType::Velocity => write!(f, "velocity"),
        }
    }
}

/// Station classification derived from the sampling interval, used to build
/// seismogram filenames (`{x}.{y}.{code}X{comp}.sem{type}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationCode {
    F,
    C,
    H,
}

impl StationCode {
    /// Classify a sampling interval. `dt` is rounded to 3 decimals before the
    /// threshold comparison: `<= 0.001 -> F`, `<= 0.004 -> C`, else `H`.
    pub fn from_dt(dt: f64) -> CcResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(CcError::Processing(format!(
                "invalid station code: dt = {} is not a valid sampling interval",
                dt
            )));
        }
        let rounded = (dt * 1000.0).round() / 1000.0;
        if rounded <= 0.001 {
            Ok(StationCode::F)
        } else if rounded <= 0.004 {
            Ok(StationCode::C)
        } else {
            Ok(StationCode::H)
        }
    }
}

impl std::fmt::Display for StationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StationCode::F => write!(f, "F"),
            StationCode::C => write!(f, "C"),
            StationCode::H => write!(f, "H"),
        }
    }
}

/// One named axis of an output volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisDesc {
    /// Sample count
    pub n: usize,
    /// Sample spacing
    pub d: f64,
    /// Axis origin
    pub o: f64,
    pub label: String,
    pub unit: String,
}

/// Coordinate/sampling metadata for a reassembled volume.
/// Axis 1 varies fastest in the serialized payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeHeader {
    pub axes: [AxisDesc; 3],
}

impl VolumeHeader {
    /// Header for a `(t, y, x)`-ordered volume with spatial units of km and
    /// time in seconds. Spatial spacings and origins are given in meters and
    /// converted here.
    pub fn new(nt: usize, ny: usize, nx: usize, dt: f64, dy: f64, dx: f64,
               ot: f64, oy: f64, ox: f64) -> Self {
        Self {
            axes: [
                AxisDesc { n: nx, d: dx / 1000.0, o: ox / 1000.0,
                           label: "X".to_string(), unit: "km".to_string() },
                AxisDesc { n: ny, d: dy / 1000.0, o: oy / 1000.0,
                           label: "Y".to_string(), unit: "km".to_string() },
                AxisDesc { n: nt, d: dt, o: ot,
                           label: "t".to_string(), unit: "s".to_string() },
            ],
        }
    }
}

/// Error types for cross-correlation post-processing
#[derive(Debug, thiserror::Error)]
pub enum CcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Collective operation failed: {0}")]
    Collective(String),
}

/// Result type for pipeline operations
pub type CcResult<T> = Result<T, CcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_type_parsing() {
        assert_eq!("pressure".parse::<QuantityType>().unwrap(), QuantityType::Pressure);
        assert_eq!("velocity".parse::<QuantityType>().unwrap(), QuantityType::Velocity);
        assert!("displacement".parse::<QuantityType>().is_err());
        assert!("Pressure".parse::<QuantityType>().is_err());
    }

    #[test]
    fn test_station_code_thresholds() {
        assert_eq!(StationCode::from_dt(0.001).unwrap(), StationCode::F);
        assert_eq!(StationCode::from_dt(0.0025).unwrap(), StationCode::C);
        // Boundary values use the <= rule
        assert_eq!(StationCode::from_dt(0.004).unwrap(), StationCode::C);
        assert_eq!(StationCode::from_dt(0.005).unwrap(), StationCode::H);
        // Rounding to 3 decimals happens before comparison
        assert_eq!(StationCode::from_dt(0.0010004).unwrap(), StationCode::F);
    }

    #[test]
    fn test_station_code_rejects_degenerate_dt() {
        assert!(StationCode::from_dt(0.0).is_err());
        assert!(StationCode::from_dt(-0.01).is_err());
        assert!(StationCode::from_dt(f64::NAN).is_err());
    }

    #[test]
    fn test_volume_header_units() {
        let header = VolumeHeader::new(100, 4, 8, 0.01, 500.0, 250.0, -0.495, 0.0, 1000.0);
        assert_eq!(header.axes[0].n, 8);
        assert_eq!(header.axes[0].d, 0.25);
        assert_eq!(header.axes[0].o, 1.0);
        assert_eq!(header.axes[1].unit, "km");
        assert_eq!(header.axes[2].label, "t");
        assert_eq!(header.axes[2].d, 0.01);
    }
}
