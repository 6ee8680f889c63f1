use crate::types::{CcError, CcResult, WeightArray};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Spatial noise-weight grid keyed by receiver grid indices. Row index is the
/// receiver `x`, column index the receiver `y`. Read-only input.
#[derive(Debug, Clone)]
pub struct WeightGrid {
    weights: WeightArray,
}

impl WeightGrid {
    /// Load a whitespace-delimited numeric matrix, one grid row per line.
    pub fn read<P: AsRef<Path>>(path: P) -> CcResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CcError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let row: Vec<f64> = trimmed
                .split_whitespace()
                .map(|field| {
                    field.parse::<f64>().map_err(|_| {
                        CcError::InvalidFormat(format!(
                            "{}: line {}: '{}' is not numeric",
                            path.display(),
                            lineno + 1,
                            field
                        ))
                    })
                })
                .collect::<CcResult<_>>()?;
            if let Some(first) = rows.first() {
                if row.len() != first.len() {
                    return Err(CcError::InvalidFormat(format!(
                        "{}: line {} has {} columns, expected {}",
                        path.display(),
                        lineno + 1,
                        row.len(),
                        first.len()
                    )));
                }
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(CcError::InvalidFormat(format!(
                "{}: empty weight grid",
                path.display()
            )));
        }

        let nx = rows.len();
        let ny = rows[0].len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((nx, ny), flat)
            .map_err(|e| CcError::InvalidFormat(format!("{}: {}", path.display(), e)))?;
        log::debug!("Loaded {}x{} weight grid from {}", nx, ny, path.display());
        Ok(Self { weights })
    }

    /// Bounds-checked weight lookup at receiver grid index `(x, y)`.
    pub fn weight(&self, x: usize, y: usize) -> CcResult<f64> {
        let (nx, ny) = self.weights.dim();
        if x >= nx || y >= ny {
            return Err(CcError::Processing(format!(
                "receiver index ({}, {}) outside {}x{} weight grid",
                x, y, nx, ny
            )));
        }
        Ok(self.weights[[x, y]])
    }

    pub fn dim(&self) -> (usize, usize) {
        self.weights.dim()
    }
}
