use crate::types::{CcError, CcResult, TraceSeries};
use ndarray::Array1;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A single-receiver seismogram: uniform (time, amplitude) sample pairs.
#[derive(Debug, Clone)]
pub struct Trace {
    pub time: TraceSeries,
    pub amp: TraceSeries,
}

impl Trace {
    /// Read a two-column whitespace-delimited trace file. Lines starting with
    /// `#` are ignored. The time axis must be strictly increasing with a
    /// constant step.
    pub fn read<P: AsRef<Path>>(path: P) -> CcResult<Self> {
        let path = path.as_ref();
        let mut time = Vec::new();
        let mut amp = Vec::new();

        for (lineno, line) in open_lines(path)?.enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let t = parse_field(fields.next(), path, lineno, 0)?;
            let v = parse_field(fields.next(), path, lineno, 1)?;
            time.push(t);
            amp.push(v);
        }

        if time.len() < 2 {
            return Err(CcError::InvalidFormat(format!(
                "{}: trace has {} samples, need at least 2",
                path.display(),
                time.len()
            )));
        }

        let trace = Self {
            time: Array1::from(time),
            amp: Array1::from(amp),
        };
        trace.validate_time_axis(path)?;
        Ok(trace)
    }

    /// Sampling interval
    pub fn dt(&self) -> f64 {
        self.time[1] - self.time[0]
    }

    /// Causal pre-event shift: the wavelet origin sits at `-time[0]`
    pub fn origin_shift(&self) -> f64 {
        -self.time[0]
    }

    pub fn len(&self) -> usize {
        self.amp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amp.is_empty()
    }

    fn validate_time_axis(&self, path: &Path) -> CcResult<()> {
        let dt = self.dt();
        if !(dt > 0.0) {
            return Err(CcError::InvalidFormat(format!(
                "{}: non-increasing time axis (dt = {})",
                path.display(),
                dt
            )));
        }
        let tol = 1e-6 * dt;
        for i in 1..self.time.len() {
            let step = self.time[i] - self.time[i - 1];
            if (step - dt).abs() > tol {
                return Err(CcError::InvalidFormat(format!(
                    "{}: non-uniform time step at sample {} ({} vs {})",
                    path.display(),
                    i,
                    step,
                    dt
                )));
            }
        }
        Ok(())
    }
}

/// Extract one column from a whitespace-delimited text file.
pub fn read_column<P: AsRef<Path>>(path: P, column_index: usize) -> CcResult<TraceSeries> {
    let path = path.as_ref();
    let mut values = Vec::new();
    for (lineno, line) in open_lines(path)?.enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let field = trimmed.split_whitespace().nth(column_index);
        values.push(parse_field(field, path, lineno, column_index)?);
    }
    Ok(Array1::from(values))
}

fn open_lines(path: &Path) -> CcResult<std::io::Lines<BufReader<File>>> {
    let file = File::open(path).map_err(|e| {
        CcError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    Ok(BufReader::new(file).lines())
}

fn parse_field(field: Option<&str>, path: &Path, lineno: usize, col: usize) -> CcResult<f64> {
    let field = field.ok_or_else(|| {
        CcError::InvalidFormat(format!(
            "{}: line {} has no field {}",
            path.display(),
            lineno + 1,
            col
        ))
    })?;
    field.parse::<f64>().map_err(|_| {
        CcError::InvalidFormat(format!(
            "{}: line {} field {}: '{}' is not numeric",
            path.display(),
            lineno + 1,
            col,
            field
        ))
    })
}
