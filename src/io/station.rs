use crate::types::{CcError, CcResult};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Whitespace-delimited station table. Fields are kept as raw text; typed
/// access goes through `field_f64`. Column semantics for the tables consumed
/// here: 0/1 = receiver grid indices, 2/3 = coordinates, 5 = depth in meters.
#[derive(Debug, Clone)]
pub struct StationTable {
    rows: Vec<Vec<String>>,
}

impl StationTable {
    pub fn read<P: AsRef<Path>>(path: P) -> CcResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CcError::Config(format!(
                "station file {} does not exist",
                path.display()
            )));
        }
        let file = File::open(path)?;
        let mut rows = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            if !fields.is_empty() {
                rows.push(fields);
            }
        }
        log::debug!("Read {} station rows from {}", rows.len(), path.display());
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn field(&self, row: usize, col: usize) -> CcResult<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .ok_or_else(|| {
                CcError::InvalidFormat(format!(
                    "station table has no field ({}, {})",
                    row, col
                ))
            })
    }

    pub fn field_f64(&self, row: usize, col: usize) -> CcResult<f64> {
        let field = self.field(row, col)?;
        field.parse::<f64>().map_err(|_| {
            CcError::InvalidFormat(format!(
                "station table row {} col {}: '{}' is not numeric",
                row, col, field
            ))
        })
    }
}

/// Emit the shared CMTSOLUTION metadata file: one synthetic point source per
/// station row, in the fixed text template the second-stage solver expects.
/// Event identifiers are 1-indexed and zero-padded to 3 digits.
pub fn write_cmtsolution<P: AsRef<Path>>(path: P, stations: &StationTable) -> CcResult<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    for idx in 0..stations.len() {
        let lat = stations.field_f64(idx, 2)?;
        let lon = stations.field_f64(idx, 3)?;
        let depth = stations.field_f64(idx, 5)? / 1000.0;

        writeln!(
            out,
            "PDE 1999 01 01 00 00 00.00  {} {} {} 1 1 test{:03}",
            lat, lon, depth, idx + 1
        )?;
        writeln!(out, "event name:      {:03}", idx + 1)?;
        writeln!(out, "time shift:       0.0000")?;
        writeln!(out, "half duration:    0.0")?;
        writeln!(out, "latorUTM:       {}", lat)?;
        writeln!(out, "longorUTM:      {}", lon)?;
        writeln!(out, "depth:          {}", depth)?;
        writeln!(out, "Mrr:        1")?;
        writeln!(out, "Mtt:        1")?;
        writeln!(out, "Mpp:        1")?;
        writeln!(out, "Mrt:        0")?;
        writeln!(out, "Mrp:        0")?;
        writeln!(out, "Mtp:        0")?;
        writeln!(
            out,
            "DATA/SOURCES/{}.{}.P.bin",
            stations.field(idx, 1)?,
            stations.field(idx, 0)?
        )?;
    }
    out.flush()?;
    log::info!(
        "Wrote CMTSOLUTION for {} stations to {}",
        stations.len(),
        path.display()
    );
    Ok(())
}
