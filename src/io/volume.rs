//! Structured binary volume container.
//!
//! A single packed file: a text header of `key=value` lines describing three
//! named axes (counts `n1..n3`, spacings `d1..d3`, origins `o1..o3`, labels
//! and units), then the separator bytes `0x0c 0x0c 0x04`, then the float32
//! payload in little-endian byte order with axis 1 varying fastest. This is
//! the format consumed by the downstream imaging tools.

use crate::types::{AxisDesc, CcError, CcResult, VolumeHeader, VolumeTile};
use ndarray::Array3;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const SEPARATOR: &[u8] = &[0x0c, 0x0c, 0x04];

/// Write a `(t, y, x)`-ordered volume. The header's axis 1 describes `x`, so
/// iterating the array in logical order (t slowest, x fastest) yields exactly
/// the axis-1-fastest payload the container requires.
pub fn write_volume<P: AsRef<Path>>(
    path: P,
    header: &VolumeHeader,
    data: &VolumeTile,
) -> CcResult<()> {
    let path = path.as_ref();
    let (nt, ny, nx) = data.dim();
    let expect = (header.axes[2].n, header.axes[1].n, header.axes[0].n);
    if (nt, ny, nx) != expect {
        return Err(CcError::Processing(format!(
            "volume shape ({}, {}, {}) does not match header axes ({}, {}, {})",
            nt, ny, nx, expect.0, expect.1, expect.2
        )));
    }

    let file = File::create(path).map_err(|e| {
        CcError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mut out = BufWriter::new(file);

    for (i, axis) in header.axes.iter().enumerate() {
        writeln!(out, "n{}={}", i + 1, axis.n)?;
        writeln!(out, "d{}={}", i + 1, axis.d)?;
        writeln!(out, "o{}={}", i + 1, axis.o)?;
        writeln!(out, "label{}=\"{}\"", i + 1, axis.label)?;
        writeln!(out, "unit{}=\"{}\"", i + 1, axis.unit)?;
    }
    writeln!(out, "esize=4")?;
    writeln!(out, "data_format=\"native_float\"")?;
    writeln!(out, "in=\"stdin\"")?;
    out.write_all(SEPARATOR)?;

    for &v in data.iter() {
        out.write_all(&v.to_le_bytes())?;
    }
    out.flush()?;

    log::info!(
        "Wrote {}x{}x{} volume to {}",
        nx, ny, nt,
        path.display()
    );
    Ok(())
}

/// Read a packed volume container back into header + `(t, y, x)` array.
pub fn read_volume<P: AsRef<Path>>(path: P) -> CcResult<(VolumeHeader, VolumeTile)> {
    let path = path.as_ref();
    let raw = std::fs::read(path)?;
    let sep = find_separator(&raw).ok_or_else(|| {
        CcError::InvalidFormat(format!("{}: no header separator found", path.display()))
    })?;

    let header_text = std::str::from_utf8(&raw[..sep])
        .map_err(|e| CcError::InvalidFormat(format!("{}: header is not UTF-8: {}", path.display(), e)))?;

    let mut axes: [AxisDesc; 3] = std::array::from_fn(|_| AxisDesc {
        n: 0,
        d: 0.0,
        o: 0.0,
        label: String::new(),
        unit: String::new(),
    });
    for line in header_text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        let (name, idx) = key.trim().split_at(key.trim().len().saturating_sub(1));
        let Ok(axis_no) = idx.parse::<usize>() else {
            continue;
        };
        if !(1..=3).contains(&axis_no) {
            continue;
        }
        let axis = &mut axes[axis_no - 1];
        match name {
            "n" => {
                axis.n = value.parse().map_err(|_| {
                    CcError::InvalidFormat(format!("{}: bad {}: '{}'", path.display(), key, value))
                })?
            }
            "d" => {
                axis.d = value.parse().map_err(|_| {
                    CcError::InvalidFormat(format!("{}: bad {}: '{}'", path.display(), key, value))
                })?
            }
            "o" => {
                axis.o = value.parse().map_err(|_| {
                    CcError::InvalidFormat(format!("{}: bad {}: '{}'", path.display(), key, value))
                })?
            }
            "label" => axis.label = value.to_string(),
            "unit" => axis.unit = value.to_string(),
            _ => {}
        }
    }

    let (nx, ny, nt) = (axes[0].n, axes[1].n, axes[2].n);
    let payload = &raw[sep + SEPARATOR.len()..];
    let expect_bytes = nx * ny * nt * 4;
    if payload.len() != expect_bytes {
        return Err(CcError::InvalidFormat(format!(
            "{}: payload is {} bytes, header implies {}",
            path.display(),
            payload.len(),
            expect_bytes
        )));
    }

    let samples: Vec<f32> = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
        .collect();
    let data = Array3::from_shape_vec((nt, ny, nx), samples)
        .map_err(|e| CcError::InvalidFormat(format!("{}: {}", path.display(), e)))?;

    Ok((VolumeHeader { axes }, data))
}

fn find_separator(raw: &[u8]) -> Option<usize> {
    raw.windows(SEPARATOR.len()).position(|w| w == SEPARATOR)
}
