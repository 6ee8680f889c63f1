//! Framed binary trace records.
//!
//! The wave-propagation solver reads driving sources as a Fortran-style
//! sequential record: a 4-byte length prefix equal to `4 * count`, `count`
//! float32 values, and the same length again as a suffix. Byte order is
//! little-endian on every platform; this is a fixed external wire format.
//! Callers serializing multi-dimensional data must flatten it column-major
//! (first axis fastest) before writing — only the flat sample order is
//! recorded in the file.

use crate::types::{CcError, CcResult};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Write one framed float32 record.
pub fn write_framed<P: AsRef<Path>>(path: P, samples: &[f32]) -> CcResult<()> {
    let path = path.as_ref();
    let byte_len = (samples.len() * 4) as u32;

    let file = File::create(path).map_err(|e| {
        CcError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&byte_len.to_le_bytes())?;
    for &v in samples {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.write_all(&byte_len.to_le_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read one framed float32 record, validating both length markers.
pub fn read_framed<P: AsRef<Path>>(path: P) -> CcResult<Vec<f32>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        CcError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mut reader = BufReader::new(file);

    let prefix = read_u32(&mut reader, path, "length prefix")?;
    if prefix % 4 != 0 {
        return Err(CcError::InvalidFormat(format!(
            "{}: record length {} is not a multiple of 4",
            path.display(),
            prefix
        )));
    }
    let count = (prefix / 4) as usize;

    let mut samples = Vec::with_capacity(count);
    let mut buf = [0u8; 4];
    for i in 0..count {
        reader.read_exact(&mut buf).map_err(|e| {
            CcError::InvalidFormat(format!(
                "{}: truncated payload at sample {}: {}",
                path.display(),
                i,
                e
            ))
        })?;
        samples.push(f32::from_le_bytes(buf));
    }

    let suffix = read_u32(&mut reader, path, "length suffix")?;
    if suffix != prefix {
        return Err(CcError::InvalidFormat(format!(
            "{}: length markers disagree ({} vs {})",
            path.display(),
            prefix,
            suffix
        )));
    }
    Ok(samples)
}

fn read_u32(reader: &mut impl Read, path: &Path, what: &str) -> CcResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|e| {
        CcError::InvalidFormat(format!("{}: missing {}: {}", path.display(), what, e))
    })?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_framed_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.0.P.bin");
        let samples: Vec<f32> = (0..99).map(|i| (i as f32) * 0.5 - 10.0).collect();

        write_framed(&path, &samples).unwrap();
        let back = read_framed(&path).unwrap();
        assert_eq!(back, samples);

        // Both length markers equal 4 * count
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw.len(), 4 + samples.len() * 4 + 4);
        let prefix = u32::from_le_bytes(raw[..4].try_into().unwrap());
        let suffix = u32::from_le_bytes(raw[raw.len() - 4..].try_into().unwrap());
        assert_eq!(prefix, 4 * samples.len() as u32);
        assert_eq!(suffix, prefix);
    }

    #[test]
    fn test_framed_empty_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        write_framed(&path, &[]).unwrap();
        assert_eq!(read_framed(&path).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn test_framed_rejects_marker_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.bin");
        let mut raw = Vec::new();
        raw.extend_from_slice(&8u32.to_le_bytes());
        raw.extend_from_slice(&1.0f32.to_le_bytes());
        raw.extend_from_slice(&2.0f32.to_le_bytes());
        raw.extend_from_slice(&12u32.to_le_bytes());
        std::fs::write(&path, &raw).unwrap();
        assert!(matches!(read_framed(&path), Err(CcError::InvalidFormat(_))));
    }

    #[test]
    fn test_framed_rejects_truncated_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        let mut raw = Vec::new();
        raw.extend_from_slice(&8u32.to_le_bytes());
        raw.extend_from_slice(&1.0f32.to_le_bytes());
        std::fs::write(&path, &raw).unwrap();
        assert!(matches!(read_framed(&path), Err(CcError::InvalidFormat(_))));
    }
}
