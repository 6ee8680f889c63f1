//! Per-trace transform chain: time reversal, causal-length padding, noise
//! weighting, cosine tapering, optional zero-phase low-pass filtering, and
//! the polarity convention. Deterministic and side-effect-free.

use crate::io::trace::Trace;
use crate::types::{CcError, CcResult, QuantityType};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Low-pass filter order used for driving-source conditioning
const FILTER_ORDER: usize = 4;

/// Fraction of the trace length tapered at each end
const TAPER_FRACTION: f64 = 0.05;

/// Signal processor for driving-source construction
#[derive(Debug, Clone)]
pub struct SignalProcessor {
    quantity: QuantityType,
    /// Low-pass cutoff in Hz; `None` disables filtering
    freq_lp: Option<f64>,
}

impl SignalProcessor {
    pub fn new(quantity: QuantityType, freq_lp: Option<f64>) -> Self {
        Self { quantity, freq_lp }
    }

    /// Run the full chain on one trace, scaling by the receiver's noise
    /// weight. Returns the finished sequence ready for binary serialization.
    pub fn process(&self, trace: &Trace, weight: f64) -> CcResult<Vec<f32>> {
        let dt = trace.dt();
        let shift = trace.origin_shift();
        if shift <= 0.0 {
            return Err(CcError::Processing(format!(
                "trace has no causal window (origin shift = {})",
                shift
            )));
        }
        let n_causal = (shift / dt).floor() as usize;
        if n_causal < 1 {
            return Err(CcError::Processing(format!(
                "causal window shorter than one sample (shift = {}, dt = {})",
                shift, dt
            )));
        }

        let reversed: Vec<f64> = trace.amp.iter().rev().copied().collect();
        let mut data = causal_pad(reversed, n_causal)?;

        for v in &mut data {
            *v *= weight;
        }

        cosine_taper(&mut data)?;

        if let Some(freq_lp) = self.freq_lp {
            data = lowpass_filter(&data, dt, freq_lp)?;
        }

        apply_polarity(&mut data, self.quantity);

        Ok(data.into_iter().map(|v| v as f32).collect())
    }
}

/// Pad or trim a time-reversed sequence to the causal target length
/// `2 * n_causal - 1`. A sequence shorter than the causal window itself
/// cannot be padded into a valid driving source and is rejected.
pub fn causal_pad(mut reversed: Vec<f64>, n_causal: usize) -> CcResult<Vec<f64>> {
    if n_causal < 1 {
        return Err(CcError::Processing(
            "causal sample count must be at least 1".to_string(),
        ));
    }
    if reversed.len() < n_causal {
        return Err(CcError::Processing(format!(
            "trace shorter than causal window: {} samples, need at least {}",
            reversed.len(),
            n_causal
        )));
    }
    let target = 2 * n_causal - 1;
    reversed.resize(target, 0.0);
    Ok(reversed)
}

/// Apply a half-cosine taper to the first and last `ceil(0.05 * len)`
/// samples. The same ascending ramp `0.5 * (1 - cos(t))`, `t` in `[0, pi]`,
/// is written at both ends; where the windows overlap the trailing one wins.
pub fn cosine_taper(data: &mut [f64]) -> CcResult<()> {
    let len = data.len();
    if len == 0 {
        return Err(CcError::Processing(
            "cannot taper an empty trace".to_string(),
        ));
    }
    let n_taper = ((TAPER_FRACTION * len as f64).ceil() as usize).max(1);

    let ramp: Vec<f64> = (0..n_taper)
        .map(|i| {
            let t = if n_taper > 1 {
                PI * i as f64 / (n_taper - 1) as f64
            } else {
                0.0
            };
            0.5 * (1.0 - t.cos())
        })
        .collect();

    let mut weights = vec![1.0; len];
    weights[..n_taper].copy_from_slice(&ramp);
    weights[len - n_taper..].copy_from_slice(&ramp);

    for (v, w) in data.iter_mut().zip(weights) {
        *v *= w;
    }
    Ok(())
}

/// Polarity convention by physical quantity: pressure sources keep their
/// sign, velocity sources are negated.
pub fn apply_polarity(data: &mut [f64], quantity: QuantityType) {
    if quantity == QuantityType::Velocity {
        for v in data.iter_mut() {
            *v = -*v;
        }
    }
}

/// Zero-phase low-pass: 4th-order Butterworth applied forward and backward.
/// `freq_lp` is in Hz and must lie strictly below the Nyquist frequency.
pub fn lowpass_filter(data: &[f64], dt: f64, freq_lp: f64) -> CcResult<Vec<f64>> {
    let fs = 1.0 / dt;
    let nyquist = 0.5 * fs;
    let normal_cutoff = freq_lp / nyquist;
    if normal_cutoff <= 0.0 || normal_cutoff >= 1.0 {
        return Err(CcError::Processing(format!(
            "low-pass cutoff {} Hz outside (0, {} Hz) for dt = {}",
            freq_lp, nyquist, dt
        )));
    }
    let (b, a) = butter_lowpass(FILTER_ORDER, normal_cutoff);
    filtfilt(&b, &a, data)
}

/// Digital Butterworth low-pass design via the bilinear transform. `wn` is
/// the cutoff normalized by Nyquist, in (0, 1). Returns `(b, a)` transfer
/// coefficients with `a[0] = 1`.
pub fn butter_lowpass(order: usize, wn: f64) -> (Vec<f64>, Vec<f64>) {
    debug_assert!(wn > 0.0 && wn < 1.0);
    // Pre-warp the cutoff for the bilinear transform (sampling rate fixed
    // at fs = 2 so the Nyquist-normalized cutoff maps to wn * pi)
    let fs2 = 4.0;
    let warped = 4.0 * (PI * wn / 2.0).tan();

    // Analog prototype: poles evenly spaced on the left unit semicircle
    let mut poles: Vec<Complex64> = (1..=order)
        .map(|k| {
            let theta = PI * (2 * k + order - 1) as f64 / (2 * order) as f64;
            Complex64::from_polar(warped, theta)
        })
        .collect();
    let gain = warped.powi(order as i32);

    // Bilinear transform: poles map to (fs2 + p) / (fs2 - p), the n analog
    // zeros at infinity land at z = -1
    let fs2 = Complex64::new(fs2, 0.0);
    let mut denom_prod = Complex64::new(1.0, 0.0);
    for p in poles.iter_mut() {
        denom_prod *= fs2 - *p;
        *p = (fs2 + *p) / (fs2 - *p);
    }
    let k_digital = gain / denom_prod.re;

    let zeros = vec![Complex64::new(-1.0, 0.0); order];
    let b: Vec<f64> = poly_from_roots(&zeros)
        .iter()
        .map(|c| k_digital * c.re)
        .collect();
    let a: Vec<f64> = poly_from_roots(&poles).iter().map(|c| c.re).collect();
    (b, a)
}

/// Expand a monic polynomial from its roots; coefficients in descending
/// powers, leading coefficient 1.
fn poly_from_roots(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &r in roots {
        coeffs.push(Complex64::new(0.0, 0.0));
        for i in (1..coeffs.len()).rev() {
            let prev = coeffs[i - 1];
            coeffs[i] -= r * prev;
        }
    }
    coeffs
}

/// Forward-backward IIR filtering with odd-reflection edge padding and
/// steady-state initial conditions, so the result has zero phase shift and
/// no startup transient at either end.
pub fn filtfilt(b: &[f64], a: &[f64], x: &[f64]) -> CcResult<Vec<f64>> {
    let ntaps = a.len().max(b.len());
    let padlen = 3 * ntaps;
    if x.len() <= padlen {
        return Err(CcError::Processing(format!(
            "trace too short to filter: {} samples, need more than {}",
            x.len(),
            padlen
        )));
    }

    // Odd extension about both endpoints
    let n = x.len();
    let mut ext = Vec::with_capacity(n + 2 * padlen);
    for i in (1..=padlen).rev() {
        ext.push(2.0 * x[0] - x[i]);
    }
    ext.extend_from_slice(x);
    for i in 1..=padlen {
        ext.push(2.0 * x[n - 1] - x[n - 1 - i]);
    }

    let zi = lfilter_zi(b, a);

    let scaled_zi: Vec<f64> = zi.iter().map(|z| z * ext[0]).collect();
    let forward = lfilter(b, a, &ext, &scaled_zi);

    let mut rev: Vec<f64> = forward.into_iter().rev().collect();
    let scaled_zi: Vec<f64> = zi.iter().map(|z| z * rev[0]).collect();
    rev = lfilter(b, a, &rev, &scaled_zi);
    rev.reverse();

    Ok(rev[padlen..padlen + n].to_vec())
}

/// Direct form II transposed IIR filter with initial state `zi`
/// (length `max(len(a), len(b)) - 1`); `a[0]` must be 1.
fn lfilter(b: &[f64], a: &[f64], x: &[f64], zi: &[f64]) -> Vec<f64> {
    let order = a.len().max(b.len()) - 1;
    let mut bb = b.to_vec();
    let mut aa = a.to_vec();
    bb.resize(order + 1, 0.0);
    aa.resize(order + 1, 0.0);

    let mut z = zi.to_vec();
    z.resize(order, 0.0);

    let mut y = Vec::with_capacity(x.len());
    for &xn in x {
        let yn = bb[0] * xn + z[0];
        for i in 0..order - 1 {
            z[i] = bb[i + 1] * xn + z[i + 1] - aa[i + 1] * yn;
        }
        z[order - 1] = bb[order] * xn - aa[order] * yn;
        y.push(yn);
    }
    y
}

/// Steady-state initial filter state for a unit step input: solving
/// `(I - A^T) zi = B` with the companion-form state matrix of `a`.
fn lfilter_zi(b: &[f64], a: &[f64]) -> Vec<f64> {
    let order = a.len().max(b.len()) - 1;
    let mut bb = b.to_vec();
    let mut aa = a.to_vec();
    bb.resize(order + 1, 0.0);
    aa.resize(order + 1, 0.0);

    let mut m = vec![vec![0.0; order]; order];
    for i in 0..order {
        // companion(a)^T has -a[i+1] in column 0 and ones on the
        // superdiagonal
        m[i][0] += aa[i + 1];
        if i + 1 < order {
            m[i][i + 1] -= 1.0;
        }
        m[i][i] += 1.0;
    }
    let rhs: Vec<f64> = (0..order).map(|i| bb[i + 1] - aa[i + 1] * bb[0]).collect();
    solve_linear(m, rhs)
}

/// Gaussian elimination with partial pivoting for the small companion solve
fn solve_linear(mut m: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Vec<f64> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap();
        m.swap(col, pivot);
        rhs.swap(col, pivot);

        let diag = m[col][col];
        for row in col + 1..n {
            let factor = m[row][col] / diag;
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = rhs[row];
        for k in row + 1..n {
            sum -= m[row][k] * x[k];
        }
        x[row] = sum / m[row][row];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QuantityType;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn make_trace(n: usize, dt: f64, t0: f64) -> Trace {
        let time: Vec<f64> = (0..n).map(|i| t0 + i as f64 * dt).collect();
        let amp = vec![1.0; n];
        Trace {
            time: Array1::from(time),
            amp: Array1::from(amp),
        }
    }

    #[test]
    fn test_padding_invariant() {
        // Output length is always exactly 2 * n_causal - 1
        for (len, n_causal) in [(101, 50), (120, 50), (60, 50), (50, 50), (7, 4)] {
            let padded = causal_pad(vec![1.0; len], n_causal).unwrap();
            assert_eq!(padded.len(), 2 * n_causal - 1, "len={}", len);
        }
    }

    #[test]
    fn test_padding_appends_zeros_at_tail() {
        let padded = causal_pad(vec![3.0; 60], 50).unwrap();
        assert_eq!(padded.len(), 99);
        assert!(padded[..60].iter().all(|&v| v == 3.0));
        assert!(padded[60..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_padding_rejects_short_trace() {
        let err = causal_pad(vec![1.0; 49], 50).unwrap_err();
        assert!(matches!(err, CcError::Processing(_)));
        assert!(causal_pad(vec![], 1).is_err());
    }

    #[test]
    fn test_taper_both_ends_carry_same_curve() {
        let mut data = vec![1.0; 100];
        cosine_taper(&mut data).unwrap();
        let n_taper = 5; // ceil(0.05 * 100)
        for i in 0..n_taper {
            assert_relative_eq!(data[i], data[100 - n_taper + i], max_relative = 1e-12);
        }
        // First sample of each window is fully suppressed, interior untouched
        assert_eq!(data[0], 0.0);
        assert_eq!(data[100 - n_taper], 0.0);
        assert_eq!(data[50], 1.0);
        assert_relative_eq!(data[n_taper - 1], 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_taper_rejects_empty() {
        let mut data: Vec<f64> = vec![];
        assert!(cosine_taper(&mut data).is_err());
    }

    #[test]
    fn test_taper_single_sample() {
        let mut data = vec![5.0];
        cosine_taper(&mut data).unwrap();
        assert_eq!(data, vec![0.0]);
    }

    #[test]
    fn test_polarity_involution() {
        let original = vec![1.0, -2.5, 0.0, 3.25];
        let mut data = original.clone();
        apply_polarity(&mut data, QuantityType::Velocity);
        assert_eq!(data, vec![-1.0, 2.5, 0.0, -3.25]);
        apply_polarity(&mut data, QuantityType::Velocity);
        assert_eq!(data, original);

        apply_polarity(&mut data, QuantityType::Pressure);
        assert_eq!(data, original);
    }

    #[test]
    fn test_butter_dc_gain_is_unity() {
        for wn in [0.1, 0.25, 0.5, 0.9] {
            let (b, a) = butter_lowpass(4, wn);
            assert_eq!(b.len(), 5);
            assert_eq!(a.len(), 5);
            assert_relative_eq!(a[0], 1.0, max_relative = 1e-12);
            let gain = b.iter().sum::<f64>() / a.iter().sum::<f64>();
            assert_relative_eq!(gain, 1.0, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_butter_numerator_is_scaled_binomial() {
        let (b, _) = butter_lowpass(4, 0.3);
        // Zeros all at z = -1 make the numerator a scaled (1 + z^-1)^4
        assert_relative_eq!(b[1] / b[0], 4.0, max_relative = 1e-9);
        assert_relative_eq!(b[2] / b[0], 6.0, max_relative = 1e-9);
        assert_relative_eq!(b[4] / b[0], 1.0, max_relative = 1e-9);
    }

    #[test]
    fn test_filtfilt_preserves_constant() {
        let x = vec![2.5; 64];
        let y = lowpass_filter(&x, 0.01, 10.0).unwrap();
        assert_eq!(y.len(), x.len());
        for &v in &y {
            assert_relative_eq!(v, 2.5, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_filtfilt_zero_phase_keeps_symmetry() {
        let n = 101;
        let x: Vec<f64> = (0..n)
            .map(|i| (-((i as f64 - 50.0) / 10.0).powi(2)).exp())
            .collect();
        let y = lowpass_filter(&x, 0.01, 15.0).unwrap();
        for i in 0..n {
            assert_relative_eq!(y[i], y[n - 1 - i], epsilon = 1e-7);
        }
    }

    #[test]
    fn test_filtfilt_attenuates_high_frequency() {
        let n = 200;
        let dt = 0.01;
        // 40 Hz ripple with cutoff at 5 Hz: interior energy should collapse
        // (the ends keep broadband leakage from the finite window)
        let x: Vec<f64> = (0..n).map(|i| (2.0 * PI * 40.0 * i as f64 * dt).sin()).collect();
        let y = lowpass_filter(&x, dt, 5.0).unwrap();
        let rms = |s: &[f64]| (s.iter().map(|v| v * v).sum::<f64>() / s.len() as f64).sqrt();
        let in_rms = rms(&x[40..160]);
        let out_rms = rms(&y[40..160]);
        assert!(out_rms < 0.01 * in_rms, "rms {} -> {}", in_rms, out_rms);
    }

    #[test]
    fn test_lowpass_rejects_cutoff_at_or_above_nyquist() {
        let x = vec![0.0; 64];
        // Nyquist for dt = 0.01 is 50 Hz
        assert!(matches!(
            lowpass_filter(&x, 0.01, 50.0),
            Err(CcError::Processing(_))
        ));
        assert!(lowpass_filter(&x, 0.01, 60.0).is_err());
        assert!(lowpass_filter(&x, 0.01, 0.0).is_err());
        assert!(lowpass_filter(&x, 0.01, -1.0).is_err());
    }

    #[test]
    fn test_lowpass_rejects_short_trace() {
        let x = vec![1.0; 15];
        assert!(matches!(
            lowpass_filter(&x, 0.01, 10.0),
            Err(CcError::Processing(_))
        ));
    }

    #[test]
    fn test_process_scenario_trace() {
        // 101 samples at dt = 0.01 starting at t0 = -0.5: n_causal = 50,
        // output must be 2 * 50 - 1 = 99 samples
        let trace = make_trace(101, 0.01, -0.5);
        let processor = SignalProcessor::new(QuantityType::Pressure, None);
        let out = processor.process(&trace, 1.0).unwrap();
        assert_eq!(out.len(), 99);
        // Tapered at both ends, un-negated in the interior
        assert_eq!(out[0], 0.0);
        assert!(out[49] > 0.0);
    }

    #[test]
    fn test_process_applies_weight_and_polarity() {
        let trace = make_trace(101, 0.01, -0.5);
        let processor = SignalProcessor::new(QuantityType::Velocity, None);
        let out = processor.process(&trace, 0.5).unwrap();
        assert_relative_eq!(out[49] as f64, -0.5, max_relative = 1e-6);
    }

    #[test]
    fn test_process_rejects_acausal_trace() {
        let trace = make_trace(101, 0.01, 0.0);
        let processor = SignalProcessor::new(QuantityType::Pressure, None);
        assert!(processor.process(&trace, 1.0).is_err());
    }
}
