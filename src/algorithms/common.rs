use std::ops::Range;

use realfft::RealFftPlanner;

use crate::core::error::{Error, Result};

/// Size threshold (n * m) above which we dispatch to the FFT path.
/// Below this, the naive O(n*m) loop wins due to lower constant overhead.
const FFT_THRESHOLD: usize = 256 * 1024;

/// Compute the sliding dot product between a query subsequence `q` and time series `ts`.
///
/// Returns a vector of length `ts.len() - q.len() + 1` where element `i` is
/// `dot(q, ts[i..i+m])`.
///
/// Adaptively dispatches to an FFT-based O(n log n) implementation for large
/// inputs, falling back to the naive O(n*m) loop for small inputs.
pub fn sliding_dot_product(q: &[f64], ts: &[f64]) -> Result<Vec<f64>> {
    let m = q.len();
    let n = ts.len();
    check_lengths(m, n)?;
    if n.saturating_mul(m) > FFT_THRESHOLD {
        sliding_dot_product_fft(q, ts)
    } else {
        sliding_dot_product_naive(q, ts)
    }
}

/// Naive O(n*m) sliding dot product.
pub fn sliding_dot_product_naive(q: &[f64], ts: &[f64]) -> Result<Vec<f64>> {
    let m = q.len();
    check_lengths(m, ts.len())?;
    let n_subs = ts.len() - m + 1;

    Ok((0..n_subs)
        .map(|i| q.iter().zip(&ts[i..i + m]).map(|(a, b)| a * b).sum())
        .collect())
}

/// FFT-based O(n log n) sliding dot product via cross-correlation.
///
/// Uses real-to-complex FFT to compute the convolution of the reversed query
/// with the time series, then extracts the dot-product values.
pub fn sliding_dot_product_fft(q: &[f64], ts: &[f64]) -> Result<Vec<f64>> {
    let m = q.len();
    let n = ts.len();
    check_lengths(m, n)?;
    let n_subs = n - m + 1;
    let conv_len = n + m - 1;
    let fft_len = conv_len.next_power_of_two();

    let mut planner = RealFftPlanner::<f64>::new();
    let fft_forward = planner.plan_fft_forward(fft_len);
    let fft_inverse = planner.plan_fft_inverse(fft_len);

    // Reverse query into zero-padded buffer
    let mut q_padded = vec![0.0; fft_len];
    for (dst, &src) in q_padded.iter_mut().zip(q.iter().rev()) {
        *dst = src;
    }

    // Zero-pad time series
    let mut ts_padded = vec![0.0; fft_len];
    ts_padded[..n].copy_from_slice(ts);

    let fft_err = |e: realfft::FftError| Error::Execution(format!("FFT failed: {e}"));

    // Forward FFT both
    let mut q_spectrum = fft_forward.make_output_vec();
    let mut ts_spectrum = fft_forward.make_output_vec();
    fft_forward
        .process(&mut q_padded, &mut q_spectrum)
        .map_err(fft_err)?;
    fft_forward
        .process(&mut ts_padded, &mut ts_spectrum)
        .map_err(fft_err)?;

    // Element-wise complex multiply
    for (q_val, ts_val) in q_spectrum.iter_mut().zip(ts_spectrum.iter()) {
        *q_val *= ts_val;
    }
    // DC and Nyquist bins of a real signal are real; drop round-off so the
    // inverse transform accepts them.
    q_spectrum[0].im = 0.0;
    if let Some(last) = q_spectrum.last_mut() {
        last.im = 0.0;
    }

    // Inverse FFT
    let mut result = vec![0.0; fft_len];
    fft_inverse
        .process(&mut q_spectrum, &mut result)
        .map_err(fft_err)?;

    // realfft inverse is unnormalized, divide by fft_len
    let norm = 1.0 / fft_len as f64;

    // Extract dot products: convolution result at indices [m-1 .. m-1+n_subs]
    Ok(result[m - 1..m - 1 + n_subs]
        .iter()
        .map(|&x| x * norm)
        .collect())
}

fn check_lengths(m: usize, n: usize) -> Result<()> {
    if m == 0 || n < m {
        return Err(Error::invalid_window(m, n));
    }
    Ok(())
}

/// Split rows `0..n_rows` into at most `n_parts` contiguous, non-empty ranges.
///
/// Every row carries the same work (one full distance profile), so sizes
/// differ by at most one; the first `n_rows % n_parts` ranges are longer.
pub fn row_partitions(n_rows: usize, n_parts: usize) -> Vec<Range<usize>> {
    if n_rows == 0 || n_parts == 0 {
        return vec![];
    }
    let n_parts = n_parts.min(n_rows);
    let base = n_rows / n_parts;
    let extra = n_rows % n_parts;

    let mut ranges = Vec::with_capacity(n_parts);
    let mut start = 0;
    for p in 0..n_parts {
        let len = base + usize::from(p < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Apply an exclusion zone around index `idx`, setting entries within the zone to infinity.
///
/// The zone covers indices `[idx - zone, idx + zone]` (clamped to bounds).
#[inline]
pub fn apply_exclusion_zone(profile: &mut [f64], idx: usize, zone: usize) {
    if idx >= profile.len() {
        return;
    }
    let start = idx.saturating_sub(zone);
    let end = idx.saturating_add(zone).saturating_add(1).min(profile.len());
    for val in &mut profile[start..end] {
        *val = f64::INFINITY;
    }
}
