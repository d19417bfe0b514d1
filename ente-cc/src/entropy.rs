// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shannon entropy estimation over the RTT sample window.
//!
//! The estimator looks only at distribution shape: samples are binned into
//! equal-width buckets spanning the observed range and the entropy of the
//! bucket frequencies is computed. RTTs clustering around a queue-buildup
//! signature concentrate probability mass into few buckets and score low,
//! while random wireless jitter spreads mass across buckets and scores
//! high. No trend or slope analysis is performed.
//!
//! All arithmetic is integer fixed-point so the score is bit-for-bit
//! reproducible across targets.

/// Number of equal-width histogram bins the observed RTT range is split into
pub const HISTOGRAM_BINS: usize = 16;

/// Minimum number of samples required for a meaningful estimate
pub const MIN_ENTROPY_SAMPLES: usize = 8;

/// Upper bound of the normalized entropy score
pub const ENTROPY_SCALE: u16 = 1000;

/// Fractional bits of the fixed-point log2 approximation
const LOG2_FRAC_BITS: u32 = 10;

/// Normalized entropy score of an RTT sample window, in `[0, 1000]`.
///
/// Returns 0 when fewer than [`MIN_ENTROPY_SAMPLES`] samples exist (callers
/// suppress classification in that case rather than treating 0 as a real
/// score) and when all samples are identical (zero variance is fully
/// predictable). Otherwise the samples are mapped into [`HISTOGRAM_BINS`]
/// equal-width bins over `[min, max]` and the Shannon entropy of the bin
/// frequencies is normalized against the maximum entropy the window can
/// carry, `log2(min(sample_count, HISTOGRAM_BINS))` bits, so a maximally
/// spread window always scores 1000. For a full 16-sample window this is
/// the 4-bit maximum of a 16-bin histogram.
pub fn estimate(samples: &[u16]) -> u16 {
    if samples.len() < MIN_ENTROPY_SAMPLES {
        return 0;
    }

    let mut min_val = u16::MAX;
    let mut max_val = 0;
    for &sample in samples {
        min_val = min_val.min(sample);
        max_val = max_val.max(sample);
    }

    let range = (max_val - min_val) as u32;
    if range == 0 {
        return 0;
    }

    let mut histogram = [0u32; HISTOGRAM_BINS];
    for &sample in samples {
        let bin = ((sample - min_val) as u32 * (HISTOGRAM_BINS as u32 - 1) / range) as usize;
        histogram[bin.min(HISTOGRAM_BINS - 1)] += 1;
    }

    // H = -Σ p·log2(p) with p = count/total, folded into integer Q10 bit
    // units as Σ count·(log2(total) - log2(count)), deferring the division
    // by total to the final normalization
    let total = samples.len() as u32;
    let log2_total = log2_q10(total);
    let mut acc: u64 = 0;
    for &count in &histogram {
        if count > 0 {
            acc += count as u64 * (log2_total - log2_q10(count)) as u64;
        }
    }

    let max_bits = log2_q10(total.min(HISTOGRAM_BINS as u32)) as u64;
    let denominator = total as u64 * max_bits;
    let score = (acc * ENTROPY_SCALE as u64 + denominator / 2) / denominator;
    score.min(ENTROPY_SCALE as u64) as u16
}

/// Base-2 logarithm in Q10 fixed point (1/1024ths of a bit).
///
/// The integer part is the bit width of `x`; the fractional part is refined
/// by repeated squaring of the normalized mantissa. The result is monotonic
/// in `x` and exact for powers of two. Maximum error is one truncated
/// iteration bit (2^-10) plus the accumulated mantissa rounding, under
/// 0.2% of one bit overall, well inside the tolerance the classification
/// thresholds can absorb.
fn log2_q10(x: u32) -> u32 {
    debug_assert!(x > 0);
    let integer = 31 - x.leading_zeros();
    // Normalize the mantissa into [1, 2) as a Q16 value
    let mut mantissa = ((x as u64) << 16) >> integer;
    let mut frac = 0;
    for _ in 0..LOG2_FRAC_BITS {
        mantissa = (mantissa * mantissa) >> 16;
        frac <<= 1;
        if mantissa >= 2 << 16 {
            mantissa >>= 1;
            frac |= 1;
        }
    }
    (integer << LOG2_FRAC_BITS) | frac
}
