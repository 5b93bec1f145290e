use nalgebra::{DMatrix, DVector};
use nanorand::{Pcg64, Rng};
use rayon::prelude::*;

use crate::error::CalibrationError;
use crate::response::{hat_weight, ResponseCurve, LEVELS};

/// Number of intensity bands used to spread the sample locations over
/// the tonal range.
const STRATA: usize = 16;

/// Code value whose log response is pinned to zero.
const PINNED_LEVEL: usize = 128;

#[derive(Debug, Copy, Clone)]
pub struct CalibrationSettings {
    /// How many pixel locations to sample from the stack.
    pub samples: usize,

    /// Weight of the second-derivative smoothness term.
    pub smoothness: f32,

    /// Seed for sample selection.
    pub seed: u128,
}

impl Default for CalibrationSettings {
    fn default() -> CalibrationSettings {
        CalibrationSettings {
            samples: 100,
            smoothness: 10.0,
            seed: 0x5d1c_9e3a_7f42_08b6_c3e1_0a97_4b2f_d865,
        }
    }
}

/// Recovers the camera response of a bracketed stack, Debevec-Malik style.
///
/// `frames` holds interleaved 8-bit RGB pixel data, all of the same
/// size, and `exposure_times` the matching exposure times in seconds.
///
/// For each channel this solves, in the least-squares sense,
/// `g(Z_ij) = ln(E_i) + ln(t_j)` over the sampled locations `i` and
/// frames `j`, where `g` is the log response.  Equations are weighted by
/// `hat_weight()`, a smoothness term penalizes the second derivative
/// of `g`, and `g(128)` is pinned to zero to fix the scale.
pub fn calibrate_debevec(
    frames: &[&[u8]],
    exposure_times: &[f32],
    settings: &CalibrationSettings,
) -> Result<ResponseCurve, CalibrationError> {
    if frames.len() < 2 {
        return Err(CalibrationError::TooFewFrames(frames.len()));
    }
    if frames.len() != exposure_times.len() {
        return Err(CalibrationError::ExposureCountMismatch {
            frames: frames.len(),
            exposures: exposure_times.len(),
        });
    }
    let expected = frames[0].len();
    for (i, frame) in frames.iter().enumerate() {
        if frame.len() != expected || frame.len() % 3 != 0 {
            return Err(CalibrationError::FrameSizeMismatch {
                index: i,
                len: frame.len(),
                expected: expected,
            });
        }
    }
    if let Some(&t) = exposure_times.iter().find(|t| !(**t > 0.0) || !t.is_finite()) {
        return Err(CalibrationError::InvalidExposureTime(t));
    }

    let locations = sample_locations(frames[frames.len() / 2], settings.samples, settings.seed);

    // A location is only useful if at least one of its observations
    // falls inside the sensor's reliable range.
    let usable = locations
        .iter()
        .filter(|&&loc| {
            frames
                .iter()
                .any(|f| f[loc * 3..loc * 3 + 3].iter().any(|&z| hat_weight(z) > 0.0))
        })
        .count();
    if usable < 2 {
        return Err(CalibrationError::TooFewSamples(usable));
    }

    let ln_times: Vec<f64> = exposure_times.iter().map(|&t| (t as f64).ln()).collect();

    let mut solved: Vec<Vec<f32>> = (0..3)
        .into_par_iter()
        .map(|chan| solve_channel(frames, &locations, &ln_times, chan, settings.smoothness))
        .collect::<Result<_, _>>()?;

    let blue = solved.pop().unwrap_or_default();
    let green = solved.pop().unwrap_or_default();
    let red = solved.pop().unwrap_or_default();
    Ok(ResponseCurve::from_channels([red, green, blue]))
}

/// Picks up to `count` distinct pixel indices, spread over the
/// intensity range of `reference`.
///
/// Pixels are bucketed by their mean intensity and drawn round-robin
/// from the non-empty buckets, so dark and bright regions are sampled
/// even when they cover a small part of the frame.
fn sample_locations(reference: &[u8], count: usize, seed: u128) -> Vec<usize> {
    let pixel_count = reference.len() / 3;
    let target = count.min(pixel_count);

    let mut strata: Vec<Vec<usize>> = vec![Vec::new(); STRATA];
    for (i, px) in reference.chunks_exact(3).enumerate() {
        let mean = (px[0] as usize + px[1] as usize + px[2] as usize) / 3;
        strata[mean * STRATA / LEVELS].push(i);
    }

    let mut rand = Pcg64::new_seed(seed);
    let mut locations = Vec::with_capacity(target);
    while locations.len() < target {
        for stratum in strata.iter_mut() {
            if stratum.is_empty() {
                continue;
            }
            let pick = rand.generate_range(0..stratum.len());
            locations.push(stratum.swap_remove(pick));
            if locations.len() == target {
                break;
            }
        }
    }

    locations
}

fn solve_channel(
    frames: &[&[u8]],
    locations: &[usize],
    ln_times: &[f64],
    chan: usize,
    smoothness: f32,
) -> Result<Vec<f32>, CalibrationError> {
    let sample_count = locations.len();
    let rows = sample_count * frames.len() + 1 + (LEVELS - 2);
    let cols = LEVELS + sample_count;

    let mut a = DMatrix::<f64>::zeros(rows, cols);
    let mut b = DVector::<f64>::zeros(rows);
    let mut row = 0;

    // Data term.
    for (i, &loc) in locations.iter().enumerate() {
        for (j, frame) in frames.iter().enumerate() {
            let z = frame[loc * 3 + chan];
            let w = hat_weight(z) as f64;
            a[(row, z as usize)] = w;
            a[(row, LEVELS + i)] = -w;
            b[row] = w * ln_times[j];
            row += 1;
        }
    }

    // Fix the curve's scale.
    a[(row, PINNED_LEVEL)] = 1.0;
    row += 1;

    // Smoothness term.
    let lambda = smoothness as f64;
    for z in 1..(LEVELS - 1) {
        let w = lambda * hat_weight(z as u8) as f64;
        a[(row, z - 1)] = w;
        a[(row, z)] = -2.0 * w;
        a[(row, z + 1)] = w;
        row += 1;
    }
    debug_assert_eq!(row, rows);

    let x = a
        .svd(true, true)
        .solve(&b, 1.0e-10)
        .map_err(|reason| CalibrationError::Solve {
            channel: chan,
            reason: reason.to_string(),
        })?;

    let curve: Vec<f32> = (0..LEVELS).map(|z| x[z].exp() as f32).collect();
    if curve.iter().any(|v| !v.is_finite()) {
        return Err(CalibrationError::Solve {
            channel: chan,
            reason: "solution is not finite".into(),
        });
    }
    tracing::debug!(
        "channel {} response: g(32)={:.3} g(128)={:.3} g(224)={:.3}",
        chan,
        x[32],
        x[128],
        x[224]
    );

    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A horizontal radiance ramp captured with a linear sensor.
    fn linear_stack(exposure_times: &[f32]) -> Vec<Vec<u8>> {
        let (width, height) = (128usize, 8usize);
        exposure_times
            .iter()
            .map(|&t| {
                let mut data = Vec::with_capacity(width * height * 3);
                for _ in 0..height {
                    for x in 0..width {
                        let radiance = 4.0 * (250.0f32).powf(x as f32 / (width - 1) as f32);
                        let z = (radiance * t).round().clamp(0.0, 255.0) as u8;
                        data.extend_from_slice(&[z, z, z]);
                    }
                }
                data
            })
            .collect()
    }

    #[test]
    fn sample_locations_are_distinct() {
        let data: Vec<u8> = (0..300u32).flat_map(|i| [(i % 256) as u8; 3]).collect();
        let mut locs = sample_locations(&data, 50, 7);
        assert_eq!(locs.len(), 50);
        locs.sort_unstable();
        locs.dedup();
        assert_eq!(locs.len(), 50);
    }

    #[test]
    fn sample_locations_cover_dark_and_bright() {
        // Mostly mid-gray, with a few dark and bright pixels.
        let mut data = vec![128u8; 1000 * 3];
        data[..30].iter_mut().for_each(|v| *v = 5);
        data[2970..].iter_mut().for_each(|v| *v = 250);
        let locs = sample_locations(&data, 20, 1);
        assert!(locs.iter().any(|&l| data[l * 3] == 5));
        assert!(locs.iter().any(|&l| data[l * 3] == 250));
    }

    #[test]
    fn sample_locations_capped_by_pixel_count() {
        let data = vec![10u8; 4 * 3];
        assert_eq!(sample_locations(&data, 100, 1).len(), 4);
    }

    #[test]
    fn too_few_frames() {
        let frame = vec![128u8; 30];
        assert_eq!(
            calibrate_debevec(&[&frame], &[1.0], &CalibrationSettings::default()),
            Err(CalibrationError::TooFewFrames(1))
        );
    }

    #[test]
    fn saturated_stack_has_no_samples() {
        let a = vec![255u8; 64 * 3];
        let b = vec![255u8; 64 * 3];
        assert_eq!(
            calibrate_debevec(&[&a, &b], &[1.0, 0.5], &CalibrationSettings::default()),
            Err(CalibrationError::TooFewSamples(0))
        );
    }

    #[test]
    fn mismatched_inputs() {
        let a = vec![100u8; 30];
        let b = vec![100u8; 33];
        assert!(matches!(
            calibrate_debevec(&[&a, &b], &[1.0, 0.5], &CalibrationSettings::default()),
            Err(CalibrationError::FrameSizeMismatch { index: 1, .. })
        ));
        assert!(matches!(
            calibrate_debevec(&[&a, &a], &[1.0], &CalibrationSettings::default()),
            Err(CalibrationError::ExposureCountMismatch { .. })
        ));
        assert_eq!(
            calibrate_debevec(&[&a, &a], &[1.0, 0.0], &CalibrationSettings::default()),
            Err(CalibrationError::InvalidExposureTime(0.0))
        );
    }

    #[test]
    fn recovers_linear_response() {
        let times = [1.0f32, 0.25, 0.0625];
        let stack = linear_stack(&times);
        let frames: Vec<&[u8]> = stack.iter().map(|f| &f[..]).collect();
        let curve = calibrate_debevec(&frames, &times, &CalibrationSettings::default()).unwrap();

        // Pinned level.
        assert!((curve.eval(0, 128) - 1.0).abs() < 1.0e-3);

        // A linear sensor doubles its response when the code value doubles.
        for chan in 0..3 {
            let ratio = curve.eval(chan, 200) / curve.eval(chan, 100);
            assert!((ratio - 2.0).abs() < 0.1, "ratio was {}", ratio);
        }

        // Monotonic over the well-exposed range.
        assert!(curve.channel(0)[20..235].windows(2).all(|w| w[0] <= w[1] * 1.01));
    }
}
