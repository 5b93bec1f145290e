use rayon::prelude::*;
use tracing::debug;

use sensor_analysis::{hat_weight, ResponseCurve};

use crate::Frame;

/// Weight given to a sample regardless of how close it is to clipping,
/// so that a pixel saturated in every frame still has an estimate.
const MIN_WEIGHT: f32 = 1.0e-3;

/// Relative scene radiance, one `[r, g, b]` per pixel in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct RadianceMap {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[f32; 3]>,
}

impl RadianceMap {
    #[inline(always)]
    pub fn get(&self, x: usize, y: usize) -> [f32; 3] {
        self.pixels[y * self.width + x]
    }
}

/// Accumulates frames into a log-radiance estimate.
struct RadianceMerger {
    log_sums: Vec<[f32; 3]>, // Vec<[r, g, b]>
    weights: Vec<[f32; 3]>,
    ln_response: [[f32; 256]; 3],
    width: usize,
    height: usize,
}

impl RadianceMerger {
    fn new(width: usize, height: usize, curve: &ResponseCurve) -> RadianceMerger {
        RadianceMerger {
            log_sums: vec![[0.0; 3]; width * height],
            weights: vec![[0.0; 3]; width * height],
            ln_response: curve.ln_table(),
            width: width,
            height: height,
        }
    }

    fn add_frame(&mut self, frame: &Frame, exposure_time: f32) {
        debug_assert_eq!(self.width, frame.width() as usize);
        debug_assert_eq!(self.height, frame.height() as usize);

        let ln_t = exposure_time.ln();
        let ln_response = &self.ln_response;
        let width = self.width;
        let src = frame.as_raw();

        self.log_sums
            .par_chunks_mut(width)
            .zip(self.weights.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (sums, weights))| {
                let row = &src[(y * width * 3)..((y + 1) * width * 3)];
                for ((sum, weight), pixel) in sums.iter_mut().zip(weights.iter_mut()).zip(row.chunks_exact(3)) {
                    for chan in 0..3 {
                        let z = pixel[chan];
                        let w = hat_weight(z).max(MIN_WEIGHT);
                        sum[chan] += w * (ln_response[chan][z as usize] - ln_t);
                        weight[chan] += w;
                    }
                }
            });
    }

    fn finish(self) -> RadianceMap {
        let pixels = self
            .log_sums
            .par_iter()
            .zip(self.weights.par_iter())
            .map(|(sum, weight)| {
                let mut out = [0.0f32; 3];
                for chan in 0..3 {
                    if weight[chan] > 0.0 {
                        out[chan] = (sum[chan] / weight[chan]).exp();
                    }
                }
                out
            })
            .collect();

        RadianceMap {
            width: self.width,
            height: self.height,
            pixels: pixels,
        }
    }
}

/// Merges a stack into a radiance map through the given response curve.
///
/// `frames` must share dimensions and pair up with `exposure_times`.
pub fn merge_radiance(frames: &[Frame], exposure_times: &[f32], curve: &ResponseCurve) -> RadianceMap {
    debug_assert_eq!(frames.len(), exposure_times.len());
    let (width, height) = match frames.first() {
        Some(f) => (f.width() as usize, f.height() as usize),
        None => (0, 0),
    };

    let mut merger = RadianceMerger::new(width, height, curve);
    for (i, (frame, &t)) in frames.iter().zip(exposure_times.iter()).enumerate() {
        debug!("Merging frame {} (exposure {}s)", i, t);
        merger.add_frame(frame, t);
    }
    merger.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_analysis::{calibrate_debevec, CalibrationSettings};

    /// Scene radiance at `x`, spanning several stops.
    fn scene(x: u32) -> f32 {
        4.0 * 250f32.powf(x as f32 / 127.0)
    }

    fn linear_stack(times: &[f32]) -> Vec<Frame> {
        times
            .iter()
            .map(|&t| {
                Frame::from_fn(128, 8, |x, y| {
                    let v = (scene(x) * t * (1.0 + y as f32 * 0.01)).round().clamp(0.0, 255.0) as u8;
                    image::Rgb([v, v, v])
                })
            })
            .collect()
    }

    #[test]
    fn calibrated_merge_recovers_radiance_ratios() {
        let times = [1.0, 0.25, 0.0625];
        let frames = linear_stack(&times);
        let raw: Vec<&[u8]> = frames.iter().map(|f| f.as_raw().as_slice()).collect();
        let curve = calibrate_debevec(&raw, &times, &CalibrationSettings::default()).unwrap();
        let map = merge_radiance(&frames, &times, &curve);

        // Pixels well exposed in at least one frame.
        let pairs = [(60, 80), (70, 90), (80, 110), (90, 100)];
        for &(a, b) in pairs.iter() {
            let expected = scene(b) / scene(a);
            for chan in 0..3 {
                let got = map.get(b as usize, 0)[chan] / map.get(a as usize, 0)[chan];
                assert!(
                    (got / expected - 1.0).abs() < 0.05,
                    "x={} vs x={}: got {}, expected {}",
                    b,
                    a,
                    got,
                    expected
                );
            }
        }
    }

    #[test]
    fn linear_curve_merge() {
        let times = [0.5, 0.25];
        let frames = vec![
            Frame::from_pixel(4, 4, image::Rgb([200, 100, 50])),
            Frame::from_pixel(4, 4, image::Rgb([100, 50, 25])),
        ];
        let map = merge_radiance(&frames, &times, &ResponseCurve::linear());
        let expected = [200.0 / 128.0 / 0.5, 100.0 / 128.0 / 0.5, 50.0 / 128.0 / 0.5];
        for p in map.pixels.iter() {
            for chan in 0..3 {
                assert!((p[chan] / expected[chan] - 1.0).abs() < 0.02);
            }
        }
    }

    #[test]
    fn saturated_pixels_stay_finite() {
        let times = [0.1, 0.01];
        let frames = vec![
            Frame::from_pixel(3, 3, image::Rgb([255, 255, 0])),
            Frame::from_pixel(3, 3, image::Rgb([255, 255, 0])),
        ];
        let map = merge_radiance(&frames, &times, &ResponseCurve::linear());
        assert_eq!((map.width, map.height), (3, 3));
        assert!(map
            .pixels
            .iter()
            .all(|p| p.iter().all(|v| v.is_finite() && *v >= 0.0)));
    }
}
