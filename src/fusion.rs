//! Exposure fusion.
//!
//! Frames are blended directly in display space, each pixel weighted by
//! how much local contrast, color saturation, and mid-range exposure it
//! carries.  Blending happens band by band in a Laplacian pyramid so the
//! seams between regions taken from different frames stay invisible.

use rayon::prelude::*;
use tracing::debug;

use crate::pyramid::{collapse, full_depth, gaussian_pyramid, laplacian_pyramid, Plane};
use crate::Frame;

/// Keeps normalization defined where every measure is zero.
const WEIGHT_FLOOR: f32 = 1.0e-12;

/// Spread of the well-exposedness Gaussian around mid-gray.
const EXPOSEDNESS_SIGMA: f32 = 0.2;

/// Exponents applied to each quality measure before they're combined.
/// Zero disables a measure.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FusionSettings {
    pub contrast_weight: f32,
    pub saturation_weight: f32,
    pub exposure_weight: f32,
}

impl Default for FusionSettings {
    fn default() -> FusionSettings {
        FusionSettings {
            contrast_weight: 1.0,
            saturation_weight: 1.0,
            exposure_weight: 1.0,
        }
    }
}

/// Splits a frame into red, green, and blue planes in [0.0, 1.0].
fn channel_planes(frame: &Frame) -> [Plane; 3] {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    let mut planes = [
        Plane::new(width, height),
        Plane::new(width, height),
        Plane::new(width, height),
    ];
    for (i, p) in frame.pixels().enumerate() {
        for chan in 0..3 {
            planes[chan].data[i] = p[chan] as f32 / 255.0;
        }
    }
    planes
}

/// Absolute response of a 4-neighbor Laplacian, with mirrored borders.
fn laplacian_magnitude(gray: &Plane) -> Plane {
    let (w, h) = (gray.width, gray.height);
    let mut out = Plane::new(w, h);
    out.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let up = if y > 0 { y - 1 } else { (y + 1).min(h - 1) };
        let down = if y + 1 < h { y + 1 } else { y.saturating_sub(1) };
        for (x, v) in row.iter_mut().enumerate() {
            let left = if x > 0 { x - 1 } else { (x + 1).min(w - 1) };
            let right = if x + 1 < w { x + 1 } else { x.saturating_sub(1) };
            let lap = gray.get(left, y) + gray.get(right, y) + gray.get(x, up) + gray.get(x, down)
                - 4.0 * gray.get(x, y);
            *v = lap.abs();
        }
    });
    out
}

/// Unnormalized quality of every pixel of one frame.
fn quality_map(frame: &Frame, settings: &FusionSettings) -> Plane {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    let gray = Plane {
        width: width,
        height: height,
        data: frame
            .pixels()
            .map(|p| (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32) / 255.0)
            .collect(),
    };
    let contrast = laplacian_magnitude(&gray);

    let denom = 2.0 * EXPOSEDNESS_SIGMA * EXPOSEDNESS_SIGMA;
    let data = frame
        .as_raw()
        .par_chunks_exact(3)
        .zip(contrast.data.par_iter())
        .map(|(p, &c)| {
            let rgb = [p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0];
            let mean = (rgb[0] + rgb[1] + rgb[2]) / 3.0;
            let saturation = (rgb.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 3.0).sqrt();
            let exposedness: f32 = rgb
                .iter()
                .map(|v| (-(v - 0.5) * (v - 0.5) / denom).exp())
                .product();

            c.powf(settings.contrast_weight)
                * saturation.powf(settings.saturation_weight)
                * exposedness.powf(settings.exposure_weight)
                + WEIGHT_FLOOR
        })
        .collect();

    Plane {
        width: width,
        height: height,
        data: data,
    }
}

/// Per-frame weight maps, normalized to sum to one at every pixel.
pub fn weight_maps(frames: &[Frame], settings: &FusionSettings) -> Vec<Plane> {
    let mut maps: Vec<Plane> = frames.par_iter().map(|f| quality_map(f, settings)).collect();
    if maps.is_empty() {
        return maps;
    }

    let mut totals = vec![0.0f32; maps[0].data.len()];
    for map in maps.iter() {
        for (t, w) in totals.iter_mut().zip(map.data.iter()) {
            *t += w;
        }
    }
    for map in maps.iter_mut() {
        map.data
            .par_iter_mut()
            .zip(totals.par_iter())
            .for_each(|(w, t)| *w /= t);
    }
    maps
}

/// Blends `frames` into a single 8-bit image.
///
/// All frames must share dimensions; there must be at least one.
pub fn fuse_exposures(frames: &[Frame], settings: &FusionSettings) -> Frame {
    let (width, height) = match frames.first() {
        Some(f) => f.dimensions(),
        None => return Frame::new(0, 0),
    };
    let levels = full_depth(width as usize, height as usize);
    debug!("Fusing {} frames over {} pyramid levels", frames.len(), levels);

    let weights = weight_maps(frames, settings);

    let mut blended: Vec<Vec<Plane>> = Vec::new();
    for (frame, weight) in frames.iter().zip(weights.into_iter()) {
        let weight_pyr = gaussian_pyramid(weight, levels);

        let weighted: Vec<Vec<Plane>> = Vec::from(channel_planes(frame))
            .into_par_iter()
            .map(|plane| {
                let mut lap = laplacian_pyramid(plane, levels);
                for (level, w) in lap.iter_mut().zip(weight_pyr.iter()) {
                    for (v, w) in level.data.iter_mut().zip(w.data.iter()) {
                        *v *= w;
                    }
                }
                lap
            })
            .collect();

        if blended.is_empty() {
            blended = weighted;
            continue;
        }
        for (acc_pyr, pyr) in blended.iter_mut().zip(weighted.iter()) {
            for (acc_level, level) in acc_pyr.iter_mut().zip(pyr.iter()) {
                for (a, v) in acc_level.data.iter_mut().zip(level.data.iter()) {
                    *a += v;
                }
            }
        }
    }

    let mut channels = blended.into_par_iter().map(collapse).collect::<Vec<_>>().into_iter();
    let (r, g, b) = match (channels.next(), channels.next(), channels.next()) {
        (Some(r), Some(g), Some(b)) => (r, g, b),
        _ => return Frame::new(width, height),
    };

    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Frame::from_fn(width, height, |x, y| {
        let i = y as usize * width as usize + x as usize;
        image::Rgb([to_u8(r.data[i]), to_u8(g.data[i]), to_u8(b.data[i])])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32, gain: f32) -> Frame {
        Frame::from_fn(width, height, |x, y| {
            let v = |n: u32| ((n as f32 * gain).round().clamp(0.0, 255.0)) as u8;
            image::Rgb([v(x * 4), v(y * 5), v((x + y) * 2)])
        })
    }

    #[test]
    fn weights_sum_to_one() {
        let frames = vec![gradient(40, 30, 0.3), gradient(40, 30, 1.0), gradient(40, 30, 2.5)];
        let maps = weight_maps(&frames, &FusionSettings::default());
        assert_eq!(maps.len(), 3);
        for i in 0..(40 * 30) {
            let sum: f32 = maps.iter().map(|m| m.data[i]).sum();
            assert!((sum - 1.0).abs() < 1.0e-4);
        }
    }

    #[test]
    fn mid_gray_outweighs_clipped() {
        let frames = vec![
            Frame::from_pixel(8, 8, image::Rgb([128, 128, 128])),
            Frame::from_pixel(8, 8, image::Rgb([255, 255, 255])),
        ];
        // Flat frames have no contrast or saturation.
        let settings = FusionSettings {
            contrast_weight: 0.0,
            saturation_weight: 0.0,
            exposure_weight: 1.0,
        };
        let maps = weight_maps(&frames, &settings);
        assert!(maps[0].data.iter().all(|&w| w > 0.9));
    }

    #[test]
    fn identical_frames_fuse_to_input() {
        let frame = gradient(37, 29, 1.0);
        let fused = fuse_exposures(&[frame.clone(), frame.clone()], &FusionSettings::default());
        assert_eq!(fused.dimensions(), frame.dimensions());
        for (a, b) in fused.pixels().zip(frame.pixels()) {
            for chan in 0..3 {
                assert!((a[chan] as i32 - b[chan] as i32).abs() <= 1);
            }
        }
    }

    #[test]
    fn fusion_lands_between_inputs() {
        let dark = Frame::from_pixel(16, 16, image::Rgb([30, 30, 30]));
        let bright = Frame::from_pixel(16, 16, image::Rgb([220, 220, 220]));
        let fused = fuse_exposures(&[dark, bright], &FusionSettings::default());
        assert!(fused.pixels().all(|p| p[0] > 30 && p[0] < 220));
    }
}
