use rayon::prelude::*;
use tracing::warn;

use crate::merge::RadianceMap;
use crate::Frame;

/// Default shadow boost.  Higher values lift dark regions more relative
/// to the highlights.
pub const DEFAULT_BIAS: f32 = 2.2;

/// Rec.709 luminance.
#[inline(always)]
fn luminance(rgb: [f32; 3]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

/// Compresses a radiance map to 8 bits with a logarithmic curve on
/// luminance, keeping the ratios between channels.
///
/// An all-black or non-finite map produces a black image.
pub fn tone_map(map: &RadianceMap, bias: f32) -> Frame {
    let (width, height) = (map.width as u32, map.height as u32);

    let max_lum = map
        .pixels
        .par_iter()
        .map(|&p| luminance(p))
        .filter(|l| l.is_finite())
        .reduce(|| 0.0f32, f32::max);
    if !(max_lum > 0.0) || !max_lum.is_finite() {
        warn!("Radiance map has no usable luminance, producing a black image");
        return Frame::new(width, height);
    }

    let scale = 10f32.powf(bias);
    let norm = (1.0 + scale).log10();

    let mut out = Frame::new(width, height);
    out.par_chunks_mut(3)
        .zip(map.pixels.par_iter())
        .for_each(|(dst, &rgb)| {
            let lum = luminance(rgb);
            if !(lum > 0.0) || !lum.is_finite() {
                return;
            }
            let display = (1.0 + scale * lum / max_lum).log10() / norm;
            let ratio = display / lum;
            for chan in 0..3 {
                dst[chan] = ((rgb[chan] * ratio).clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_from(pixels: Vec<[f32; 3]>, width: usize) -> RadianceMap {
        RadianceMap {
            width: width,
            height: pixels.len() / width,
            pixels: pixels,
        }
    }

    #[test]
    fn brightest_pixel_maps_to_white() {
        let map = map_from(vec![[4.0, 4.0, 4.0], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]], 3);
        let img = tone_map(&map, DEFAULT_BIAS);
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(2, 0).0, [0, 0, 0]);
    }

    #[test]
    fn darker_stays_darker() {
        let map = map_from((0..64).map(|i| [i as f32 * 0.1; 3]).collect(), 64);
        let img = tone_map(&map, DEFAULT_BIAS);
        let row: Vec<u8> = img.pixels().map(|p| p[0]).collect();
        assert!(row.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn bias_lifts_shadows() {
        let map = map_from(vec![[100.0; 3], [1.0; 3]], 2);
        let low = tone_map(&map, 0.5).get_pixel(1, 0)[0];
        let high = tone_map(&map, 3.0).get_pixel(1, 0)[0];
        assert!(high > low);
    }

    #[test]
    fn preserves_hue() {
        let map = map_from(vec![[2.0, 2.0, 2.0], [0.2, 0.1, 0.05]], 2);
        let p = tone_map(&map, DEFAULT_BIAS).get_pixel(1, 0).0;
        assert!(p[0] > p[1] && p[1] > p[2]);
        let ratio = p[0] as f32 / p[1] as f32;
        assert!((ratio - 2.0).abs() < 0.1);
    }

    #[test]
    fn black_map_is_black() {
        let map = map_from(vec![[0.0; 3]; 4], 2);
        let img = tone_map(&map, DEFAULT_BIAS);
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0]));
        let map = map_from(vec![[f32::NAN; 3]; 4], 2);
        assert!(tone_map(&map, DEFAULT_BIAS).pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
