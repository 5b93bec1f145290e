//! Contrast-limited adaptive histogram equalization.
//!
//! Used to suppress glare: luminance is equalized per tile, with each
//! tile's histogram clipped so flat regions don't get their noise
//! amplified, and the tile mappings are blended bilinearly.

use image::{GrayImage, Luma, RgbImage};
use rayon::prelude::*;

use sensor_analysis::Histogram;

use crate::pyramid::reflect;

/// Histogram clip limit, relative to a uniform distribution.
pub const CLIP_LIMIT: f32 = 2.0;

/// Tiles along each axis.
pub const GRID: usize = 8;

/// Equalizes `src` on a `grid` x `grid` layout of tiles.
pub fn clahe(src: &GrayImage, grid: usize, clip_limit: f32) -> GrayImage {
    let (width, height) = (src.width() as usize, src.height() as usize);
    if width == 0 || height == 0 {
        return src.clone();
    }
    let grid = grid.max(1);

    // Tiles cover the image extended to a multiple of the grid, with the
    // border mirrored.
    let tile_w = (width + grid - 1) / grid;
    let tile_h = (height + grid - 1) / grid;
    let area = tile_w * tile_h;
    let limit = ((clip_limit * area as f32 / 256.0).max(1.0)).floor() as usize;

    let luts: Vec<Vec<u8>> = (0..grid * grid)
        .into_par_iter()
        .map(|t| {
            let (tx, ty) = (t % grid, t / grid);
            let values = (ty * tile_h..(ty + 1) * tile_h).flat_map(|y| {
                let y = reflect(y as isize, height) as u32;
                (tx * tile_w..(tx + 1) * tile_w)
                    .map(move |x| src.get_pixel(reflect(x as isize, width) as u32, y)[0])
            });
            let mut hist = Histogram::from_iter(values, 256);
            hist.clip_and_redistribute(limit);
            hist.equalization_lut()
        })
        .collect();

    // Position of a pixel on the grid of tile centers.
    let locate = |i: usize, tile: usize| -> (usize, usize, f32) {
        let f = i as f32 / tile as f32 - 0.5;
        let lo = f.floor();
        let frac = f - lo;
        let lo = lo as isize;
        let last = grid as isize - 1;
        let t0 = lo.clamp(0, last) as usize;
        let t1 = (lo + 1).clamp(0, last) as usize;
        (t0, t1, frac)
    };

    let mut out = GrayImage::new(width as u32, height as u32);
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let (ty0, ty1, fy) = locate(y, tile_h);
        for (x, v) in row.iter_mut().enumerate() {
            let (tx0, tx1, fx) = locate(x, tile_w);
            let z = src.get_pixel(x as u32, y as u32)[0] as usize;
            let lut = |tx: usize, ty: usize| luts[ty * grid + tx][z] as f32;
            let top = lut(tx0, ty0) * (1.0 - fx) + lut(tx1, ty0) * fx;
            let bottom = lut(tx0, ty1) * (1.0 - fx) + lut(tx1, ty1) * fx;
            *v = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

/// Runs CLAHE with the default settings on the luma of a color image,
/// leaving chroma untouched.
pub fn suppress_flare(img: &RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();

    let mut luma = GrayImage::new(width, height);
    let mut chroma = Vec::with_capacity(width as usize * height as usize);
    for (p, l) in img.pixels().zip(luma.pixels_mut()) {
        let [y, cb, cr] = rgb_to_ycbcr(p.0);
        *l = Luma([y.round().clamp(0.0, 255.0) as u8]);
        chroma.push((cb, cr));
    }

    let luma = clahe(&luma, GRID, CLIP_LIMIT);

    let mut out = RgbImage::new(width, height);
    for ((p, l), &(cb, cr)) in out.pixels_mut().zip(luma.pixels()).zip(chroma.iter()) {
        p.0 = ycbcr_to_rgb([l[0] as f32, cb, cr]);
    }
    out
}

/// Full-range (JPEG) YCbCr.
fn rgb_to_ycbcr(rgb: [u8; 3]) -> [f32; 3] {
    let (r, g, b) = (rgb[0] as f32, rgb[1] as f32, rgb[2] as f32);
    [
        0.299 * r + 0.587 * g + 0.114 * b,
        128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b,
        128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b,
    ]
}

fn ycbcr_to_rgb(ycc: [f32; 3]) -> [u8; 3] {
    let (y, cb, cr) = (ycc[0], ycc[1] - 128.0, ycc[2] - 128.0);
    let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    [
        to_u8(y + 1.402 * cr),
        to_u8(y - 0.344136 * cb - 0.714136 * cr),
        to_u8(y + 1.772 * cb),
    ]
}
