//! Median threshold bitmap alignment.
//!
//! Each frame is reduced to a grayscale pyramid, and every level is
//! thresholded at its own median.  Bitmaps made this way look alike
//! across exposures, so translations can be found by minimizing the
//! number of differing bits, coarse levels first.

use rayon::prelude::*;
use tracing::{debug, info};

use sensor_analysis::Histogram;

use crate::pyramid::Plane;
use crate::Frame;

/// Smallest side length a pyramid level may have.
const MIN_LEVEL_SIZE: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AlignSettings {
    /// Upper limit on pyramid levels, full resolution included.
    pub max_levels: usize,

    /// Pixels within this distance of the median are left out of the
    /// comparison, since noise flips them at random.
    pub exclude_range: u8,

    /// Offsets searched around the inherited offset at each level.
    pub search_radius: i32,
}

impl Default for AlignSettings {
    fn default() -> AlignSettings {
        AlignSettings {
            max_levels: 6,
            exclude_range: 4,
            search_radius: 1,
        }
    }
}

struct Bitmaps {
    width: usize,
    height: usize,
    threshold: Vec<bool>,
    include: Vec<bool>,
}

impl Bitmaps {
    fn new(plane: &Plane, exclude_range: u8) -> Bitmaps {
        let hist = Histogram::from_iter(
            plane.data.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8),
            256,
        );
        let median = hist.median() as f32;
        let range = exclude_range as f32;

        Bitmaps {
            width: plane.width,
            height: plane.height,
            threshold: plane.data.iter().map(|&v| v > median).collect(),
            include: plane.data.iter().map(|&v| (v - median).abs() > range).collect(),
        }
    }

    /// Counts differing bits between `self` and `other` moved by
    /// `(dx, dy)`, over the pixels included in both.
    fn mismatch(&self, other: &Bitmaps, dx: i32, dy: i32) -> usize {
        (0..self.height)
            .into_par_iter()
            .map(|y| {
                let sy = y as i64 - dy as i64;
                if sy < 0 || sy >= other.height as i64 {
                    return 0;
                }
                let mut count = 0;
                for x in 0..self.width {
                    let sx = x as i64 - dx as i64;
                    if sx < 0 || sx >= other.width as i64 {
                        continue;
                    }
                    let i = y * self.width + x;
                    let j = sy as usize * other.width + sx as usize;
                    if self.include[i] && other.include[j] && self.threshold[i] != other.threshold[j] {
                        count += 1;
                    }
                }
                count
            })
            .sum()
    }
}

/// Bitmaps for every level, finest first.
fn bitmap_pyramid(frame: &Frame, levels: usize, exclude_range: u8) -> Vec<Bitmaps> {
    let mut plane = gray_plane(frame);
    let mut pyramid = Vec::with_capacity(levels);
    for level in 0..levels {
        pyramid.push(Bitmaps::new(&plane, exclude_range));
        if level + 1 < levels {
            plane = plane.half_size();
        }
    }
    pyramid
}

fn gray_plane(frame: &Frame) -> Plane {
    Plane {
        width: frame.width() as usize,
        height: frame.height() as usize,
        data: frame
            .pixels()
            .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
            .collect(),
    }
}

fn level_count(width: usize, height: usize, max_levels: usize) -> usize {
    let (mut w, mut h) = (width, height);
    let mut levels = 1;
    while levels < max_levels && w / 2 >= MIN_LEVEL_SIZE && h / 2 >= MIN_LEVEL_SIZE {
        w /= 2;
        h /= 2;
        levels += 1;
    }
    levels
}

/// Finds the translation that best maps `candidate` onto `reference`.
fn find_offset(reference: &[Bitmaps], candidate: &[Bitmaps], radius: i32) -> (i32, i32) {
    let mut offset = (0i32, 0i32);
    for level in (0..reference.len()).rev() {
        let base = (offset.0 * 2, offset.1 * 2);
        let (ref_bm, cand_bm) = (&reference[level], &candidate[level]);

        // The inherited offset wins ties.
        let mut best = base;
        let mut best_err = ref_bm.mismatch(cand_bm, base.0, base.1);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let test = (base.0 + dx, base.1 + dy);
                if test == base {
                    continue;
                }
                let err = ref_bm.mismatch(cand_bm, test.0, test.1);
                if err < best_err {
                    best_err = err;
                    best = test;
                }
            }
        }
        offset = best;
    }
    offset
}

/// Computes per-frame translations aligning `frames` to the middle frame.
///
/// The middle frame's own offset is always `(0, 0)`.  All frames must
/// share the same dimensions.
pub fn compute_offsets(frames: &[Frame], settings: &AlignSettings) -> Vec<(i32, i32)> {
    if frames.len() < 2 {
        return vec![(0, 0); frames.len()];
    }
    let (width, height) = frames[0].dimensions();
    let levels = level_count(width as usize, height as usize, settings.max_levels.max(1));
    let pivot = frames.len() / 2;

    let pyramids: Vec<Vec<Bitmaps>> = frames
        .par_iter()
        .map(|f| bitmap_pyramid(f, levels, settings.exclude_range))
        .collect();

    (0..frames.len())
        .map(|i| {
            if i == pivot {
                (0, 0)
            } else {
                find_offset(&pyramids[pivot], &pyramids[i], settings.search_radius)
            }
        })
        .collect()
}

/// Moves the content of `frame` by `(dx, dy)` pixels, replicating the
/// edge pixels into the uncovered border.
pub fn shift_frame(frame: &Frame, dx: i32, dy: i32) -> Frame {
    let (width, height) = frame.dimensions();
    Frame::from_fn(width, height, |x, y| {
        let sx = (x as i64 - dx as i64).clamp(0, width as i64 - 1) as u32;
        let sy = (y as i64 - dy as i64).clamp(0, height as i64 - 1) as u32;
        *frame.get_pixel(sx, sy)
    })
}

/// Aligns `frames` in place and returns the applied offsets.
pub fn align_stack(frames: &mut [Frame], settings: &AlignSettings) -> Vec<(i32, i32)> {
    let offsets = compute_offsets(frames, settings);
    for (i, (frame, &(dx, dy))) in frames.iter_mut().zip(offsets.iter()).enumerate() {
        if dx != 0 || dy != 0 {
            debug!("Shifting frame {} by ({}, {})", i, dx, dy);
            *frame = shift_frame(frame, dx, dy);
        }
    }
    info!("Aligned {} frames: {:?}", frames.len(), offsets);
    offsets
}
