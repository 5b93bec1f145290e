//! Single-channel float rasters and the image pyramids built from them.
//!
//! Pyramids are plain `Vec`s of levels with the finest level at index 0.

use rayon::prelude::*;

/// 5-tap binomial approximation of a Gaussian.
const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Plane {
        Plane {
            width: width,
            height: height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_fn<F: Fn(usize, usize) -> f32>(width: usize, height: usize, f: F) -> Plane {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Plane {
            width: width,
            height: height,
            data: data,
        }
    }

    #[inline(always)]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Halves both dimensions by averaging 2x2 blocks.  An odd trailing
    /// row or column is dropped.
    pub fn half_size(&self) -> Plane {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut out = Plane::new(width, height);
        out.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let y0 = (y * 2).min(self.height - 1);
                let y1 = (y * 2 + 1).min(self.height - 1);
                for (x, v) in row.iter_mut().enumerate() {
                    let x0 = (x * 2).min(self.width - 1);
                    let x1 = (x * 2 + 1).min(self.width - 1);
                    *v = (self.get(x0, y0) + self.get(x1, y0) + self.get(x0, y1) + self.get(x1, y1))
                        * 0.25;
                }
            });
        out
    }

    /// Gaussian blur followed by dropping every other row and column.
    pub fn pyr_down(&self) -> Plane {
        let width = (self.width + 1) / 2;
        let height = (self.height + 1) / 2;

        // Horizontal pass, only at the kept columns.
        let mut tmp = Plane::new(width, self.height);
        tmp.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, v) in row.iter_mut().enumerate() {
                    *v = KERNEL
                        .iter()
                        .enumerate()
                        .map(|(k, w)| w * self.get(reflect(2 * x as isize + k as isize - 2, self.width), y))
                        .sum();
                }
            });

        // Vertical pass, only at the kept rows.
        let mut out = Plane::new(width, height);
        out.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, v) in row.iter_mut().enumerate() {
                    *v = KERNEL
                        .iter()
                        .enumerate()
                        .map(|(k, w)| w * tmp.get(x, reflect(2 * y as isize + k as isize - 2, tmp.height)))
                        .sum();
                }
            });
        out
    }

    /// Upsamples to `width` x `height` (each at most twice this plane's
    /// size) by zero insertion and Gaussian interpolation.
    pub fn pyr_up(&self, width: usize, height: usize) -> Plane {
        debug_assert!(width <= self.width * 2 && height <= self.height * 2);

        // Sample of the zero-inserted signal along one axis.
        #[inline(always)]
        fn upsampled(i: isize, len: usize) -> Option<usize> {
            let i = reflect(i, len);
            if i % 2 == 0 {
                Some(i / 2)
            } else {
                None
            }
        }

        // Horizontal pass on the source rows.
        let mut tmp = Plane::new(width, self.height);
        tmp.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, v) in row.iter_mut().enumerate() {
                    let mut sum = 0.0;
                    for (k, w) in KERNEL.iter().enumerate() {
                        if let Some(sx) = upsampled(x as isize + k as isize - 2, width) {
                            sum += w * self.get(sx.min(self.width - 1), y);
                        }
                    }
                    *v = sum * 2.0;
                }
            });

        // Vertical pass.
        let mut out = Plane::new(width, height);
        out.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, v) in row.iter_mut().enumerate() {
                    let mut sum = 0.0;
                    for (k, w) in KERNEL.iter().enumerate() {
                        if let Some(sy) = upsampled(y as isize + k as isize - 2, height) {
                            sum += w * tmp.get(x, sy.min(tmp.height - 1));
                        }
                    }
                    *v = sum * 2.0;
                }
            });
        out
    }
}

/// Reflects an out-of-range index back into `[0, len)` without
/// repeating the edge sample (`dcb|abcd|cba`).
#[inline(always)]
pub(crate) fn reflect(i: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    let period = 2 * len - 2;
    let mut i = i.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}

/// Number of levels of a full pyramid over a `width` x `height` image,
/// halving until the smaller side reaches one pixel.
pub fn full_depth(width: usize, height: usize) -> usize {
    let min = width.min(height).max(1);
    (usize::BITS - min.leading_zeros()) as usize
}

/// Successively blurred and decimated copies of `base`, `levels` in total.
pub fn gaussian_pyramid(base: Plane, levels: usize) -> Vec<Plane> {
    let mut pyramid = Vec::with_capacity(levels);
    pyramid.push(base);
    while pyramid.len() < levels {
        let next = pyramid[pyramid.len() - 1].pyr_down();
        pyramid.push(next);
    }
    pyramid
}

/// Band-pass decomposition of `base`.  The last level is the low-pass
/// residual, so `collapse()` restores the input.
pub fn laplacian_pyramid(base: Plane, levels: usize) -> Vec<Plane> {
    let mut pyramid = gaussian_pyramid(base, levels);
    for i in 0..pyramid.len().saturating_sub(1) {
        let expanded = pyramid[i + 1].pyr_up(pyramid[i].width, pyramid[i].height);
        for (v, e) in pyramid[i].data.iter_mut().zip(expanded.data.iter()) {
            *v -= e;
        }
    }
    pyramid
}

/// Reconstructs an image from its Laplacian pyramid.
pub fn collapse(mut pyramid: Vec<Plane>) -> Plane {
    let mut current = match pyramid.pop() {
        Some(plane) => plane,
        None => return Plane::new(0, 0),
    };
    while let Some(mut level) = pyramid.pop() {
        let expanded = current.pyr_up(level.width, level.height);
        for (v, e) in level.data.iter_mut().zip(expanded.data.iter()) {
            *v += e;
        }
        current = level;
    }
    current
}
