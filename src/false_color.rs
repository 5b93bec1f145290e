use image::{GrayImage, Luma};

use crate::Frame;

/// Color lookup tables for visualizing intensity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Colormap {
    /// Blue through cyan, yellow, and red.
    #[default]
    Jet,
    /// Blue for shadows fading into red for highlights, no green.
    BlueRed,
}

impl Colormap {
    pub fn from_name(name: &str) -> Option<Colormap> {
        match name.to_ascii_lowercase().as_str() {
            "jet" => Some(Colormap::Jet),
            "blue-red" | "bluered" | "blue_red" => Some(Colormap::BlueRed),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Colormap::Jet => "jet",
            Colormap::BlueRed => "blue-red",
        }
    }

    /// The RGB color of each of the 256 intensities.
    pub fn lut(&self) -> [[u8; 3]; 256] {
        let mut lut = [[0u8; 3]; 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = match *self {
                Colormap::Jet => {
                    let x = i as f32 / 255.0;
                    let ramp = |center: f32| {
                        ((1.5 - (4.0 * x - center).abs()).clamp(0.0, 1.0) * 255.0).round() as u8
                    };
                    [ramp(3.0), ramp(2.0), ramp(1.0)]
                }
                Colormap::BlueRed => {
                    if i < 128 {
                        [(2 * i) as u8, 0, 255]
                    } else {
                        [255, 0, 255usize.saturating_sub(2 * (i - 128)) as u8]
                    }
                }
            };
        }
        lut
    }
}

/// Rec.601 grayscale, in 14-bit fixed point.
fn gray(frame: &Frame) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let p = frame.get_pixel(x, y);
        let v = (p[0] as u32 * 4899 + p[1] as u32 * 9617 + p[2] as u32 * 1868 + (1 << 13)) >> 14;
        Luma([v.min(255) as u8])
    })
}

/// Grayscale stretched so its darkest pixel is 0 and brightest 255.
///
/// A flat image comes out all zero.
pub fn normalized_gray(frame: &Frame) -> GrayImage {
    let mut img = gray(frame);
    let (min, max) = img
        .pixels()
        .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if max <= min {
        img.pixels_mut().for_each(|p| p[0] = 0);
        return img;
    }

    let scale = 255.0 / (max - min) as f32;
    for p in img.pixels_mut() {
        p[0] = ((p[0] - min) as f32 * scale).round().min(255.0) as u8;
    }
    img
}

/// Colors each pixel of `frame` by its normalized intensity.
pub fn false_color(frame: &Frame, colormap: Colormap) -> Frame {
    let lut = colormap.lut();
    let gray = normalized_gray(frame);
    Frame::from_fn(frame.width(), frame.height(), |x, y| {
        image::Rgb(lut[gray.get_pixel(x, y)[0] as usize])
    })
}
