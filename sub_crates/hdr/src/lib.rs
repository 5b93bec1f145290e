//! Writing of Radiance `.hdr` images.

pub mod rgbe;

use std::io::{Error, ErrorKind, Write};

/// Writes `pixels` as a flat (non run-length encoded) Radiance RGBE file.
///
/// `pixels` is in row-major order, top row first.  Negative and NaN
/// components are written as zero.
pub fn write_hdr<W: Write>(
    out: &mut W,
    pixels: &[[f32; 3]],
    width: usize,
    height: usize,
) -> std::io::Result<()> {
    if pixels.len() != width * height {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!(
                "pixel count {} doesn't match a {}x{} image",
                pixels.len(),
                width,
                height
            ),
        ));
    }

    write!(out, "#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y {} +X {}\n", height, width)?;
    let mut scanline = Vec::with_capacity(width * 4);
    for row in pixels.chunks(width.max(1)) {
        scanline.clear();
        for &pixel in row {
            scanline.extend_from_slice(&rgbe::encode(pixel));
        }
        out.write_all(&scanline)?;
    }
    out.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_size() {
        let pixels = vec![[1.0f32, 0.5, 0.25]; 6];
        let mut out = Vec::new();
        write_hdr(&mut out, &pixels, 3, 2).unwrap();

        let header = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 2 +X 3\n";
        assert!(out.starts_with(header));
        assert_eq!(out.len(), header.len() + 6 * 4);
        assert_eq!(&out[header.len()..header.len() + 4], &rgbe::encode(pixels[0]));
    }

    #[test]
    fn wrong_pixel_count() {
        let pixels = vec![[0.0f32; 3]; 5];
        let mut out = Vec::new();
        let err = write_hdr(&mut out, &pixels, 3, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(out.is_empty());
    }
}
