use std::io::Cursor;

use tracing::debug;

/// Reads the exposure time, in seconds, from an encoded image's EXIF data.
///
/// Returns `None` if the image has no EXIF block, no exposure time, or
/// a degenerate one.
pub fn read_exposure_time(bytes: &[u8]) -> Option<f32> {
    let img_exif = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(img_exif) => img_exif,
        Err(e) => {
            debug!("No usable EXIF data: {}", e);
            return None;
        }
    };

    if let Some(&exif::Value::Rational(ref n)) = img_exif
        .get_field(exif::Tag::ExposureTime, exif::In::PRIMARY)
        .map(|n| &n.value)
    {
        if let Some(r) = n.first() {
            if r.num != 0 && r.denom != 0 {
                let t = r.to_f64() as f32;
                if t.is_finite() && t > 0.0 {
                    return Some(t);
                }
            }
        }
    }
    None
}
