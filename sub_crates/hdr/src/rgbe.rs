//! The shared-exponent pixel encoding of the Radiance format.
//!
//! Each pixel is three 8-bit mantissas and one 8-bit exponent with a
//! bias of 128, the exponent being chosen from the largest component.

const EXP_BIAS: i32 = 128;

/// Encodes a linear RGB triple.
///
/// Negative and NaN components are treated as zero, and values too small
/// to represent encode as all zeros.
pub fn encode(rgb: [f32; 3]) -> [u8; 4] {
    let [r, g, b] = rgb.map(|c| if c > 0.0 { c } else { 0.0 });
    let peak = r.max(g).max(b);
    if peak < 1.0e-32 {
        return [0, 0, 0, 0];
    }

    // peak = m * 2^exp with m in [0.5, 1.0).
    let exp = (peak.log2().floor() as i32).clamp(-EXP_BIAS, 126) + 1;
    let scale = 2.0f32.powi(8 - exp);
    let mantissa = |c: f32| (c * scale).min(255.0) as u8;

    [mantissa(r), mantissa(g), mantissa(b), (exp + EXP_BIAS) as u8]
}

/// Decodes an RGBE pixel, placing each value in the middle of its
/// quantization step.
pub fn decode(rgbe: [u8; 4]) -> [f32; 3] {
    if rgbe[3] == 0 {
        return [0.0; 3];
    }
    let scale = 2.0f32.powi(rgbe[3] as i32 - EXP_BIAS - 8);
    [
        (rgbe[0] as f32 + 0.5) * scale,
        (rgbe[1] as f32 + 0.5) * scale,
        (rgbe[2] as f32 + 0.5) * scale,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero() {
        assert_eq!(encode([0.0, 0.0, 0.0]), [0, 0, 0, 0]);
        assert_eq!(decode([0, 0, 0, 0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn one() {
        // 1.0 = 0.5 * 2^1
        assert_eq!(encode([1.0, 0.0, 0.0]), [128, 0, 0, 129]);
    }

    #[test]
    fn relative_precision() {
        for &v in &[0.001f32, 0.18, 1.0, 3.5, 1000.0, 65000.0] {
            let [x, _, _] = decode(encode([v, 0.0, 0.0]));
            assert!((x - v).abs() / v < 0.01, "{} decoded as {}", v, x);
        }
    }

    #[test]
    fn shared_exponent_follows_largest() {
        let e = encode([100.0, 1.0, 0.0]);
        assert_eq!(e[3], encode([100.0, 0.0, 0.0])[3]);
        assert!(e[1] < 3);
    }

    #[test]
    fn negative_and_nan_are_zero() {
        assert_eq!(encode([-1.0, f32::NAN, 0.0]), [0, 0, 0, 0]);
        let e = encode([-1.0, 2.0, f32::NAN]);
        assert_eq!(e[0], 0);
        assert_eq!(e[2], 0);
    }

    #[test]
    fn huge_values_saturate() {
        let e = encode([f32::INFINITY, 0.0, 0.0]);
        assert_eq!(e[0], 255);
        assert_eq!(e[3], 255);
    }
}
