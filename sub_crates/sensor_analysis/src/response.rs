use crate::error::CurveParseError;

/// Number of distinct 8-bit code values.
pub const LEVELS: usize = 256;

/// Smallest response value used when taking logarithms, so that a
/// curve touching zero at black doesn't produce `-inf`.
const MIN_RESPONSE: f32 = 1.0e-4;

/// Triangle ("hat") weight favoring mid-range code values.
///
/// Zero at both 0 and 255, peaking at 127/128.
#[inline]
pub fn hat_weight(z: u8) -> f32 {
    let z = z as f32;
    if z <= 127.5 {
        z
    } else {
        255.0 - z
    }
}

/// A per-channel mapping from 8-bit code values to relative radiance.
///
/// Channels are stored in RGB order, each with `LEVELS` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCurve {
    channels: [Vec<f32>; 3],
}

impl ResponseCurve {
    pub fn from_channels(channels: [Vec<f32>; 3]) -> ResponseCurve {
        debug_assert!(channels.iter().all(|c| c.len() == LEVELS));
        ResponseCurve { channels: channels }
    }

    /// A linear response with code value 128 mapping to 1.0.
    pub fn linear() -> ResponseCurve {
        let curve: Vec<f32> = (0..LEVELS).map(|z| z as f32 / 128.0).collect();
        ResponseCurve {
            channels: [curve.clone(), curve.clone(), curve],
        }
    }

    /// Parses a textual polynomial description of the response.
    ///
    /// The text holds one line per channel, red then green then blue.
    /// Each line is a label followed by whitespace separated polynomial
    /// coefficients, lowest degree first.  The polynomials are evaluated
    /// at `LEVELS` evenly spaced points over [0.0, 1.0].
    ///
    /// Blank lines are skipped and lines past the third are ignored.
    pub fn from_polynomial_text(text: &str) -> Result<ResponseCurve, CurveParseError> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() < 3 {
            return Err(CurveParseError::TooFewChannels(lines.len()));
        }

        let mut channels = [Vec::new(), Vec::new(), Vec::new()];
        for (chan, line) in lines.iter().take(3).enumerate() {
            let coefficients = line
                .split_whitespace()
                .skip(1) // Label.
                .map(|token| match token.parse::<f32>() {
                    Ok(n) if n.is_finite() => Ok(n),
                    _ => Err(CurveParseError::BadNumber {
                        line: chan + 1,
                        token: token.to_string(),
                    }),
                })
                .collect::<Result<Vec<f32>, _>>()?;
            if coefficients.is_empty() {
                return Err(CurveParseError::MissingCoefficients { line: chan + 1 });
            }

            channels[chan] = (0..LEVELS)
                .map(|i| {
                    let x = i as f32 / (LEVELS - 1) as f32;
                    coefficients.iter().rev().fold(0.0f32, |acc, c| acc * x + c)
                })
                .collect();
        }

        Ok(ResponseCurve { channels: channels })
    }

    #[inline]
    pub fn channel(&self, chan: usize) -> &[f32] {
        &self.channels[chan]
    }

    #[inline]
    pub fn eval(&self, chan: usize, z: u8) -> f32 {
        self.channels[chan][z as usize]
    }

    /// Natural log of the response for every code value, per channel.
    ///
    /// Values at or below zero are floored first.
    pub fn ln_table(&self) -> [[f32; LEVELS]; 3] {
        let mut table = [[0.0f32; LEVELS]; 3];
        for chan in 0..3 {
            for z in 0..LEVELS {
                table[chan][z] = self.channels[chan][z].max(MIN_RESPONSE).ln();
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hat_weight_shape() {
        assert_eq!(hat_weight(0), 0.0);
        assert_eq!(hat_weight(255), 0.0);
        assert_eq!(hat_weight(127), 127.0);
        assert_eq!(hat_weight(128), 127.0);
        assert!(hat_weight(64) < hat_weight(100));
        assert!(hat_weight(250) < hat_weight(200));
    }

    #[test]
    fn linear_pins_mid_gray() {
        let curve = ResponseCurve::linear();
        assert_eq!(curve.eval(0, 128), 1.0);
        assert_eq!(curve.eval(2, 0), 0.0);
        assert!(curve.ln_table()[1][0].is_finite());
    }

    #[test]
    fn parse_polynomials() {
        let text = "R 0.0 1.0\nG 0.5\nB 0.0 0.0 1.0\n";
        let curve = ResponseCurve::from_polynomial_text(text).unwrap();
        assert_eq!(curve.eval(0, 0), 0.0);
        assert!((curve.eval(0, 255) - 1.0).abs() < 1.0e-6);
        assert!(curve.channel(1).iter().all(|&v| v == 0.5));
        assert!((curve.eval(2, 255) - 1.0).abs() < 1.0e-6);
        let x = 51.0f32 / 255.0;
        assert!((curve.eval(2, 51) - x * x).abs() < 1.0e-6);
    }

    #[test]
    fn parse_skips_blank_lines() {
        let text = "\n  R 1.0\n\nG 1.0\nB 1.0\nextra 1 2 3\n";
        assert!(ResponseCurve::from_polynomial_text(text).is_ok());
    }

    #[test]
    fn parse_too_few_lines() {
        assert_eq!(
            ResponseCurve::from_polynomial_text("R 1.0\nG 1.0"),
            Err(CurveParseError::TooFewChannels(2))
        );
        assert_eq!(
            ResponseCurve::from_polynomial_text(""),
            Err(CurveParseError::TooFewChannels(0))
        );
    }

    #[test]
    fn parse_bad_number() {
        let err = ResponseCurve::from_polynomial_text("R 1.0\nG 1.0 abc\nB 1.0").unwrap_err();
        assert_eq!(
            err,
            CurveParseError::BadNumber {
                line: 2,
                token: "abc".into()
            }
        );
        assert!(ResponseCurve::from_polynomial_text("R 1.0\nG NaN\nB 1.0").is_err());
    }

    #[test]
    fn parse_missing_coefficients() {
        assert_eq!(
            ResponseCurve::from_polynomial_text("R 1.0\nG 1.0\nB"),
            Err(CurveParseError::MissingCoefficients { line: 3 })
        );
    }
}
