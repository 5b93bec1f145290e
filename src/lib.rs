pub mod align;
pub mod clahe;
pub mod config;
pub mod error;
pub mod false_color;
pub mod fusion;
pub mod logger;
pub mod merge;
pub mod metadata;
pub mod normalize;
pub mod pipeline;
pub mod pyramid;
pub mod request;
pub mod tonemap;

pub use config::{ExposureFallback, PipelineConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{run, CurveSource, PipelineOutput};

/// An 8-bit RGB frame of a stack.
pub type Frame = image::RgbImage;

/// Differently exposed frames of one scene, with their exposure times
/// in seconds.
#[derive(Debug, Clone)]
pub struct ExposureStack {
    frames: Vec<Frame>,
    exposure_times: Vec<f32>,
}

impl ExposureStack {
    /// Pairs frames with exposure times.
    ///
    /// Fails if there are fewer than 2 frames, if the counts differ, or
    /// if any exposure time isn't a positive finite number.
    pub fn new(frames: Vec<Frame>, exposure_times: Vec<f32>) -> Result<ExposureStack> {
        if frames.len() < 2 {
            return Err(PipelineError::InsufficientFrames(frames.len()));
        }
        if frames.len() != exposure_times.len() {
            return Err(PipelineError::ExposureCountMismatch {
                frames: frames.len(),
                exposures: exposure_times.len(),
            });
        }
        for (i, &t) in exposure_times.iter().enumerate() {
            if !(t > 0.0) || !t.is_finite() {
                return Err(PipelineError::InvalidExposureTime { index: i, time: t });
            }
        }

        Ok(ExposureStack {
            frames: frames,
            exposure_times: exposure_times,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn exposure_times(&self) -> &[f32] {
        &self.exposure_times
    }

    pub fn into_parts(self) -> (Vec<Frame>, Vec<f32>) {
        (self.frames, self.exposure_times)
    }

    /// Whether every exposure time differs from every other.
    pub fn has_distinct_exposures(&self) -> bool {
        let times = &self.exposure_times;
        (0..times.len()).all(|i| times[i + 1..].iter().all(|&t| t != times[i]))
    }

    /// Replaces the exposure times with `fallback`'s synthetic series if
    /// any two of them are equal, which happens when the metadata was
    /// missing or copied between files.
    ///
    /// Returns whether the times were replaced, or an error if the
    /// fallback series is itself unusable, leaving the stack unchanged.
    pub fn ensure_distinct_exposures(&mut self, fallback: &ExposureFallback) -> Result<bool> {
        if self.has_distinct_exposures() {
            return Ok(false);
        }
        let series = fallback.series(self.frames.len());
        let usable = series.iter().all(|&t| t > 0.0 && t.is_finite())
            && (0..series.len()).all(|i| series[i + 1..].iter().all(|&t| t != series[i]));
        if !usable {
            return Err(PipelineError::InvalidExposureFallback {
                base: fallback.base,
                ratio: fallback.ratio,
            });
        }
        self.exposure_times = series;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(|_| Frame::new(4, 4)).collect()
    }

    #[test]
    fn stack_needs_two_frames() {
        assert!(matches!(
            ExposureStack::new(frames(1), vec![0.033]),
            Err(PipelineError::InsufficientFrames(1))
        ));
        assert!(ExposureStack::new(frames(2), vec![0.033, 0.01]).is_ok());
    }

    #[test]
    fn stack_validates_exposures() {
        assert!(matches!(
            ExposureStack::new(frames(2), vec![0.033]),
            Err(PipelineError::ExposureCountMismatch {
                frames: 2,
                exposures: 1
            })
        ));
        assert!(matches!(
            ExposureStack::new(frames(2), vec![0.033, -1.0]),
            Err(PipelineError::InvalidExposureTime { index: 1, .. })
        ));
        assert!(ExposureStack::new(frames(2), vec![f32::NAN, 1.0]).is_err());
    }

    #[test]
    fn equal_exposures_are_replaced() {
        let mut stack = ExposureStack::new(frames(2), vec![0.033, 0.033]).unwrap();
        assert!(stack.ensure_distinct_exposures(&ExposureFallback::default()).unwrap());
        assert_eq!(stack.exposure_times(), &[0.033, 0.0165]);
    }

    #[test]
    fn distinct_exposures_are_kept() {
        let mut stack = ExposureStack::new(frames(3), vec![0.1, 0.01, 0.001]).unwrap();
        assert!(!stack.ensure_distinct_exposures(&ExposureFallback::default()).unwrap());
        assert_eq!(stack.exposure_times(), &[0.1, 0.01, 0.001]);
    }

    #[test]
    fn partially_repeated_exposures_are_replaced() {
        let mut stack = ExposureStack::new(frames(3), vec![0.1, 0.01, 0.1]).unwrap();
        assert!(stack.ensure_distinct_exposures(&ExposureFallback::default()).unwrap());
        let times = stack.exposure_times();
        assert!(times.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn unusable_fallback_is_rejected() {
        for &(base, ratio) in [(0.033, 1.0), (0.033, 0.0), (0.0, 0.5), (f32::NAN, 0.5)].iter() {
            let mut stack = ExposureStack::new(frames(3), vec![0.05, 0.05, 0.05]).unwrap();
            let fallback = ExposureFallback { base: base, ratio: ratio };
            assert!(matches!(
                stack.ensure_distinct_exposures(&fallback),
                Err(PipelineError::InvalidExposureFallback { .. })
            ));
            assert_eq!(stack.exposure_times(), &[0.05, 0.05, 0.05]);
        }
    }
}
