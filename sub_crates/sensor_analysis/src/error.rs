use thiserror::Error;

/// Reasons the response curve could not be recovered from a stack.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("calibration needs at least 2 frames, got {0}")]
    TooFewFrames(usize),

    #[error("got {frames} frames but {exposures} exposure times")]
    ExposureCountMismatch { frames: usize, exposures: usize },

    #[error("frame {index} holds {len} bytes, expected {expected}")]
    FrameSizeMismatch {
        index: usize,
        len: usize,
        expected: usize,
    },

    #[error("exposure time {0} is not a positive number")]
    InvalidExposureTime(f32),

    #[error("only {0} usable sample correspondences, need at least 2")]
    TooFewSamples(usize),

    #[error("least-squares solve failed for channel {channel}: {reason}")]
    Solve { channel: usize, reason: String },
}

/// Reasons an externally supplied response curve was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveParseError {
    #[error("expected 3 channel lines, found {0}")]
    TooFewChannels(usize),

    #[error("line {line}: \"{token}\" is not a finite number")]
    BadNumber { line: usize, token: String },

    #[error("line {line}: no polynomial coefficients after the label")]
    MissingCoefficients { line: usize },
}
