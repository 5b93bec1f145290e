use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("insufficient images: at least 2 are required, got {0}")]
    InsufficientFrames(usize),

    #[error("the exposure stack is empty")]
    EmptyStack,

    #[error("got {frames} frames but {exposures} exposure times")]
    ExposureCountMismatch { frames: usize, exposures: usize },

    #[error("invalid exposure time {time} for frame {index}")]
    InvalidExposureTime { index: usize, time: f32 },

    #[error("exposure fallback with base {base} and ratio {ratio} gives no distinct positive times")]
    InvalidExposureFallback { base: f32, ratio: f32 },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
